//! Commit-graph queries over a cached clone.
//!
//! All queries shell out to the `git` binary against the cache directory
//! and run through [`run_git`], which kills the child process when the
//! crawl's cancellation token fires. Queries are read-only; transport
//! (clone/fetch) lives in [`crate::cache`].

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::error::SyncError;
use crate::mask::mask_url;
use crate::models::ChangeSet;
use crate::paths::{matches_extension, matches_subdir};

/// Captured result of one git invocation.
pub(crate) struct GitOutput {
    pub stdout: Vec<u8>,
    pub stderr: String,
    pub success: bool,
}

impl GitOutput {
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

/// Run `git` with the given args, killing the child if `cancel` fires.
///
/// `envs` is applied to the child process only; the parent environment is
/// never mutated (this is how SSH transport config travels).
pub(crate) async fn run_git(
    workdir: Option<&Path>,
    envs: &[(String, String)],
    args: &[&str],
    cancel: &CancellationToken,
) -> Result<GitOutput, SyncError> {
    let mut cmd = Command::new("git");
    if let Some(dir) = workdir {
        cmd.current_dir(dir);
    }
    for (key, value) in envs {
        cmd.env(key, value);
    }
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd
        .spawn()
        .map_err(|e| SyncError::Transport(format!("failed to run git: {e}")))?;

    tokio::select! {
        output = child.wait_with_output() => {
            let output = output
                .map_err(|e| SyncError::Transport(format!("git did not complete: {e}")))?;
            Ok(GitOutput {
                success: output.status.success(),
                stdout: output.stdout,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
        _ = cancel.cancelled() => Err(SyncError::Cancelled),
    }
}

/// Read-only view of the cached clone for one `(url, branch)`.
pub struct GitRepo {
    workdir: PathBuf,
    branch: String,
    cancel: CancellationToken,
}

impl GitRepo {
    pub fn new(workdir: impl Into<PathBuf>, branch: impl Into<String>) -> Self {
        Self::with_cancel(workdir, branch, CancellationToken::new())
    }

    pub fn with_cancel(
        workdir: impl Into<PathBuf>,
        branch: impl Into<String>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            workdir: workdir.into(),
            branch: branch.into(),
            cancel,
        }
    }

    async fn git(&self, args: &[&str]) -> Result<GitOutput, SyncError> {
        run_git(Some(&self.workdir), &[], args, &self.cancel).await
    }

    /// Commit id of the branch head. Prefers the remote-tracking ref (what
    /// the last fetch saw), falling back to the local branch.
    pub async fn head_sha(&self) -> Result<String, SyncError> {
        for ref_name in [
            format!("refs/remotes/origin/{}", self.branch),
            format!("refs/heads/{}", self.branch),
        ] {
            let out = self.git(&["rev-parse", "--verify", &ref_name]).await?;
            if out.success {
                return Ok(out.stdout_text().trim().to_string());
            }
        }
        Err(SyncError::RepoState(format!(
            "branch '{}' not found in cached repository",
            self.branch
        )))
    }

    /// Whether `old` is reachable from `new`. Conservatively false on any
    /// graph error, which pushes the sync decision toward a full sync.
    pub async fn is_ancestor(&self, old: &str, new: &str) -> bool {
        match self.git(&["merge-base", "--is-ancestor", old, new]).await {
            Ok(out) => out.success,
            Err(_) => false,
        }
    }

    /// Number of commits in `old..new`; 0 on any error.
    pub async fn commit_count(&self, old: &str, new: &str) -> u64 {
        let range = format!("{old}..{new}");
        match self.git(&["rev-list", "--count", &range]).await {
            Ok(out) if out.success => out.stdout_text().trim().parse().unwrap_or(0),
            _ => 0,
        }
    }

    /// All blobs under `commit`, filtered by subdir and extensions, as
    /// `(path, size)` pairs in git's tree order. Symlinks and submodules
    /// are excluded.
    pub async fn list_tree(
        &self,
        commit: &str,
        subdir: &str,
        extensions: &[String],
    ) -> Result<Vec<(String, u64)>, SyncError> {
        let out = self
            .git(&["ls-tree", "-r", "-l", "-z", "--full-tree", commit])
            .await?;
        if !out.success {
            return Err(SyncError::RepoState(mask_url(&format!(
                "cannot list tree at {commit}: {}",
                out.stderr.trim()
            ))));
        }
        Ok(parse_ls_tree(&out.stdout_text())
            .into_iter()
            .filter(|(path, _)| matches_subdir(path, subdir) && matches_extension(path, extensions))
            .collect())
    }

    /// Classified changes between two commits with rename detection,
    /// filtered by subdir and extensions. A rename survives when either
    /// side passes the filter.
    pub async fn diff_trees(
        &self,
        old: &str,
        new: &str,
        subdir: &str,
        extensions: &[String],
    ) -> Result<ChangeSet, SyncError> {
        let out = self
            .git(&["diff", "--name-status", "-M", "-z", old, new])
            .await?;
        if !out.success {
            return Err(SyncError::RepoState(mask_url(&format!(
                "cannot diff {old}..{new}: {}",
                out.stderr.trim()
            ))));
        }

        let raw = parse_name_status(&out.stdout_text());
        let passes = |p: &str| matches_subdir(p, subdir) && matches_extension(p, extensions);

        let mut changes = ChangeSet::default();
        for entry in raw {
            match entry {
                DiffEntry::Added(p) if passes(&p) => changes.added.push(p),
                DiffEntry::Modified(p) if passes(&p) => changes.modified.push(p),
                DiffEntry::Deleted(p) if passes(&p) => changes.deleted.push(p),
                DiffEntry::Renamed(old_p, new_p) if passes(&old_p) || passes(&new_p) => {
                    changes.renamed.push((old_p, new_p));
                }
                _ => {}
            }
        }
        Ok(changes)
    }

    /// Raw bytes of `path` at `commit`.
    ///
    /// A missing blob is a permanent [`SyncError::Content`] (`not_found`);
    /// anything else is a [`SyncError::TransientRead`] and will be retried
    /// on the next run.
    pub async fn read_blob(&self, commit: &str, path: &str) -> Result<Vec<u8>, SyncError> {
        let spec = format!("{commit}:{path}");
        let out = match self.git(&["cat-file", "blob", &spec]).await {
            Ok(out) => out,
            Err(SyncError::Cancelled) => return Err(SyncError::Cancelled),
            Err(e) => {
                return Err(SyncError::TransientRead {
                    path: path.to_string(),
                    reason: e.to_string(),
                })
            }
        };

        if out.success {
            return Ok(out.stdout);
        }

        let stderr = out.stderr.to_lowercase();
        let missing = [
            "does not exist in",
            "exists on disk, but not in",
            "not a valid object name",
            "invalid object name",
            "bad revision",
        ]
        .iter()
        .any(|needle| stderr.contains(needle));

        if missing {
            Err(SyncError::Content {
                path: path.to_string(),
                reason: "not_found".to_string(),
            })
        } else {
            Err(SyncError::TransientRead {
                path: path.to_string(),
                reason: mask_url(out.stderr.trim()),
            })
        }
    }
}

/// One raw entry of `git diff --name-status -z`.
#[derive(Debug, PartialEq, Eq)]
enum DiffEntry {
    Added(String),
    Modified(String),
    Deleted(String),
    Renamed(String, String),
}

/// Parse NUL-separated `ls-tree -r -l -z` output into `(path, size)` blobs.
fn parse_ls_tree(output: &str) -> Vec<(String, u64)> {
    let mut entries = Vec::new();
    for record in output.split('\0') {
        let Some((header, path)) = record.split_once('\t') else {
            continue;
        };
        let fields: Vec<&str> = header.split_whitespace().collect();
        let [mode, kind, _sha, size] = fields.as_slice() else {
            continue;
        };
        // Blobs only; mode 120000 is a symlink, which is never content.
        if *kind != "blob" || *mode == "120000" {
            continue;
        }
        let size = size.parse().unwrap_or(0);
        entries.push((path.to_string(), size));
    }
    entries
}

/// Parse NUL-separated `diff --name-status -z` output.
///
/// The stream alternates status and path tokens; rename and copy statuses
/// consume two path tokens. Copies surface the new path as an addition.
fn parse_name_status(output: &str) -> Vec<DiffEntry> {
    let mut entries = Vec::new();
    let mut tokens = output.split('\0').filter(|t| !t.is_empty());

    while let Some(status) = tokens.next() {
        match status.chars().next() {
            Some('A') => {
                if let Some(path) = tokens.next() {
                    entries.push(DiffEntry::Added(path.to_string()));
                }
            }
            Some('D') => {
                if let Some(path) = tokens.next() {
                    entries.push(DiffEntry::Deleted(path.to_string()));
                }
            }
            Some('R') => {
                if let (Some(old), Some(new)) = (tokens.next(), tokens.next()) {
                    entries.push(DiffEntry::Renamed(old.to_string(), new.to_string()));
                }
            }
            Some('C') => {
                if let (Some(_src), Some(new)) = (tokens.next(), tokens.next()) {
                    entries.push(DiffEntry::Added(new.to_string()));
                }
            }
            // M, T and anything unexpected: one path, treated as modified.
            Some(_) => {
                if let Some(path) = tokens.next() {
                    entries.push(DiffEntry::Modified(path.to_string()));
                }
            }
            None => {}
        }
    }
    entries
}
