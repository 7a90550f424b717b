//! Full-vs-incremental decision and incremental path-set construction.
//!
//! A crawl falls back to a full sync whenever the previous run's commit
//! cannot anchor a trustworthy delta: no previous commit at all, a history
//! rewrite that made it unreachable, or a delta so large that walking it
//! costs more than re-listing the tree.

use tracing::info;

use crate::git::GitRepo;
use crate::models::ChangeSet;
use crate::paths::{matches_extension, matches_subdir};

/// Deltas spanning more than this many commits are synced in full instead.
pub const MAX_COMMITS_FOR_INCREMENTAL: u64 = 1000;

/// How a crawl will enumerate paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Full,
    Incremental,
}

/// Decide between a full and an incremental sync.
///
/// Full when: `last_sha` is absent; `last_sha == current_sha` (nothing to
/// delta against — the orchestrator normally short-circuits earlier, this
/// keeps the decision total); `last_sha` is not an ancestor of
/// `current_sha` (force push); or the delta spans more than
/// [`MAX_COMMITS_FOR_INCREMENTAL`] commits.
pub async fn should_full_sync(repo: &GitRepo, last_sha: Option<&str>, current_sha: &str) -> bool {
    let Some(last_sha) = last_sha else {
        info!("first sync for this configuration");
        return true;
    };

    if last_sha == current_sha {
        return true;
    }

    if !repo.is_ancestor(last_sha, current_sha).await {
        info!(
            last = &last_sha[..8.min(last_sha.len())],
            current = &current_sha[..8.min(current_sha.len())],
            "previous commit unreachable (force push); falling back to full sync"
        );
        return true;
    }

    let count = repo.commit_count(last_sha, current_sha).await;
    if count > MAX_COMMITS_FOR_INCREMENTAL {
        info!(count, "delta too large; falling back to full sync");
        return true;
    }

    false
}

/// Paths to process for an incremental sync: additions, modifications, the
/// new side of every rename, and previously failed paths that still pass
/// the current filter. Insertion-ordered, deduplicated. Deletions are not
/// enumerated: the engine emits upserts only.
pub fn incremental_paths(
    changes: &ChangeSet,
    failed_paths: &[String],
    subdir: &str,
    extensions: &[String],
) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut push = |path: &str| {
        if !out.iter().any(|p| p == path) {
            out.push(path.to_string());
        }
    };

    for path in &changes.added {
        push(path);
    }
    for path in &changes.modified {
        push(path);
    }
    for (_, new_path) in &changes.renamed {
        push(new_path);
    }
    for path in failed_paths {
        if matches_subdir(path, subdir) && matches_extension(path, extensions) {
            push(path);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::parse_extensions;

    fn changes() -> ChangeSet {
        ChangeSet {
            added: vec!["docs/new.md".into()],
            modified: vec!["docs/changed.md".into()],
            deleted: vec!["docs/gone.md".into()],
            renamed: vec![("docs/old.md".into(), "docs/renamed.md".into())],
        }
    }

    #[test]
    fn incremental_set_excludes_deletions() {
        let paths = incremental_paths(&changes(), &[], "", &[]);
        assert_eq!(
            paths,
            vec!["docs/new.md", "docs/changed.md", "docs/renamed.md"]
        );
    }

    #[test]
    fn failed_paths_are_retried_when_still_matching() {
        let failed = vec![
            "docs/flaky.md".to_string(),
            "src/outside.md".to_string(),
            "docs/notes.txt".to_string(),
        ];
        let exts = parse_extensions(".md");
        let paths = incremental_paths(&changes(), &failed, "docs", &exts);
        assert!(paths.contains(&"docs/flaky.md".to_string()));
        assert!(!paths.contains(&"src/outside.md".to_string()));
        assert!(!paths.contains(&"docs/notes.txt".to_string()));
    }

    #[test]
    fn set_is_deduplicated_in_insertion_order() {
        let mut cs = changes();
        cs.added.push("docs/changed.md".into());
        let failed = vec!["docs/new.md".to_string()];
        let paths = incremental_paths(&cs, &failed, "", &[]);
        assert_eq!(
            paths,
            vec!["docs/new.md", "docs/changed.md", "docs/renamed.md"]
        );
    }
}
