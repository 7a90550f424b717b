//! Streaming pipeline: ordered paths → blob read → decode → classify →
//! bounded batches.
//!
//! Nothing here buffers the whole file set: one batch of at most
//! [`BATCH_SIZE`] descriptors is in memory at a time, and the channel send
//! is the back-pressure point — the pipeline advances only when the host
//! consumes the previous record. A dropped receiver or a fired
//! cancellation token stops the stream between paths; the caller then
//! skips state persistence.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::content::is_binary;
use crate::error::SyncError;
use crate::git::GitRepo;
use crate::models::{CrawlRecord, CrawlStatus, FileDescriptor};
use crate::paths::normalize_path;

/// Descriptors per emitted record.
pub const BATCH_SIZE: usize = 50;

/// Cap on decoded content size.
pub const MAX_FILE_SIZE: usize = 5 * 1024 * 1024;

/// Why a path was deliberately not emitted. Permanent skips never enter
/// the failed-path set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotFound,
    Binary,
    NonUtf8,
    Oversize,
}

impl SkipReason {
    fn as_str(self) -> &'static str {
        match self {
            SkipReason::NotFound => "not_found",
            SkipReason::Binary => "binary",
            SkipReason::NonUtf8 => "non_utf8",
            SkipReason::Oversize => "too_large",
        }
    }
}

/// Outcome of reading one path at a commit.
#[derive(Debug)]
pub enum ReadOutcome {
    /// Decoded UTF-8 content within the size cap.
    Ok(String),
    /// Deliberate non-emission; not retried.
    PermanentSkip(SkipReason),
    /// Believed recoverable; the path enters the failed set for retry.
    TransientFail(String),
}

/// Read and classify one path at `commit`.
pub async fn read_path(
    repo: &GitRepo,
    commit: &str,
    path: &str,
) -> Result<ReadOutcome, SyncError> {
    let bytes = match repo.read_blob(commit, path).await {
        Ok(bytes) => bytes,
        Err(SyncError::Cancelled) => return Err(SyncError::Cancelled),
        Err(SyncError::Content { .. }) => {
            return Ok(ReadOutcome::PermanentSkip(SkipReason::NotFound))
        }
        Err(SyncError::TransientRead { reason, .. }) => {
            return Ok(ReadOutcome::TransientFail(reason))
        }
        Err(other) => return Ok(ReadOutcome::TransientFail(other.to_string())),
    };

    if is_binary(&bytes) {
        return Ok(ReadOutcome::PermanentSkip(SkipReason::Binary));
    }

    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(_) => return Ok(ReadOutcome::PermanentSkip(SkipReason::NonUtf8)),
    };

    if text.len() > MAX_FILE_SIZE {
        return Ok(ReadOutcome::PermanentSkip(SkipReason::Oversize));
    }

    Ok(ReadOutcome::Ok(text))
}

/// Paths under a `.git` directory carry repository metadata, never content.
fn is_git_metadata(path: &str) -> bool {
    path == ".git" || path.starts_with(".git/") || path.contains("/.git/")
}

/// Result of a streaming run.
#[derive(Debug)]
pub enum StreamOutcome {
    /// All paths attempted; `failed` holds the transient failures.
    Completed { failed: Vec<String> },
    /// The host went away or cancellation fired; durable state must not be
    /// updated.
    Cancelled,
}

/// Stream `paths` as batch records into `tx`.
///
/// `completed` on each record is the cumulative attempted count; the final
/// record is the only one with [`CrawlStatus::Completed`] and has
/// `completed == total`. The caller handles the empty-path case before
/// calling.
pub async fn stream_batches(
    repo: &GitRepo,
    commit: &str,
    paths: &[String],
    config_hash: &str,
    description: &str,
    tx: &mpsc::Sender<CrawlRecord>,
    cancel: &CancellationToken,
) -> StreamOutcome {
    let total = paths.len();
    let mut batch: Vec<FileDescriptor> = Vec::with_capacity(BATCH_SIZE);
    let mut failed: Vec<String> = Vec::new();
    let mut attempted = 0usize;
    let mut emitted_through = 0usize;

    for path in paths {
        if cancel.is_cancelled() {
            return StreamOutcome::Cancelled;
        }
        attempted += 1;

        let normalized = match normalize_path(path) {
            Ok(normalized) => normalized,
            Err(e) => {
                warn!(path = %path, error = %e, "skipping invalid path");
                continue;
            }
        };
        if is_git_metadata(&normalized) {
            debug!(path = %path, "skipping git metadata path");
            continue;
        }

        match read_path(repo, commit, path).await {
            Ok(ReadOutcome::Ok(content)) => {
                batch.push(FileDescriptor {
                    title: normalized.clone(),
                    content,
                    source_url: format!("git:{config_hash}:{normalized}"),
                    description: description.to_string(),
                });
            }
            Ok(ReadOutcome::PermanentSkip(reason)) => {
                debug!(path = %path, reason = reason.as_str(), "permanent skip");
            }
            Ok(ReadOutcome::TransientFail(reason)) => {
                warn!(path = %path, %reason, "transient read failure; will retry next run");
                failed.push(path.clone());
            }
            Err(_) => return StreamOutcome::Cancelled,
        }

        if batch.len() >= BATCH_SIZE {
            let status = if attempted == total {
                CrawlStatus::Completed
            } else {
                CrawlStatus::Processing
            };
            let record = CrawlRecord {
                items: std::mem::take(&mut batch),
                status,
                total: total as u64,
                completed: attempted as u64,
            };
            if tx.send(record).await.is_err() {
                return StreamOutcome::Cancelled;
            }
            emitted_through = attempted;
        }
    }

    if !batch.is_empty() || emitted_through < total {
        let record = CrawlRecord {
            items: batch,
            status: CrawlStatus::Completed,
            total: total as u64,
            completed: total as u64,
        };
        if tx.send(record).await.is_err() {
            return StreamOutcome::Cancelled;
        }
    }

    StreamOutcome::Completed { failed }
}
