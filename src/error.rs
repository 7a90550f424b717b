//! Error taxonomy for the sync engine.
//!
//! The first four variants abort a crawl before any record is emitted and
//! leave durable state untouched. State-store failures are never fatal; the
//! engine degrades to a full sync instead. The per-file variants (`Path`,
//! `Content`, `TransientRead`) never abort a crawl: the first two are
//! permanent skips, the last enters the failed-path set for retry on the
//! next run.
//!
//! Any message text that may carry a repository URL is passed through
//! [`crate::mask::mask_url`] at the construction site.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Malformed URL, unsupported scheme, or inconsistent auth
    /// (e.g. an SSH URL without an SSH key at connect time).
    #[error("configuration error: {0}")]
    Config(String),

    /// Credentials rejected by the remote.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Network, clone, or fetch failure.
    #[error("transport failure: {0}")]
    Transport(String),

    /// Invalid branch, corrupt cache, or unresolvable ref.
    #[error("repository state error: {0}")]
    RepoState(String),

    /// State store unavailable or timed out. Never fatal.
    #[error("state store unavailable: {0}")]
    StateStore(String),

    /// Path traversal or otherwise invalid path. Permanent skip.
    #[error("invalid path {path}: {reason}")]
    Path { path: String, reason: String },

    /// Binary, non-UTF-8, oversize, or missing content. Permanent skip.
    #[error("unusable content at {path}: {reason}")]
    Content { path: String, reason: String },

    /// Blob read failure believed recoverable on retry.
    #[error("transient read failure for {path}: {reason}")]
    TransientRead { path: String, reason: String },

    /// Host-initiated cancellation. Not part of the error taxonomy proper:
    /// it is never persisted and carries no message for the host.
    #[error("crawl cancelled")]
    Cancelled,
}

impl SyncError {
    /// Whether this error aborts the crawl before any record is emitted.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::Config(_)
                | SyncError::Auth(_)
                | SyncError::Transport(_)
                | SyncError::RepoState(_)
        )
    }
}
