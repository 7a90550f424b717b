//! Core data models for the sync engine.
//!
//! These types represent the records that flow from the engine to the
//! knowledge-base host and the change sets computed against the commit
//! graph. All wire types round-trip through JSON: field order is the
//! declaration order, list order is insertion order, and Unicode content
//! is preserved verbatim.

use serde::{Deserialize, Serialize};

/// A single file emitted to the host.
///
/// `source_url` is the stable identity `git:{config_hash}:{path}`; it never
/// contains a commit SHA, so the host can deduplicate and update records
/// across runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// Repository-relative POSIX path, also used as the display title.
    pub title: String,
    /// Decoded UTF-8 file content.
    pub content: String,
    /// Stable identity string: `git:{config_hash}:{normalized_path}`.
    pub source_url: String,
    /// Human-readable origin, e.g. `Git: https://host/owner/repo.git @ main`.
    pub description: String,
}

/// Files changed between two commits, already filtered by subdir/extensions.
///
/// Paths are repository-relative and POSIX-normalized. A rename is kept when
/// either its old or its new side passes the filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    #[serde(default)]
    pub added: Vec<String>,
    #[serde(default)]
    pub modified: Vec<String>,
    #[serde(default)]
    pub deleted: Vec<String>,
    /// `(old_path, new_path)` pairs.
    #[serde(default)]
    pub renamed: Vec<(String, String)>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.modified.is_empty()
            && self.deleted.is_empty()
            && self.renamed.is_empty()
    }
}

/// Progress status carried on each emitted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlStatus {
    Processing,
    Completed,
}

/// One batch record emitted to the host.
///
/// `completed` is the cumulative count of attempted paths and is
/// monotonically non-decreasing across a crawl; the final record is the only
/// one with [`CrawlStatus::Completed`] and has `completed == total`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlRecord {
    pub items: Vec<FileDescriptor>,
    pub status: CrawlStatus,
    pub total: u64,
    pub completed: u64,
}

impl CrawlRecord {
    /// The single record emitted for a run with nothing to send.
    pub fn empty_completed() -> Self {
        Self {
            items: Vec::new(),
            status: CrawlStatus::Completed,
            total: 0,
            completed: 0,
        }
    }
}
