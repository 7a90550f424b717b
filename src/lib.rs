//! # gitsource
//!
//! **A Git repository ingestion datasource for knowledge-base hosts.**
//!
//! gitsource crawls a configured repository branch and streams filtered,
//! decoded file contents back to the host in bounded batches. Durable
//! per-configuration state makes runs incremental: only files changed
//! since the last synced commit (plus previously failed ones) are re-sent,
//! with automatic fallback to a full sync after force pushes or oversized
//! deltas.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌────────────┐   ┌───────────────┐   ┌──────────┐
//! │ RepoCache │──▶│  GitRepo   │──▶│   Pipeline    │──▶│   Host   │
//! │ clone/    │   │ head/diff/ │   │ read → decode │   │ (record  │
//! │ fetch     │   │ tree/blob  │   │ → batch       │   │  stream) │
//! └───────────┘   └────────────┘   └───────────────┘   └──────────┘
//!        ▲                                 │
//!        │         ┌────────────┐          │
//!        └─────────│  Crawler   │◀─────────┘
//!                  │ state +    │
//!                  │ decisions  │
//!                  └─────┬──────┘
//!                        ▼
//!                  ┌────────────┐
//!                  │ StateStore │  git_sha:{hash} / git_failed:{hash}
//!                  └────────────┘
//! ```
//!
//! ## Crawl flow
//!
//! 1. Derive the `config_hash` fingerprint from
//!    `{repo_url, branch, subdir, extensions}` ([`config`]).
//! 2. Load `last_sha` and `failed_paths` from the host store, degrading
//!    safely on timeouts ([`store`]).
//! 3. Clone or fetch the cached repository with authenticated transport
//!    ([`cache`]).
//! 4. Decide full vs. incremental against the commit graph ([`sync`],
//!    [`git`]).
//! 5. Stream 50-record batches of decoded files with partial-failure
//!    accounting ([`pipeline`]).
//! 6. Persist the new commit id and residual failed paths ([`crawl`]).
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | Source configuration, defaults, `config_hash` fingerprint |
//! | [`models`] | Wire types: `FileDescriptor`, `ChangeSet`, `CrawlRecord` |
//! | [`error`] | `SyncError` taxonomy: fatal vs. degraded vs. per-file |
//! | [`urls`] | URL classification, validation, token-authenticated URLs |
//! | [`mask`] | Secret masking for logs and error text |
//! | [`paths`] | POSIX normalization, traversal rejection, subdir/extension filters |
//! | [`content`] | Binary magic/NUL detection, extension → MIME mapping |
//! | [`credentials`] | Credential types, pre-flight validation, SSH key normalization |
//! | [`store`] | Host state-store seam with bounded timeouts and degrade-on-failure |
//! | [`cache`] | Deterministic clone cache, SSH key-file lifecycle, cache locking |
//! | [`git`] | Commit-graph queries: head, ancestry, tree, diff, blob |
//! | [`sync`] | Full-vs-incremental decision and retry selection |
//! | [`pipeline`] | Streaming read → decode → classify → batch |
//! | [`crawl`] | Per-invocation orchestration and state persistence |

pub mod cache;
pub mod config;
pub mod content;
pub mod crawl;
pub mod credentials;
pub mod error;
pub mod git;
pub mod mask;
pub mod models;
pub mod paths;
pub mod pipeline;
pub mod store;
pub mod sync;
pub mod urls;
