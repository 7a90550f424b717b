//! Per-invocation crawl orchestration.
//!
//! One [`Crawler::run`] call is one crawl: load prior state (degraded on
//! store trouble), bring the cache up to date, decide full vs. incremental,
//! stream batches, and persist the new state only after the stream finishes
//! normally. Fatal errors (config, auth, transport, repo state) surface
//! before any record is emitted and leave durable state untouched, as does
//! cancellation.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::RepoCache;
use crate::config::SourceConfig;
use crate::error::SyncError;
use crate::git::GitRepo;
use crate::mask::mask_url;
use crate::models::CrawlRecord;
use crate::pipeline::{self, StreamOutcome};
use crate::store::{StateClient, StateStore};
use crate::sync::{self, SyncMode};

/// Summary of one finished crawl, for logging and assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlSummary {
    /// `None` when the run short-circuited with nothing to do.
    pub mode: Option<SyncMode>,
    pub total: u64,
    pub failed: u64,
    /// Commit id the configuration now stands at.
    pub sha: Option<String>,
}

impl CrawlSummary {
    fn noop(sha: Option<String>) -> Self {
        Self {
            mode: None,
            total: 0,
            failed: 0,
            sha,
        }
    }
}

/// One configured datasource, ready to crawl.
pub struct Crawler {
    config: SourceConfig,
    store: StateClient,
    cache_dir: PathBuf,
    cancel: CancellationToken,
}

impl Crawler {
    pub fn new(
        config: SourceConfig,
        store: Arc<dyn StateStore>,
        cache_dir: impl Into<PathBuf>,
    ) -> Result<Self, SyncError> {
        Self::with_cancel(config, store, cache_dir, CancellationToken::new())
    }

    pub fn with_cancel(
        config: SourceConfig,
        store: Arc<dyn StateStore>,
        cache_dir: impl Into<PathBuf>,
        cancel: CancellationToken,
    ) -> Result<Self, SyncError> {
        config.validate()?;
        Ok(Self {
            config,
            store: StateClient::new(store),
            cache_dir: cache_dir.into(),
            cancel,
        })
    }

    /// Token the host can fire to stop the crawl at the next suspension
    /// point.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    async fn send_empty(&self, tx: &mpsc::Sender<CrawlRecord>) -> Result<(), SyncError> {
        tx.send(CrawlRecord::empty_completed())
            .await
            .map_err(|_| SyncError::Cancelled)
    }

    /// Run one crawl, emitting records into `tx`.
    ///
    /// Exactly one record per batch, plus exactly one empty `completed`
    /// record for runs with nothing to send. A closed receiver counts as
    /// host cancellation.
    pub async fn run(&self, tx: mpsc::Sender<CrawlRecord>) -> Result<CrawlSummary, SyncError> {
        let config_hash = self.config.config_hash();
        let description = self.config.description();
        let subdir = self.config.subdir.clone();
        let extensions = self.config.extension_list();

        info!(
            repo = %mask_url(&self.config.repo_url),
            branch = %self.config.branch,
            config_hash = %config_hash,
            "starting crawl"
        );

        let last_sha = self.store.last_sha(&config_hash).await;
        let failed_paths = self.store.failed_paths(&config_hash).await;
        if let Some(last) = &last_sha {
            info!(last = &last[..8], retries = failed_paths.len(), "previous state loaded");
        }

        let cache = RepoCache::with_cancel(&self.config, &self.cache_dir, self.cancel.clone());
        let repo = GitRepo::with_cancel(
            cache.cache_path(),
            &self.config.branch,
            self.cancel.clone(),
        );

        // Fast path: if the head readable without network already matches
        // the last synced commit and nothing awaits retry, answer without
        // fetching.
        if cache.exists() && failed_paths.is_empty() {
            if let Some(last) = &last_sha {
                match cache.offline_head(&repo).await {
                    Ok(local) if &local == last => {
                        info!("no changes (local head matches last synced commit)");
                        self.send_empty(&tx).await?;
                        return Ok(CrawlSummary::noop(last_sha));
                    }
                    Ok(_) => {}
                    Err(e) => debug!(error = %e, "cannot read local head; fetching"),
                }
            }
        }

        cache.ensure_cloned().await?;
        let current_sha = repo.head_sha().await?;

        if last_sha.as_deref() == Some(current_sha.as_str()) && failed_paths.is_empty() {
            info!("no changes after fetch");
            self.send_empty(&tx).await?;
            return Ok(CrawlSummary::noop(Some(current_sha)));
        }

        let full = sync::should_full_sync(&repo, last_sha.as_deref(), &current_sha).await;
        let (mode, paths) = match (&last_sha, full) {
            (Some(last), false) => {
                let changes = repo
                    .diff_trees(last, &current_sha, &subdir, &extensions)
                    .await?;
                let paths =
                    sync::incremental_paths(&changes, &failed_paths, &subdir, &extensions);
                (SyncMode::Incremental, paths)
            }
            _ => {
                let tree = repo.list_tree(&current_sha, &subdir, &extensions).await?;
                let paths = tree.into_iter().map(|(path, _)| path).collect();
                (SyncMode::Full, paths)
            }
        };

        info!(?mode, total = paths.len(), "paths to process");

        if paths.is_empty() {
            self.send_empty(&tx).await?;
            self.store.save_sha(&config_hash, &current_sha).await;
            self.store.save_failed_paths(&config_hash, &[]).await;
            return Ok(CrawlSummary {
                mode: Some(mode),
                total: 0,
                failed: 0,
                sha: Some(current_sha),
            });
        }

        let total = paths.len() as u64;
        match pipeline::stream_batches(
            &repo,
            &current_sha,
            &paths,
            &config_hash,
            &description,
            &tx,
            &self.cancel,
        )
        .await
        {
            StreamOutcome::Completed { failed } => {
                self.store.save_sha(&config_hash, &current_sha).await;
                self.store.save_failed_paths(&config_hash, &failed).await;
                info!(total, failed = failed.len(), "crawl completed");
                Ok(CrawlSummary {
                    mode: Some(mode),
                    total,
                    failed: failed.len() as u64,
                    sha: Some(current_sha),
                })
            }
            StreamOutcome::Cancelled => Err(SyncError::Cancelled),
        }
    }

    /// Drive [`run`](Self::run) to completion, gathering every record.
    /// Convenience for callers that do not need streaming consumption.
    pub async fn collect(&self) -> Result<(Vec<CrawlRecord>, CrawlSummary), SyncError> {
        let (tx, mut rx) = mpsc::channel(1);
        let run = self.run(tx);
        tokio::pin!(run);

        let mut records = Vec::new();
        let summary = loop {
            tokio::select! {
                result = &mut run => break result?,
                Some(record) = rx.recv() => records.push(record),
            }
        };
        while let Ok(record) = rx.try_recv() {
            records.push(record);
        }
        Ok((records, summary))
    }
}
