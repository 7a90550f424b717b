//! Host state-store seam.
//!
//! The host provides an opaque key/value blob store with three operations.
//! Every call the engine makes is wall-clock bounded; on timeout or store
//! error the engine degrades instead of failing: a missing `last_sha`
//! forces a full sync, unreadable failed paths are treated as empty, and a
//! lost write is logged and swallowed.
//!
//! Key layout per `config_hash`:
//! - `git_sha:{hash}` — UTF-8 40-hex commit id of the last completed run
//! - `git_failed:{hash}` — UTF-8 JSON array of repo-relative paths
//! - `git_browse:{hash}` — reserved for a browse-mode variant

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::warn;

/// Per-operation wall-clock cap on store calls.
pub const STORE_TIMEOUT: Duration = Duration::from_secs(10);

/// Persisted failed paths are capped at this many entries; the oldest are
/// dropped when truncating at write.
pub const MAX_FAILED_PATHS: usize = 10_000;

pub fn sha_key(config_hash: &str) -> String {
    format!("git_sha:{config_hash}")
}

pub fn failed_key(config_hash: &str) -> String {
    format!("git_failed:{config_hash}")
}

/// Reserved for the browse-mode variant; same hash derivation.
pub fn browse_key(config_hash: &str) -> String {
    format!("git_browse:{config_hash}")
}

/// Host-provided blob store. Keys are opaque strings, values opaque bytes;
/// at-least-once durability is sufficient.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn exist(&self, key: &str) -> Result<bool>;
    async fn get(&self, key: &str) -> Result<Vec<u8>>;
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;
}

/// Timeout-bounded, degrade-on-failure view of a [`StateStore`].
#[derive(Clone)]
pub struct StateClient {
    store: Arc<dyn StateStore>,
    timeout: Duration,
}

impl StateClient {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            timeout: STORE_TIMEOUT,
        }
    }

    /// Override the per-operation timeout (tests use short ones).
    pub fn with_timeout(store: Arc<dyn StateStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    async fn get_bounded(&self, key: &str) -> Option<Vec<u8>> {
        let op = async {
            if self.store.exist(key).await? {
                self.store.get(key).await.map(Some)
            } else {
                Ok(None)
            }
        };
        match tokio::time::timeout(self.timeout, op).await {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                warn!(key, error = %e, "state store read failed; degrading");
                None
            }
            Err(_) => {
                warn!(key, "state store read timed out; degrading");
                None
            }
        }
    }

    async fn set_bounded(&self, key: &str, value: Vec<u8>) {
        match tokio::time::timeout(self.timeout, self.store.set(key, value)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(key, error = %e, "state store write failed; continuing"),
            Err(_) => warn!(key, "state store write timed out; continuing"),
        }
    }

    /// Commit id of the last completed run, or `None` (which forces a full
    /// sync) when absent, unreadable, or malformed.
    pub async fn last_sha(&self, config_hash: &str) -> Option<String> {
        let bytes = self.get_bounded(&sha_key(config_hash)).await?;
        match String::from_utf8(bytes) {
            Ok(sha) if sha.len() == 40 && sha.chars().all(|c| c.is_ascii_hexdigit()) => Some(sha),
            Ok(other) => {
                warn!(config_hash, value = %other, "stored sha is malformed; ignoring");
                None
            }
            Err(_) => {
                warn!(config_hash, "stored sha is not UTF-8; ignoring");
                None
            }
        }
    }

    pub async fn save_sha(&self, config_hash: &str, sha: &str) {
        self.set_bounded(&sha_key(config_hash), sha.as_bytes().to_vec())
            .await;
    }

    /// Previously failed paths, or empty on any read problem.
    pub async fn failed_paths(&self, config_hash: &str) -> Vec<String> {
        let Some(bytes) = self.get_bounded(&failed_key(config_hash)).await else {
            return Vec::new();
        };
        match serde_json::from_slice::<Vec<String>>(&bytes) {
            Ok(paths) => paths,
            Err(e) => {
                warn!(config_hash, error = %e, "stored failed paths unreadable; treating as empty");
                Vec::new()
            }
        }
    }

    pub async fn save_failed_paths(&self, config_hash: &str, paths: &[String]) {
        let capped = if paths.len() > MAX_FAILED_PATHS {
            &paths[paths.len() - MAX_FAILED_PATHS..]
        } else {
            paths
        };
        match serde_json::to_vec(capped) {
            Ok(bytes) => self.set_bounded(&failed_key(config_hash), bytes).await,
            Err(e) => warn!(config_hash, error = %e, "failed paths not serializable"),
        }
    }
}

/// In-memory store for tests and embedded use.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn exist(&self, key: &str) -> Result<bool> {
        Ok(self.entries.lock().await.contains_key(key))
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.entries
            .lock()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no such key: {key}"))
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.entries.lock().await.insert(key.to_string(), value);
        Ok(())
    }
}

/// File-per-key store used by the standalone CLI.
pub struct FsStateStore {
    dir: PathBuf,
}

impl FsStateStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn key_path(&self, key: &str) -> PathBuf {
        // Keys contain ':'; keep file names portable.
        self.dir.join(key.replace([':', '/'], "_"))
    }
}

#[async_trait]
impl StateStore for FsStateStore {
    async fn exist(&self, key: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.key_path(key)).await?)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(self.key_path(key)).await?)
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.key_path(key), value).await?;
        Ok(())
    }
}
