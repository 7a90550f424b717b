//! Source configuration and the configuration fingerprint.
//!
//! A crawl is parameterized by `{repo_url, branch, subdir, extensions}`
//! plus optional credentials. The `config_hash` — sixteen hex characters of
//! `SHA-256("{repo_url}:{branch}:{subdir}:{canonical_extensions}")` — keys
//! all durable state and the stable `source_url` identity, so distinct
//! effective configurations never share state while reordering or
//! re-casing the extension list changes nothing.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::credentials::Credentials;
use crate::error::SyncError;
use crate::paths;
use crate::urls;

/// Configuration for one repository datasource.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Repository URL (HTTPS, SSH, or local path).
    pub repo_url: String,
    /// Branch to sync. Defaults to "main".
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Subdirectory filter. Empty means the whole tree.
    #[serde(default)]
    pub subdir: String,
    /// Comma-separated extension filter (e.g. ".md,.rst"). Empty allows all.
    #[serde(default)]
    pub extensions: String,
    /// Optional access token / SSH key.
    #[serde(default)]
    pub credentials: Credentials,
}

fn default_branch() -> String {
    "main".to_string()
}

impl SourceConfig {
    pub fn new(repo_url: impl Into<String>) -> Self {
        Self {
            repo_url: repo_url.into(),
            branch: default_branch(),
            subdir: String::new(),
            extensions: String::new(),
            credentials: Credentials::default(),
        }
    }

    /// Parsed extension filter, insertion-ordered.
    pub fn extension_list(&self) -> Vec<String> {
        paths::parse_extensions(&self.extensions)
    }

    /// Canonical extension string: trimmed, lowercased, sorted,
    /// comma-joined. Input order, case, and whitespace are irrelevant.
    pub fn canonical_extensions(&self) -> String {
        let mut exts: Vec<String> = self
            .extensions
            .split(',')
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        exts.sort();
        exts.join(",")
    }

    /// Sixteen-hex fingerprint of the effective configuration.
    pub fn config_hash(&self) -> String {
        let input = format!(
            "{}:{}:{}:{}",
            self.repo_url,
            self.branch,
            self.subdir,
            self.canonical_extensions()
        );
        let digest = Sha256::digest(input.as_bytes());
        hex::encode(digest)[..16].to_string()
    }

    /// Human-readable origin carried on every emitted descriptor.
    pub fn description(&self) -> String {
        format!("Git: {} @ {}", self.repo_url, self.branch)
    }

    /// Validate the URL shape. Credentials are validated separately by the
    /// pre-flight entry ([`crate::credentials::validate_credentials`]).
    pub fn validate(&self) -> Result<(), SyncError> {
        urls::validate_repo_url(&self.repo_url)?;
        if self.branch.trim().is_empty() {
            return Err(SyncError::Config("branch must not be empty".into()));
        }
        Ok(())
    }
}

/// Settings for a standalone run: the source plus local directories.
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlSettings {
    pub source: SourceConfig,
    /// Directory holding cached clones. Defaults to a temp-dir subfolder.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Directory for the on-disk state store. Defaults to
    /// `{cache_dir}/state`.
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
}

fn default_cache_dir() -> PathBuf {
    std::env::temp_dir().join("gitsource-cache")
}

impl CrawlSettings {
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir
            .clone()
            .unwrap_or_else(|| self.cache_dir.join("state"))
    }
}

/// Load settings from a TOML file.
pub fn load_settings(path: &Path) -> Result<CrawlSettings> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let settings: CrawlSettings =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    settings.source.validate()?;
    Ok(settings)
}
