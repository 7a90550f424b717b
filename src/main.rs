//! Operator CLI for gitsource.
//!
//! Thin wrapper over the library: `crawl` runs one invocation against a
//! TOML config and prints one JSON record per line, `validate` checks
//! credential shape (optionally against the live remote), `hash` prints
//! the configuration fingerprint and its storage keys.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use gitsource::cache::RepoCache;
use gitsource::config::{self, CrawlSettings};
use gitsource::crawl::Crawler;
use gitsource::credentials::validate_credentials;
use gitsource::store::{self, FsStateStore};

#[derive(Parser)]
#[command(
    name = "gitsource",
    about = "gitsource — a Git repository ingestion datasource with incremental sync",
    version
)]
struct Cli {
    /// Path to configuration file
    #[arg(long, global = true, default_value = "./gitsource.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one crawl, printing one JSON record per batch on stdout
    Crawl,

    /// Check credential shape; with --live, also test repository access
    Validate {
        /// Run `git ls-remote` against the configured repository
        #[arg(long)]
        live: bool,
    },

    /// Print the config hash and storage keys for the configured source
    Hash,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    let settings = config::load_settings(&cli.config)?;

    match cli.command {
        Commands::Crawl => run_crawl(settings).await,
        Commands::Validate { live } => run_validate(settings, live).await,
        Commands::Hash => run_hash(settings),
    }
}

async fn run_crawl(settings: CrawlSettings) -> Result<()> {
    let store = Arc::new(FsStateStore::new(settings.state_dir()));
    let crawler = Crawler::new(settings.source, store, settings.cache_dir)?;

    let cancel = crawler.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; stopping at the next batch");
            cancel.cancel();
        }
    });

    let (tx, mut rx) = tokio::sync::mpsc::channel(1);
    let run = crawler.run(tx);
    tokio::pin!(run);

    let summary = loop {
        tokio::select! {
            result = &mut run => break result,
            Some(record) = rx.recv() => println!("{}", serde_json::to_string(&record)?),
        }
    };
    while let Ok(record) = rx.try_recv() {
        println!("{}", serde_json::to_string(&record)?);
    }

    let summary = summary?;
    tracing::info!(
        total = summary.total,
        failed = summary.failed,
        sha = summary.sha.as_deref().unwrap_or("-"),
        "done"
    );
    Ok(())
}

async fn run_validate(settings: CrawlSettings, live: bool) -> Result<()> {
    validate_credentials(&settings.source.credentials)?;
    println!("credentials ok");

    if live {
        let cache = RepoCache::new(&settings.source, &settings.cache_dir);
        cache.check_connection().await?;
        println!("repository reachable");
    }
    Ok(())
}

fn run_hash(settings: CrawlSettings) -> Result<()> {
    let hash = settings.source.config_hash();
    println!("config_hash: {hash}");
    println!("sha key:     {}", store::sha_key(&hash));
    println!("failed key:  {}", store::failed_key(&hash));
    Ok(())
}
