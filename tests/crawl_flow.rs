//! End-to-end crawl scenarios against real git repositories.
//!
//! Each test builds an upstream repository in a temp dir, runs the crawler
//! with an in-memory state store, and asserts on the emitted record stream
//! and the persisted state.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use gitsource::config::SourceConfig;
use gitsource::crawl::Crawler;
use gitsource::models::{CrawlRecord, CrawlStatus};
use gitsource::store::{self, MemoryStore, StateClient, StateStore};
use gitsource::sync::SyncMode;
use tempfile::TempDir;

fn git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args([
            "-c",
            "user.name=test",
            "-c",
            "user.email=test@example.com",
            "-c",
            "commit.gpgsign=false",
        ])
        .args(args)
        .current_dir(dir)
        .output()
        .expect("git is available");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

fn git_stdout(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("git is available");
    assert!(output.status.success(), "git {args:?} failed");
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn head_of(repo: &Path) -> String {
    git_stdout(repo, &["rev-parse", "HEAD"])
}

fn write_file(repo: &Path, rel: &str, content: &str) {
    let path = repo.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn commit_all(repo: &Path, message: &str) -> String {
    git(repo, &["add", "-A"]);
    git(repo, &["commit", "-m", message]);
    head_of(repo)
}

/// Upstream repo with the S1 layout: docs/readme.md, docs/guide.txt,
/// src/main.py.
fn setup_upstream(tmp: &TempDir) -> PathBuf {
    let upstream = tmp.path().join("upstream");
    fs::create_dir_all(&upstream).unwrap();
    git(&upstream, &["init", "-b", "main"]);
    write_file(&upstream, "docs/readme.md", "# Readme\n");
    write_file(&upstream, "docs/guide.txt", "guide\n");
    write_file(&upstream, "src/main.py", "print('hi')\n");
    commit_all(&upstream, "initial");
    upstream
}

fn docs_md_config(upstream: &Path) -> SourceConfig {
    let mut config = SourceConfig::new(upstream.to_str().unwrap());
    config.subdir = "docs".into();
    config.extensions = ".md".into();
    config
}

fn crawler(config: &SourceConfig, store: &Arc<MemoryStore>, tmp: &TempDir) -> Crawler {
    Crawler::new(
        config.clone(),
        store.clone() as Arc<dyn StateStore>,
        tmp.path().join("cache"),
    )
    .unwrap()
}

fn emitted_titles(records: &[CrawlRecord]) -> Vec<String> {
    records
        .iter()
        .flat_map(|r| r.items.iter().map(|d| d.title.clone()))
        .collect()
}

#[tokio::test]
async fn first_sync_filtered() {
    let tmp = TempDir::new().unwrap();
    let upstream = setup_upstream(&tmp);
    let store = Arc::new(MemoryStore::new());
    let config = docs_md_config(&upstream);
    let hash = config.config_hash();

    let (records, summary) = crawler(&config, &store, &tmp).collect().await.unwrap();

    assert_eq!(summary.mode, Some(SyncMode::Full));
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.status, CrawlStatus::Completed);
    assert_eq!(record.total, 1);
    assert_eq!(record.completed, 1);
    assert_eq!(record.items.len(), 1);
    assert_eq!(record.items[0].title, "docs/readme.md");
    assert_eq!(record.items[0].content, "# Readme\n");
    assert_eq!(
        record.items[0].source_url,
        format!("git:{hash}:docs/readme.md")
    );

    let client = StateClient::new(store);
    assert_eq!(client.last_sha(&hash).await, Some(head_of(&upstream)));
    assert!(client.failed_paths(&hash).await.is_empty());
}

#[tokio::test]
async fn incremental_add_then_noop_fast_path() {
    let tmp = TempDir::new().unwrap();
    let upstream = setup_upstream(&tmp);
    let store = Arc::new(MemoryStore::new());
    let config = docs_md_config(&upstream);
    let hash = config.config_hash();

    let c = crawler(&config, &store, &tmp);
    c.collect().await.unwrap();

    // S2: one new matching file upstream.
    write_file(&upstream, "docs/newfile.md", "new\n");
    let new_head = commit_all(&upstream, "add newfile");

    let (records, summary) = c.collect().await.unwrap();
    assert_eq!(summary.mode, Some(SyncMode::Incremental));
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].items.len(), 1);
    assert_eq!(records[0].items[0].title, "docs/newfile.md");
    assert_eq!(records[0].status, CrawlStatus::Completed);

    let client = StateClient::new(store.clone());
    assert_eq!(client.last_sha(&hash).await, Some(new_head));

    // S3: nothing new; the fast path answers without a sync mode.
    let (records, summary) = c.collect().await.unwrap();
    assert_eq!(summary.mode, None);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0], CrawlRecord::empty_completed());
}

#[tokio::test]
async fn source_url_is_stable_across_commits() {
    let tmp = TempDir::new().unwrap();
    let upstream = setup_upstream(&tmp);
    let store = Arc::new(MemoryStore::new());
    let config = docs_md_config(&upstream);

    let c = crawler(&config, &store, &tmp);
    let (first, _) = c.collect().await.unwrap();

    write_file(&upstream, "docs/readme.md", "# Readme v2\n");
    commit_all(&upstream, "edit readme");

    let (second, _) = c.collect().await.unwrap();

    let url_of = |records: &[CrawlRecord]| {
        records
            .iter()
            .flat_map(|r| r.items.iter())
            .find(|d| d.title == "docs/readme.md")
            .map(|d| d.source_url.clone())
            .unwrap()
    };
    let first_url = url_of(&first);
    assert_eq!(first_url, url_of(&second));

    // The identity never embeds a commit id.
    let hex_run = first_url
        .chars()
        .fold((0usize, 0usize), |(run, max), c| {
            if c.is_ascii_hexdigit() {
                ((run + 1), max.max(run + 1))
            } else {
                (0, max)
            }
        })
        .1;
    assert!(hex_run < 40, "source_url contains a 40-hex substring");
}

#[tokio::test]
async fn force_push_triggers_full_sync() {
    let tmp = TempDir::new().unwrap();
    let upstream = setup_upstream(&tmp);
    let base = head_of(&upstream);
    let store = Arc::new(MemoryStore::new());
    let config = docs_md_config(&upstream);

    let c = crawler(&config, &store, &tmp);
    c.collect().await.unwrap();

    write_file(&upstream, "docs/extra.md", "extra\n");
    commit_all(&upstream, "add extra");
    c.collect().await.unwrap();

    // Rewrite history: the previously synced commit becomes unreachable.
    git(&upstream, &["reset", "--hard", &base]);
    write_file(&upstream, "docs/reword.md", "reword\n");
    let rewritten = commit_all(&upstream, "rewritten");

    let (records, summary) = c.collect().await.unwrap();
    assert_eq!(summary.mode, Some(SyncMode::Full));
    let titles = emitted_titles(&records);
    assert_eq!(titles, vec!["docs/readme.md", "docs/reword.md"]);

    let client = StateClient::new(store);
    assert_eq!(
        client.last_sha(&config.config_hash()).await,
        Some(rewritten)
    );
}

#[tokio::test]
async fn transient_failure_is_recorded_then_retried() {
    let tmp = TempDir::new().unwrap();
    let upstream = tmp.path().join("upstream");
    fs::create_dir_all(&upstream).unwrap();
    git(&upstream, &["init", "-b", "main"]);
    write_file(&upstream, "a.md", "alpha\n");
    write_file(&upstream, "b.md", "bravo\n");
    write_file(&upstream, "c.md", "charlie\n");
    commit_all(&upstream, "initial");

    let store = Arc::new(MemoryStore::new());
    let config = SourceConfig::new(upstream.to_str().unwrap());
    let hash = config.config_hash();
    let cache_dir = tmp.path().join("cache");

    let c = Crawler::new(
        config.clone(),
        store.clone() as Arc<dyn StateStore>,
        &cache_dir,
    )
    .unwrap();
    c.collect().await.unwrap();

    // A new commit touches b.md; pre-fetch it into the cache, then remove
    // the new blob's loose object so reading b.md fails with neither a
    // not-found nor a clean result.
    write_file(&upstream, "b.md", "bravo v2\n");
    let second = commit_all(&upstream, "edit b");

    let cache_path =
        gitsource::cache::cache_path_for(&cache_dir, &config.repo_url, &config.branch);
    git(&cache_path, &["fetch", "origin", "main"]);
    let blob = git_stdout(&cache_path, &["rev-parse", &format!("{second}:b.md")]);
    let object_rel: PathBuf = [".git", "objects", &blob[..2], &blob[2..]].iter().collect();
    fs::remove_file(cache_path.join(&object_rel)).expect("new blob is loose after fetch");

    let (records, summary) = c.collect().await.unwrap();
    assert_eq!(summary.mode, Some(SyncMode::Incremental));
    assert_eq!(summary.total, 1);
    assert_eq!(summary.failed, 1);
    assert!(emitted_titles(&records).is_empty());
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, CrawlStatus::Completed);
    assert_eq!(records[0].completed, 1);

    let client = StateClient::new(store.clone());
    assert_eq!(client.last_sha(&hash).await, Some(second.clone()));
    assert_eq!(client.failed_paths(&hash).await, vec!["b.md".to_string()]);

    // Restore the object from the upstream store (same oid, same bytes);
    // the next run retries b.md and clears the failed list.
    fs::copy(upstream.join(&object_rel), cache_path.join(&object_rel)).unwrap();

    let (records, summary) = c.collect().await.unwrap();
    assert_eq!(summary.failed, 0);
    assert!(emitted_titles(&records).contains(&"b.md".to_string()));
    assert!(client.failed_paths(&hash).await.is_empty());
}

#[tokio::test]
async fn oversize_and_binary_are_permanent_skips() {
    let tmp = TempDir::new().unwrap();
    let upstream = tmp.path().join("upstream");
    fs::create_dir_all(&upstream).unwrap();
    git(&upstream, &["init", "-b", "main"]);
    write_file(&upstream, "big.txt", &"x".repeat(7 * 1024 * 1024));
    fs::write(upstream.join("logo.png"), b"\x89PNG\r\n\x1a\nrest").unwrap();
    write_file(&upstream, "notes.md", "notes\n");
    commit_all(&upstream, "initial");

    let store = Arc::new(MemoryStore::new());
    let config = SourceConfig::new(upstream.to_str().unwrap());
    let hash = config.config_hash();

    let (records, summary) = crawler(&config, &store, &tmp).collect().await.unwrap();

    assert_eq!(summary.total, 3);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].items.len(), 1);
    assert_eq!(records[0].items[0].title, "notes.md");
    assert_eq!(records[0].completed, 3);
    assert_eq!(records[0].status, CrawlStatus::Completed);

    let client = StateClient::new(store);
    assert!(client.failed_paths(&hash).await.is_empty());
}

#[tokio::test]
async fn batch_contract_over_many_files() {
    let tmp = TempDir::new().unwrap();
    let upstream = tmp.path().join("upstream");
    fs::create_dir_all(&upstream).unwrap();
    git(&upstream, &["init", "-b", "main"]);
    for i in 0..120 {
        write_file(&upstream, &format!("f{i:03}.md"), &format!("file {i}\n"));
    }
    commit_all(&upstream, "initial");

    let store = Arc::new(MemoryStore::new());
    let config = SourceConfig::new(upstream.to_str().unwrap());

    let (records, summary) = crawler(&config, &store, &tmp).collect().await.unwrap();

    assert_eq!(summary.total, 120);
    assert_eq!(records.len(), 3);
    assert_eq!(
        records.iter().map(|r| r.items.len()).collect::<Vec<_>>(),
        vec![50, 50, 20]
    );
    assert_eq!(
        records.iter().map(|r| r.completed).collect::<Vec<_>>(),
        vec![50, 100, 120]
    );
    assert!(records.iter().all(|r| r.total == 120));

    let completed: Vec<_> = records
        .iter()
        .filter(|r| r.status == CrawlStatus::Completed)
        .collect();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].completed, 120);
    assert_eq!(records.last().unwrap().status, CrawlStatus::Completed);
}

#[tokio::test]
async fn exact_batch_multiple_has_no_trailing_record() {
    let tmp = TempDir::new().unwrap();
    let upstream = tmp.path().join("upstream");
    fs::create_dir_all(&upstream).unwrap();
    git(&upstream, &["init", "-b", "main"]);
    for i in 0..100 {
        write_file(&upstream, &format!("f{i:03}.md"), "x\n");
    }
    commit_all(&upstream, "initial");

    let store = Arc::new(MemoryStore::new());
    let config = SourceConfig::new(upstream.to_str().unwrap());

    let (records, _) = crawler(&config, &store, &tmp).collect().await.unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].status, CrawlStatus::Processing);
    assert_eq!(records[1].status, CrawlStatus::Completed);
    assert_eq!(records[1].completed, 100);
    assert_eq!(records[1].items.len(), 50);
}

#[tokio::test]
async fn fatal_error_leaves_state_untouched() {
    let tmp = TempDir::new().unwrap();
    let upstream = setup_upstream(&tmp);
    let store = Arc::new(MemoryStore::new());

    let mut config = SourceConfig::new(upstream.to_str().unwrap());
    config.branch = "does-not-exist".into();
    let hash = config.config_hash();

    let err = crawler(&config, &store, &tmp).collect().await.unwrap_err();
    assert!(err.is_fatal(), "expected a fatal error, got {err}");

    assert!(!store.exist(&store::sha_key(&hash)).await.unwrap());
    assert!(!store.exist(&store::failed_key(&hash)).await.unwrap());
}

#[tokio::test]
async fn cancellation_skips_persistence() {
    let tmp = TempDir::new().unwrap();
    let upstream = setup_upstream(&tmp);
    let store = Arc::new(MemoryStore::new());
    let config = SourceConfig::new(upstream.to_str().unwrap());
    let hash = config.config_hash();

    let c = crawler(&config, &store, &tmp);
    c.cancellation_token().cancel();

    let err = c.collect().await.unwrap_err();
    assert!(matches!(err, gitsource::error::SyncError::Cancelled));
    assert!(!store.exist(&store::sha_key(&hash)).await.unwrap());
}

#[tokio::test]
async fn empty_path_list_persists_and_completes() {
    let tmp = TempDir::new().unwrap();
    let upstream = setup_upstream(&tmp);
    let store = Arc::new(MemoryStore::new());

    // Filter that matches nothing.
    let mut config = SourceConfig::new(upstream.to_str().unwrap());
    config.extensions = ".nope".into();
    let hash = config.config_hash();

    let (records, summary) = crawler(&config, &store, &tmp).collect().await.unwrap();
    assert_eq!(records, vec![CrawlRecord::empty_completed()]);
    assert_eq!(summary.total, 0);

    // The commit id is persisted even for an empty run.
    let client = StateClient::new(store);
    assert_eq!(client.last_sha(&hash).await, Some(head_of(&upstream)));
}
