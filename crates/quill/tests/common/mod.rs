//! Common test utilities shared across integration tests.

#![allow(dead_code)]

use quill::{IssueStore, StoreConfig};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Configuration with short watcher timings so tests settle quickly.
pub fn fast_config() -> StoreConfig {
    let mut config = StoreConfig::default();
    config.watcher.debounce_ms = 50;
    config.watcher.poll_interval_ms = 150;
    config.watcher.subscriber_capacity = 8;
    config
}

/// A loaded store over a fresh temporary directory.
pub async fn temp_store(config: StoreConfig) -> (TempDir, IssueStore) {
    let dir = TempDir::new().unwrap();
    let store = IssueStore::open(dir.path(), config).await.unwrap();
    (dir, store)
}

/// Write a file under `root`, creating parent directories.
pub fn write_file(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// Minimal issue document with the given title and extra header lines.
pub fn doc(title: &str, extra: &str) -> String {
    format!("---\ntitle: {title}\n{extra}---\nBody of {title}\n")
}
