//! Store configuration.
//!
//! Configuration is a YAML file with kebab-case keys. Every field has a
//! default, so an empty file (or no file at all) yields a working store.
//!
//! ```yaml
//! require-if-match: true
//! resolved-statuses: [done, closed, wontfix]
//! default-type: task
//! watcher:
//!   debounce-ms: 100
//!   poll-interval-ms: 2000
//!   subscriber-capacity: 64
//!   notifications: true
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;

/// Default quiet period before a batch of changes is reconciled
pub const DEFAULT_DEBOUNCE_MS: u64 = 100;

/// Default interval between full-tree polls
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;

/// Default number of batches buffered per subscriber
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 64;

/// Configuration for an issue store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default)]
pub struct StoreConfig {
    /// Reject writes that do not carry an If-Match ETag
    pub require_if_match: bool,

    /// Known workflow statuses
    pub statuses: Vec<String>,

    /// Statuses that count as finished; issues in these never block others
    pub resolved_statuses: Vec<String>,

    /// Known issue types
    pub types: Vec<String>,

    /// Known priorities
    pub priorities: Vec<String>,

    /// Type assigned to issues that do not declare one
    pub default_type: String,

    /// Status assigned to issues that do not declare one
    pub default_status: String,

    /// File watcher tuning
    pub watcher: WatcherConfig,
}

/// Watcher section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default)]
pub struct WatcherConfig {
    /// Quiet period in milliseconds before pending changes are reconciled
    pub debounce_ms: u64,

    /// Full-tree poll interval in milliseconds; 0 disables polling
    pub poll_interval_ms: u64,

    /// Batches buffered per subscriber before further batches are dropped
    pub subscriber_capacity: usize,

    /// Use filesystem notifications; when off, changes are found by polling
    /// alone (e.g. on network mounts that never deliver events)
    pub notifications: bool,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| (*s).to_string()).collect()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            require_if_match: false,
            statuses: strings(&["open", "in-progress", "blocked", "done", "closed", "wontfix"]),
            resolved_statuses: strings(&["done", "closed", "wontfix"]),
            types: strings(&["milestone", "epic", "feature", "task", "bug"]),
            priorities: strings(&["critical", "high", "medium", "low"]),
            default_type: "task".to_string(),
            default_status: "open".to_string(),
            watcher: WatcherConfig::default(),
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            subscriber_capacity: DEFAULT_SUBSCRIBER_CAPACITY,
            notifications: true,
        }
    }
}

impl StoreConfig {
    /// Load configuration from a YAML file and validate it.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the file cannot be read and `Error::Config` if it
    /// does not parse or fails [`StoreConfig::validate`].
    pub async fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(crate::error::io_context("read config", path))?;
        let config = Self::from_yaml(&content)?;
        tracing::debug!(path = %path.display(), "Loaded store configuration");
        Ok(config)
    }

    /// Parse configuration from YAML text and validate it.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` on YAML or validation errors.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = if content.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(content).map_err(|e| Error::Config(e.to_string()))?
        };
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_yaml::to_string(self).map_err(|e| Error::Config(format!("YAML error: {e}")))?;
        fs::write(path, content)
            .await
            .map_err(crate::error::io_context("write config", path))
    }

    /// Check the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.types.is_empty() {
            return Err(Error::Config("types must not be empty".to_string()));
        }
        if self.statuses.is_empty() {
            return Err(Error::Config("statuses must not be empty".to_string()));
        }
        if !contains_ignore_case(&self.types, &self.default_type) {
            return Err(Error::Config(format!(
                "default-type '{}' is not one of the configured types",
                self.default_type
            )));
        }
        if !contains_ignore_case(&self.statuses, &self.default_status) {
            return Err(Error::Config(format!(
                "default-status '{}' is not one of the configured statuses",
                self.default_status
            )));
        }
        if self.watcher.subscriber_capacity == 0 {
            return Err(Error::Config(
                "watcher.subscriber-capacity must be at least 1".to_string(),
            ));
        }
        if self.watcher.debounce_ms == 0 {
            return Err(Error::Config(
                "watcher.debounce-ms must be at least 1".to_string(),
            ));
        }
        if !self.watcher.notifications && self.watcher.poll_interval_ms == 0 {
            return Err(Error::Config(
                "watcher.poll-interval-ms must be set when notifications are off".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether `status` is a terminal status
    pub fn is_resolved(&self, status: &str) -> bool {
        contains_ignore_case(&self.resolved_statuses, status)
    }

    /// Whether `issue_type` is one of the configured types
    pub fn is_known_type(&self, issue_type: &str) -> bool {
        contains_ignore_case(&self.types, issue_type)
    }
}

impl WatcherConfig {
    /// Debounce quiet period
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Poll interval, or `None` when polling is disabled
    pub fn poll_interval(&self) -> Option<Duration> {
        (self.poll_interval_ms > 0).then(|| Duration::from_millis(self.poll_interval_ms))
    }
}

fn contains_ignore_case(values: &[String], needle: &str) -> bool {
    values.iter().any(|v| v.eq_ignore_ascii_case(needle))
}
