//! The file-backed issue store.
//!
//! [`IssueStore`] owns the authoritative in-memory map of issues and mediates
//! every disk read and write for its root directory.
//!
//! # Architecture
//!
//! - `RwLock<HashMap<IssueId, Issue>>` holds the snapshot; any number of
//!   readers proceed concurrently, writers are serialized
//! - Every write goes to disk first and only then into the map, so an issue
//!   is never visible in memory without its file
//! - Writes replace files atomically via [`quill_doc::write_atomic`]
//! - The search index is optional, built on first use and updated
//!   best-effort afterwards
//! - Subscribers are served by an [`EventBus`] outside the store lock
//!
//! # Optimistic concurrency
//!
//! Each issue has an ETag, the content hash of its canonical rendering. A
//! write may carry a previously observed ETag as `if_match`; the store compares
//! it against the file currently on disk (falling back to memory when the file
//! cannot be read) and rejects the write with [`Error::ETagMismatch`] if
//! someone else changed the issue in between.
//!
//! # Example
//!
//! ```no_run
//! use quill::{IssueStore, StoreConfig};
//! use quill_doc::Issue;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> quill::Result<()> {
//!     let store = IssueStore::open("./issues", StoreConfig::default()).await?;
//!
//!     let created = store.create(Issue::new("Fix the login page")).await?;
//!     let etag = store.etag(&created.id).await?;
//!
//!     let mut edited = created.clone();
//!     edited.status = "in-progress".to_string();
//!     store.update(edited, Some(&etag)).await?;
//!     Ok(())
//! }
//! ```

mod archive;
mod links;
mod reconcile;
pub(crate) mod scan;

use crate::config::StoreConfig;
use crate::error::{io_context, Error, Result};
use crate::events::{EventBus, EventStream, Unsubscribe};
use crate::id_generation::{validate_id, IdGenerator, IdGeneratorConfig};
use crate::layout;
use crate::search::{MemoryIndex, SearchIndex, SearchState};
use crate::watcher::WatchHandle;
use quill_doc::{Issue, IssueId};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub(crate) struct StoreInner {
    pub(crate) root: PathBuf,
    pub(crate) config: StoreConfig,
    pub(crate) issues: RwLock<HashMap<IssueId, Issue>>,
    pub(crate) search: SearchState,
    pub(crate) bus: Arc<EventBus>,
    pub(crate) watch: std::sync::Mutex<Option<WatchHandle>>,
}

/// A directory of issue files and its in-memory snapshot.
///
/// Cloning is cheap; clones share the same snapshot, subscribers and watcher.
#[derive(Clone)]
pub struct IssueStore {
    pub(crate) inner: Arc<StoreInner>,
}

impl IssueStore {
    /// Create a store over `root` without loading it.
    ///
    /// The directory is created if missing. Call [`IssueStore::load`] before
    /// reading, or use [`IssueStore::open`].
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for an invalid configuration and `Error::Io` if
    /// the root cannot be created or resolved.
    pub async fn new(root: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        Self::with_search_index(root, config, Arc::new(MemoryIndex::new())).await
    }

    /// Like [`IssueStore::new`], with a caller-supplied search backend.
    ///
    /// # Errors
    ///
    /// See [`IssueStore::new`].
    pub async fn with_search_index(
        root: impl AsRef<Path>,
        config: StoreConfig,
        index: Arc<dyn SearchIndex>,
    ) -> Result<Self> {
        config.validate()?;
        let root = root.as_ref();
        tokio::fs::create_dir_all(root)
            .await
            .map_err(io_context("create", root))?;
        let root = tokio::fs::canonicalize(root)
            .await
            .map_err(io_context("resolve", root))?;

        let bus = Arc::new(EventBus::new(config.watcher.subscriber_capacity));
        Ok(Self {
            inner: Arc::new(StoreInner {
                root,
                config,
                issues: RwLock::new(HashMap::new()),
                search: SearchState::new(index),
                bus,
                watch: std::sync::Mutex::new(None),
            }),
        })
    }

    /// Create a store over `root` and load it.
    ///
    /// # Errors
    ///
    /// See [`IssueStore::new`] and [`IssueStore::load`].
    pub async fn open(root: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        let store = Self::new(root, config).await?;
        store.load().await?;
        Ok(store)
    }

    /// Absolute store root
    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Store configuration
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Number of loaded issues
    pub async fn len(&self) -> usize {
        self.inner.issues.read().await.len()
    }

    /// Whether no issues are loaded
    pub async fn is_empty(&self) -> bool {
        self.inner.issues.read().await.is_empty()
    }

    /// Rescan the whole root and replace the snapshot.
    ///
    /// Archived issues are loaded alongside active ones. If the same ID is
    /// found both active and archived, the active copy wins.
    ///
    /// # Errors
    ///
    /// Fails on the first unreadable or unparseable file; the previous
    /// snapshot is kept in that case.
    pub async fn load(&self) -> Result<usize> {
        let root = self.inner.root.clone();
        let walk_root = root.clone();
        let files = tokio::task::spawn_blocking(move || scan::scan_issue_files(&walk_root))
            .await
            .map_err(|e| Error::Io {
                op: "scan",
                path: root.clone(),
                source: std::io::Error::other(e),
            })?
            .map_err(io_context("scan", &root))?;

        let mut loaded: HashMap<IssueId, Issue> = HashMap::with_capacity(files.len());
        for file in files {
            let issue = scan::read_issue_file(&root, &file.rel, &self.inner.config).await?;
            match loaded.entry(issue.id.clone()) {
                Entry::Occupied(mut slot) => {
                    warn!(
                        id = %issue.id,
                        first = %slot.get().path.display(),
                        second = %issue.path.display(),
                        "Duplicate issue ID on disk"
                    );
                    if layout::is_archived_path(&slot.get().path)
                        && !layout::is_archived_path(&issue.path)
                    {
                        slot.insert(issue);
                    }
                }
                Entry::Vacant(slot) => {
                    slot.insert(issue);
                }
            }
        }

        let count = loaded.len();
        let mut issues = self.inner.issues.write().await;
        let vanished: Vec<IssueId> = issues
            .keys()
            .filter(|id| !loaded.contains_key(*id))
            .cloned()
            .collect();
        *issues = loaded;
        if self.inner.search.is_built() {
            let all: Vec<Issue> = issues.values().cloned().collect();
            drop(issues);
            self.inner.search.remove(&vanished).await;
            self.inner.search.upsert(&all).await;
        }

        info!(root = %self.inner.root.display(), count, "Loaded issues");
        Ok(count)
    }

    /// Persist a new issue and add it to the snapshot.
    ///
    /// An empty `id` is replaced by a generated one. Timestamps are set to
    /// now, and empty type and status get the configured defaults.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidId` / `Error::AlreadyExists` for a bad caller ID
    /// - `Error::Io` / `Error::Document` if the file cannot be written
    pub async fn create(&self, mut issue: Issue) -> Result<Issue> {
        let mut issues = self.inner.issues.write().await;

        if issue.id.is_empty() {
            let generator = IdGenerator::new(IdGeneratorConfig {
                database_size: issues.len(),
            });
            let id = generator.generate(&issue.title, &issue.body, |candidate| {
                issues.contains_key(candidate)
            })?;
            issue.id = IssueId::new(id);
        } else if !validate_id(issue.id.as_str()) {
            return Err(Error::InvalidId(issue.id.to_string()));
        } else if issues.contains_key(&issue.id) {
            return Err(Error::AlreadyExists(issue.id));
        }

        let now = scan::now();
        issue.created_at = Some(now);
        issue.updated_at = Some(now);
        scan::apply_defaults(&mut issue, None, &self.inner.config);
        issue.path = layout::active_path(&issue.id, &layout::file_name(&issue.id, &issue.title));

        self.persist(&issue).await?;
        issues.insert(issue.id.clone(), issue.clone());
        drop(issues);

        debug!(id = %issue.id, path = %issue.path.display(), "Created issue");
        self.inner.search.upsert(std::slice::from_ref(&issue)).await;
        Ok(issue)
    }

    /// Replace an existing issue, stamping `updated_at`.
    ///
    /// The issue keeps its current location regardless of `issue.path`.
    ///
    /// # Errors
    ///
    /// - `Error::IssueNotFound` if the ID is unknown
    /// - `Error::ETagRequired` / `Error::ETagMismatch` on a failed precondition
    /// - `Error::Io` / `Error::Document` if the file cannot be written
    pub async fn update(&self, issue: Issue, if_match: Option<&str>) -> Result<Issue> {
        self.write_existing(issue, if_match, true).await
    }

    /// Replace an existing issue without touching `updated_at`.
    ///
    /// For sync integrations recording their own bookkeeping, which must not
    /// count as a content change.
    ///
    /// # Errors
    ///
    /// Same as [`IssueStore::update`].
    pub async fn save_sync_only(&self, issue: Issue, if_match: Option<&str>) -> Result<Issue> {
        self.write_existing(issue, if_match, false).await
    }

    async fn write_existing(
        &self,
        mut issue: Issue,
        if_match: Option<&str>,
        touch: bool,
    ) -> Result<Issue> {
        let mut issues = self.inner.issues.write().await;
        let current = issues
            .get(&issue.id)
            .ok_or_else(|| Error::IssueNotFound(issue.id.clone()))?;

        self.check_if_match(current, if_match).await?;

        issue.path.clone_from(&current.path);
        if issue.created_at.is_none() {
            issue.created_at = current.created_at;
        }
        if touch {
            issue.updated_at = Some(scan::now());
        } else if issue.updated_at.is_none() {
            issue.updated_at = current.updated_at;
        }

        self.persist(&issue).await?;
        issues.insert(issue.id.clone(), issue.clone());
        drop(issues);

        debug!(id = %issue.id, touched = touch, "Updated issue");
        self.inner.search.upsert(std::slice::from_ref(&issue)).await;
        Ok(issue)
    }

    /// Remove an issue's file and drop it from the snapshot.
    ///
    /// Links from other issues are left alone; see
    /// [`IssueStore::remove_links_to`].
    ///
    /// # Errors
    ///
    /// `Error::IssueNotFound` if the ID is unknown, `Error::Io` if the file
    /// exists but cannot be removed.
    pub async fn delete(&self, id: &IssueId) -> Result<()> {
        let mut issues = self.inner.issues.write().await;
        let rel = issues
            .get(id)
            .map(|issue| issue.path.clone())
            .ok_or_else(|| Error::IssueNotFound(id.clone()))?;

        let abs = self.inner.root.join(&rel);
        match tokio::fs::remove_file(&abs).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(id = %id, path = %rel.display(), "Issue file already gone");
            }
            Err(e) => return Err(io_context("delete", &abs)(e)),
        }
        issues.remove(id);
        drop(issues);

        debug!(id = %id, "Deleted issue");
        self.inner.search.remove(std::slice::from_ref(id)).await;
        Ok(())
    }

    /// Look up an issue by exact ID
    pub async fn get(&self, id: &IssueId) -> Option<Issue> {
        self.inner.issues.read().await.get(id).cloned()
    }

    /// Every loaded issue, ordered by ID
    pub async fn all(&self) -> Vec<Issue> {
        let mut all: Vec<Issue> = self.inner.issues.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Current ETag of an issue, computed from the in-memory copy.
    ///
    /// # Errors
    ///
    /// `Error::IssueNotFound` if the ID is unknown.
    pub async fn etag(&self, id: &IssueId) -> Result<String> {
        let issues = self.inner.issues.read().await;
        let issue = issues
            .get(id)
            .ok_or_else(|| Error::IssueNotFound(id.clone()))?;
        Ok(issue.etag()?)
    }

    /// Full-text search, best match first.
    ///
    /// The index is built from the current snapshot on first use.
    ///
    /// # Errors
    ///
    /// Returns `Error::Search` if the backend fails.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<IssueId>> {
        if !self.inner.search.is_built() {
            let issues = self.inner.issues.read().await;
            self.inner.search.ensure_built(issues.values()).await?;
        }
        self.inner.search.search(query, limit).await
    }

    /// Register a change subscriber.
    ///
    /// Batches arrive only while the store is watching. The stream ends when
    /// watching stops or the returned handle is used.
    pub fn subscribe(&self) -> (EventStream, Unsubscribe) {
        self.inner.bus.subscribe()
    }

    /// Install a callback invoked after every non-empty change batch.
    ///
    /// Replaces any previously installed callback.
    pub fn set_on_change<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.bus.set_callback(callback);
    }

    /// Stop watching, drop the change callback and release the search
    /// backend.
    pub async fn close(&self) {
        self.unwatch().await;
        self.inner.bus.clear_callback();
        self.inner.search.close().await;
    }

    async fn check_if_match(&self, current: &Issue, if_match: Option<&str>) -> Result<()> {
        let Some(provided) = if_match.filter(|etag| !etag.is_empty()) else {
            if self.inner.config.require_if_match {
                return Err(Error::ETagRequired);
            }
            return Ok(());
        };

        let current_etag =
            match scan::read_issue_file(&self.inner.root, &current.path, &self.inner.config).await
            {
                Ok(on_disk) => on_disk.etag()?,
                Err(e) => {
                    debug!(id = %current.id, error = %e, "Using in-memory ETag");
                    current.etag()?
                }
            };

        if provided != current_etag {
            return Err(Error::ETagMismatch {
                provided: provided.to_string(),
                current: current_etag,
            });
        }
        Ok(())
    }

    /// Render `issue` and write it to its path under the root.
    pub(crate) async fn persist(&self, issue: &Issue) -> Result<()> {
        let bytes = issue.render()?;
        let abs = self.inner.root.join(&issue.path);
        if let Some(parent) = abs.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(io_context("create", parent))?;
        }
        quill_doc::write_atomic(&abs, &bytes)
            .await
            .map_err(|e| match e {
                quill_doc::Error::Io(source) => Error::Io {
                    op: "write",
                    path: abs.clone(),
                    source,
                },
                other => Error::Document(other),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn store() -> (tempfile::TempDir, IssueStore) {
        let dir = tempdir().unwrap();
        let store = IssueStore::open(dir.path(), StoreConfig::default())
            .await
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_create_writes_bucketed_file() {
        let (_dir, store) = store().await;
        let issue = store.create(Issue::new("Fix the login page")).await.unwrap();

        let first = issue.id.as_str().chars().next().unwrap();
        assert_eq!(
            issue.path,
            PathBuf::from(first.to_string())
                .join(format!("{}--fix-the-login-page.md", issue.id))
        );
        assert!(store.root().join(&issue.path).exists());
        assert_eq!(issue.issue_type, "task");
        assert_eq!(issue.status, "open");
        assert_eq!(issue.created_at, issue.updated_at);
    }

    #[tokio::test]
    async fn test_create_with_explicit_id() {
        let (_dir, store) = store().await;
        let mut issue = Issue::new("Named");
        issue.id = IssueId::new("named-1");
        store.create(issue.clone()).await.unwrap();

        let err = store.create(issue).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));

        let mut bad = Issue::new("Bad");
        bad.id = IssueId::new("../escape");
        assert!(matches!(
            store.create(bad).await.unwrap_err(),
            Error::InvalidId(_)
        ));
    }

    #[tokio::test]
    async fn test_update_keeps_path_and_created() {
        let (_dir, store) = store().await;
        let created = store.create(Issue::new("Original")).await.unwrap();

        let mut edited = created.clone();
        edited.title = "Renamed".to_string();
        edited.path = PathBuf::from("elsewhere.md");
        edited.created_at = None;
        let updated = store.update(edited, None).await.unwrap();

        assert_eq!(updated.path, created.path);
        assert_eq!(updated.created_at, created.created_at);
        assert_eq!(store.get(&created.id).await.unwrap().title, "Renamed");
    }

    #[tokio::test]
    async fn test_delete_tolerates_missing_file() {
        let (_dir, store) = store().await;
        let created = store.create(Issue::new("Doomed")).await.unwrap();
        std::fs::remove_file(store.root().join(&created.path)).unwrap();

        store.delete(&created.id).await.unwrap();
        assert!(store.get(&created.id).await.is_none());
        assert!(store.delete(&created.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_new_rejects_invalid_config() {
        let dir = tempdir().unwrap();
        let mut config = StoreConfig::default();
        config.types.clear();
        assert!(matches!(
            IssueStore::new(dir.path(), config).await,
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_close_removes_change_callback() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let (_dir, store) = store().await;
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        store.set_on_change(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        std::fs::create_dir_all(store.root().join("k")).unwrap();
        std::fs::write(store.root().join("k/k1-k1.md"), "---\ntitle: One\n---\n").unwrap();
        store.reload_paths(["k/k1-k1.md"]).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        store.close().await;
        std::fs::write(store.root().join("k/k2-k2.md"), "---\ntitle: Two\n---\n").unwrap();
        assert_eq!(store.reload_paths(["k/k2-k2.md"]).await.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
