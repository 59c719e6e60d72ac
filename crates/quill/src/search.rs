//! Full-text search seam.
//!
//! The store talks to a search backend through the [`SearchIndex`] trait. A
//! backend is always optional for correctness: the store builds it lazily on
//! the first search and afterwards keeps it current on a best-effort basis,
//! logging failures instead of propagating them.
//!
//! [`MemoryIndex`] is the default backend: a term-count ranking over title,
//! tags and body, held entirely in memory.

use crate::error::{Error, Result};
use async_trait::async_trait;
use quill_doc::{Issue, IssueId};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Search backend used by the store.
///
/// Implementations must be safe for concurrent use.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Add or replace one issue.
    async fn index_issue(&self, issue: &Issue) -> Result<()>;

    /// Add or replace a batch of issues.
    async fn index_issues(&self, issues: &[Issue]) -> Result<()>;

    /// Remove an issue.
    async fn delete_issue(&self, id: &IssueId) -> Result<()>;

    /// Return up to `limit` matching IDs, best match first.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<IssueId>>;

    /// Release any resources held by the index.
    async fn close(&self) -> Result<()>;
}

/// In-memory search index.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    documents: RwLock<HashMap<IssueId, String>>,
}

impl MemoryIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of indexed issues
    pub fn len(&self) -> usize {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the index is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn document_text(issue: &Issue) -> String {
        let mut text = String::with_capacity(issue.title.len() + issue.body.len() + 16);
        text.push_str(&issue.title);
        for tag in &issue.tags {
            text.push(' ');
            text.push_str(tag);
        }
        text.push(' ');
        text.push_str(&issue.body);
        text.to_lowercase()
    }
}

#[async_trait]
impl SearchIndex for MemoryIndex {
    async fn index_issue(&self, issue: &Issue) -> Result<()> {
        self.index_issues(std::slice::from_ref(issue)).await
    }

    async fn index_issues(&self, issues: &[Issue]) -> Result<()> {
        let mut documents = self
            .documents
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for issue in issues {
            documents.insert(issue.id.clone(), Self::document_text(issue));
        }
        Ok(())
    }

    async fn delete_issue(&self, id: &IssueId) -> Result<()> {
        self.documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        Ok(())
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<IssueId>> {
        let terms: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
        if terms.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let documents = self.documents.read().unwrap_or_else(PoisonError::into_inner);
        let mut scored: Vec<(usize, &IssueId)> = documents
            .iter()
            .filter_map(|(id, text)| {
                let score: usize = terms.iter().map(|term| text.matches(term.as_str()).count()).sum();
                (score > 0).then_some((score, id))
            })
            .collect();

        scored.sort_by(|(a_score, a_id), (b_score, b_id)| {
            b_score.cmp(a_score).then_with(|| a_id.cmp(b_id))
        });

        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(_, id)| id.clone())
            .collect())
    }

    async fn close(&self) -> Result<()> {
        self.documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }
}

/// The store's handle on its search backend.
///
/// Until the first search the index is not populated and incremental updates
/// are skipped; the first search indexes the whole snapshot.
pub(crate) struct SearchState {
    index: Arc<dyn SearchIndex>,
    built: OnceCell<()>,
}

impl SearchState {
    pub(crate) fn new(index: Arc<dyn SearchIndex>) -> Self {
        Self {
            index,
            built: OnceCell::new(),
        }
    }

    pub(crate) fn is_built(&self) -> bool {
        self.built.initialized()
    }

    /// Populate the index from `issues` if that has not happened yet.
    pub(crate) async fn ensure_built<'a, I>(&self, issues: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a Issue>,
    {
        self.built
            .get_or_try_init(|| async {
                let batch: Vec<Issue> = issues.into_iter().cloned().collect();
                debug!(count = batch.len(), "Building search index");
                self.index.index_issues(&batch).await
            })
            .await
            .map(|_| ())
            .map_err(|e| match e {
                Error::Search(_) => e,
                other => Error::Search(other.to_string()),
            })
    }

    pub(crate) async fn search(&self, query: &str, limit: usize) -> Result<Vec<IssueId>> {
        self.index.search(query, limit).await
    }

    /// Best-effort incremental update.
    pub(crate) async fn upsert(&self, issues: &[Issue]) {
        if !self.is_built() || issues.is_empty() {
            return;
        }
        let result = if let [issue] = issues {
            self.index.index_issue(issue).await
        } else {
            self.index.index_issues(issues).await
        };
        if let Err(e) = result {
            warn!(count = issues.len(), error = %e, "Search index update failed");
        }
    }

    /// Best-effort removal.
    pub(crate) async fn remove(&self, ids: &[IssueId]) {
        if !self.is_built() {
            return;
        }
        for id in ids {
            if let Err(e) = self.index.delete_issue(id).await {
                warn!(id = %id, error = %e, "Search index removal failed");
            }
        }
    }

    pub(crate) async fn close(&self) {
        if let Err(e) = self.index.close().await {
            warn!(error = %e, "Closing search index failed");
        }
    }
}
