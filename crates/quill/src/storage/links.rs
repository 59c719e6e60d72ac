//! Relationship queries and repairs over the live snapshot.
//!
//! Thin wrappers around [`crate::graph`]; the repair operations persist every
//! issue they touch.

use super::{scan, IssueStore};
use crate::domain::{IncomingLink, LinkKind, LinkReport};
use crate::error::Result;
use crate::graph;
use quill_doc::{Issue, IssueId};
use std::collections::HashMap;
use tracing::info;

impl IssueStore {
    /// Every issue referencing `target`.
    pub async fn find_incoming_links(&self, target: &IssueId) -> Vec<IncomingLink> {
        graph::find_incoming_links(&*self.inner.issues.read().await, target)
    }

    /// The cycle a new `kind` link from `from` to `to` would close, if any.
    pub async fn detect_cycle(
        &self,
        from: &IssueId,
        kind: LinkKind,
        to: &IssueId,
    ) -> Option<Vec<IssueId>> {
        graph::detect_cycle(&*self.inner.issues.read().await, from, kind, to)
    }

    /// Broken links, self links and cycles across the whole store.
    pub async fn check_all_links(&self) -> LinkReport {
        graph::check_all_links(&*self.inner.issues.read().await)
    }

    /// Whether `id` has an unresolved blocker.
    ///
    /// # Errors
    ///
    /// `Error::IssueNotFound` if the ID is unknown.
    pub async fn is_blocked(&self, id: &IssueId) -> Result<bool> {
        graph::is_blocked(&*self.inner.issues.read().await, id, &self.inner.config)
    }

    /// Unresolved issues blocking `id`, ordered by ID.
    ///
    /// # Errors
    ///
    /// `Error::IssueNotFound` if the ID is unknown.
    pub async fn find_active_blockers(&self, id: &IssueId) -> Result<Vec<Issue>> {
        let issues = self.inner.issues.read().await;
        let blockers = graph::find_active_blockers(&issues, id, &self.inner.config)?;
        Ok(blockers
            .iter()
            .filter_map(|blocker| issues.get(blocker).cloned())
            .collect())
    }

    /// Check that `parent_id` may become the parent of `issue`.
    ///
    /// # Errors
    ///
    /// See [`graph::validate_parent`].
    pub async fn validate_parent(&self, issue: &Issue, parent_id: &IssueId) -> Result<()> {
        graph::validate_parent(&*self.inner.issues.read().await, issue, parent_id)
    }

    /// Remove every reference to `target` and persist the touched issues.
    ///
    /// Returns the number of references removed.
    ///
    /// # Errors
    ///
    /// Stops at the first write failure; issues already written stay written.
    pub async fn remove_links_to(&self, target: &IssueId) -> Result<usize> {
        self.repair(|issue, _| graph::strip_links_to(issue, target))
            .await
    }

    /// Remove all self references and dangling references.
    ///
    /// Returns the number of references removed.
    ///
    /// # Errors
    ///
    /// Stops at the first write failure; issues already written stay written.
    pub async fn fix_broken_links(&self) -> Result<usize> {
        self.repair(graph::strip_invalid_links).await
    }

    async fn repair<F>(&self, mut strip: F) -> Result<usize>
    where
        F: FnMut(&mut Issue, &HashMap<IssueId, Issue>) -> usize,
    {
        let mut issues = self.inner.issues.write().await;

        let mut ids: Vec<IssueId> = issues.keys().cloned().collect();
        ids.sort();

        let mut total = 0;
        let mut touched = Vec::new();
        for id in ids {
            let Some(mut issue) = issues.get(&id).cloned() else {
                continue;
            };
            let removed = strip(&mut issue, &*issues);
            if removed == 0 {
                continue;
            }

            issue.updated_at = Some(scan::now());
            self.persist(&issue).await?;
            issues.insert(id, issue.clone());
            touched.push(issue);
            total += removed;
        }
        drop(issues);

        if total > 0 {
            info!(links = total, issues = touched.len(), "Removed links");
        }
        self.inner.search.upsert(&touched).await;
        Ok(total)
    }
}
