//! Incremental reconciliation of changed paths.

use super::{scan, IssueStore};
use crate::domain::IssueEvent;
use crate::error::Error;
use crate::layout;
use quill_doc::Issue;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Outcome of reading one changed path.
enum Observed {
    Present(Issue),
    Missing,
}

impl IssueStore {
    /// Bring the snapshot in line with the current state of `paths` on disk.
    ///
    /// Paths may be absolute (under the root) or root-relative; anything that
    /// is not an issue file is ignored. For each path:
    ///
    /// - a parseable file whose ID is unknown becomes `Created`
    /// - a parseable file for a known ID becomes `Updated`, unless both its
    ///   content and location are unchanged
    /// - a missing file becomes `Deleted`, but only if the snapshot still
    ///   places that ID at this path
    /// - a file that fails to read or parse is logged and skipped
    ///
    /// The resulting batch is published to subscribers after the store lock is
    /// released, and returned.
    pub async fn reload_paths<I, P>(&self, paths: I) -> Vec<IssueEvent>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let root = &self.inner.root;
        let mut rels: Vec<PathBuf> = paths
            .into_iter()
            .filter_map(|path| layout::relative_to(root, path.as_ref()))
            .filter(|rel| layout::is_issue_path(rel))
            .collect();
        rels.sort();
        rels.dedup();
        if rels.is_empty() {
            return Vec::new();
        }

        let mut events = Vec::new();
        let mut upserted = Vec::new();
        let mut removed = Vec::new();
        {
            // Read under the lock: a store write must not land between a
            // file's read and its apply.
            let mut issues = self.inner.issues.write().await;

            let mut observed = Vec::with_capacity(rels.len());
            for rel in rels {
                match scan::read_issue_file(root, &rel, &self.inner.config).await {
                    Ok(issue) => observed.push((rel, Observed::Present(issue))),
                    Err(Error::Io { source, .. })
                        if source.kind() == std::io::ErrorKind::NotFound =>
                    {
                        observed.push((rel, Observed::Missing));
                    }
                    Err(e) => {
                        warn!(path = %rel.display(), error = %e, "Skipping unreadable issue file");
                    }
                }
            }
            // Files present on disk apply first, so a rename moves the
            // snapshot entry before its old path is looked at.
            observed.sort_by_key(|(_, observation)| matches!(observation, Observed::Missing));

            for (rel, observation) in observed {
                match observation {
                    Observed::Present(issue) => {
                        let event = match issues.get(&issue.id) {
                            None => IssueEvent::created(issue.clone()),
                            Some(known) if known.path == issue.path && same_content(known, &issue) => {
                                continue;
                            }
                            Some(_) => IssueEvent::updated(issue.clone()),
                        };
                        upserted.push(issue.clone());
                        issues.insert(issue.id.clone(), issue);
                        events.push(event);
                    }
                    Observed::Missing => {
                        let Some(id) = layout::id_from_path(&rel) else {
                            continue;
                        };
                        if issues.get(&id).is_some_and(|known| known.path == rel) {
                            issues.remove(&id);
                            removed.push(id.clone());
                            events.push(IssueEvent::deleted(id));
                        }
                    }
                }
            }
        }

        self.inner.search.upsert(&upserted).await;
        self.inner.search.remove(&removed).await;

        if !events.is_empty() {
            debug!(count = events.len(), "Reconciled changed issue files");
            self.inner.bus.publish(&events);
        }
        events
    }
}

fn same_content(a: &Issue, b: &Issue) -> bool {
    match (a.etag(), b.etag()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
