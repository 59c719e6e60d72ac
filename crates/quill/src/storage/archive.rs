//! Archive lifecycle.
//!
//! Archiving moves an issue's file from its bucket into the flat archive
//! directory, keeping the file name. Only the location changes; the document
//! is not rewritten, so its ETag is unaffected.

use super::{scan, IssueStore};
use crate::error::{io_context, Error, Result};
use crate::layout;
use quill_doc::{Issue, IssueId};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;

impl IssueStore {
    /// Move an issue into the archive. No-op if it is already archived.
    ///
    /// # Errors
    ///
    /// `Error::IssueNotFound` if the ID is unknown, `Error::Io` if the file
    /// cannot be moved.
    pub async fn archive(&self, id: &IssueId) -> Result<Issue> {
        let mut issues = self.inner.issues.write().await;
        self.relocate(&mut issues, id, true).await
    }

    /// Move an archived issue back into its bucket. No-op if it is active.
    ///
    /// # Errors
    ///
    /// Same as [`IssueStore::archive`].
    pub async fn unarchive(&self, id: &IssueId) -> Result<Issue> {
        let mut issues = self.inner.issues.write().await;
        self.relocate(&mut issues, id, false).await
    }

    /// Whether a loaded issue lives in the archive.
    ///
    /// # Errors
    ///
    /// `Error::IssueNotFound` if the ID is unknown.
    pub async fn is_archived(&self, id: &IssueId) -> Result<bool> {
        self.inner
            .issues
            .read()
            .await
            .get(id)
            .map(|issue| layout::is_archived_path(&issue.path))
            .ok_or_else(|| Error::IssueNotFound(id.clone()))
    }

    /// Read an archived issue straight from disk, bypassing the snapshot.
    ///
    /// # Errors
    ///
    /// `Error::IssueNotFound` if no archived file carries the ID, or the
    /// read/parse error of the file that does.
    pub async fn get_from_archive(&self, id: &IssueId) -> Result<Issue> {
        let rel = self
            .find_in_archive(id)
            .await?
            .ok_or_else(|| Error::IssueNotFound(id.clone()))?;
        scan::read_issue_file(&self.inner.root, &rel, &self.inner.config).await
    }

    /// Resolve an ID and make sure the issue is active, in one locked step.
    ///
    /// Issues missing from the snapshot are looked up in the archive
    /// directory on disk and added to the snapshot once restored.
    ///
    /// # Errors
    ///
    /// `Error::IssueNotFound` if the ID is neither loaded nor archived on disk.
    pub async fn load_and_unarchive(&self, id: &IssueId) -> Result<Issue> {
        let mut issues = self.inner.issues.write().await;
        if issues.contains_key(id) {
            return self.relocate(&mut issues, id, false).await;
        }

        let rel = self
            .find_in_archive(id)
            .await?
            .ok_or_else(|| Error::IssueNotFound(id.clone()))?;
        let issue = scan::read_issue_file(&self.inner.root, &rel, &self.inner.config).await?;
        issues.insert(issue.id.clone(), issue);
        let restored = self.relocate(&mut issues, id, false).await?;
        drop(issues);

        self.inner
            .search
            .upsert(std::slice::from_ref(&restored))
            .await;
        Ok(restored)
    }

    async fn relocate(
        &self,
        issues: &mut HashMap<IssueId, Issue>,
        id: &IssueId,
        to_archive: bool,
    ) -> Result<Issue> {
        let issue = issues
            .get_mut(id)
            .ok_or_else(|| Error::IssueNotFound(id.clone()))?;

        if layout::is_archived_path(&issue.path) == to_archive {
            return Ok(issue.clone());
        }

        let file_name = issue
            .path
            .file_name()
            .and_then(|name| name.to_str())
            .map_or_else(|| layout::file_name(id, &issue.title), str::to_string);
        let target = if to_archive {
            layout::archive_path(&file_name)
        } else {
            layout::active_path(id, &file_name)
        };

        let from = self.inner.root.join(&issue.path);
        let to = self.inner.root.join(&target);
        if let Some(parent) = to.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(io_context("create", parent))?;
        }
        tokio::fs::rename(&from, &to)
            .await
            .map_err(io_context("move", &from))?;

        debug!(
            id = %id,
            from = %issue.path.display(),
            to = %target.display(),
            "Moved issue"
        );
        issue.path = target;
        Ok(issue.clone())
    }

    async fn find_in_archive(&self, id: &IssueId) -> Result<Option<PathBuf>> {
        let dir = self.inner.root.join(layout::ARCHIVE_DIR);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_context("list", &dir)(e)),
        };

        let mut matches = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(io_context("list", &dir))?
        {
            let rel = layout::archive_path(&entry.file_name().to_string_lossy());
            if layout::is_issue_path(&rel) && layout::id_from_path(&rel).as_ref() == Some(id) {
                matches.push(rel);
            }
        }
        matches.sort();
        Ok(matches.into_iter().next())
    }
}
