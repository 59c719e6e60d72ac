//! Directory walking and single-file reads.

use crate::config::StoreConfig;
use crate::error::{io_context, Error, Result};
use crate::layout;
use chrono::{DateTime, SubsecRound, Utc};
use quill_doc::Issue;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::{DirEntry, WalkDir};

/// An issue file found by a walk, with its modification time and size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FileStamp {
    pub(crate) rel: PathBuf,
    pub(crate) modified: SystemTime,
    pub(crate) len: u64,
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
}

/// Walk `root` and collect every issue file, sorted by relative path.
///
/// Hidden files and directories below the root are skipped.
pub(crate) fn scan_issue_files(root: &Path) -> io::Result<Vec<FileStamp>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !is_hidden(e))
    {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(root) else {
            continue;
        };
        if !layout::is_issue_path(rel) {
            continue;
        }
        let meta = entry.metadata()?;
        files.push(FileStamp {
            rel: rel.to_path_buf(),
            modified: meta.modified()?,
            len: meta.len(),
        });
    }

    files.sort_by(|a, b| a.rel.cmp(&b.rel));
    Ok(files)
}

/// Every directory under `root` (root included) that is not hidden.
pub(crate) fn scan_dirs(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !is_hidden(e))
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().is_dir())
        .map(DirEntry::into_path)
        .collect()
}

/// Read and parse one issue file.
///
/// The ID comes from the file name and the path is stored root-relative.
/// Missing type, status and timestamps are filled in; timestamps fall back to
/// the file's modification time.
pub(crate) async fn read_issue_file(root: &Path, rel: &Path, config: &StoreConfig) -> Result<Issue> {
    let abs = root.join(rel);
    let id = layout::id_from_path(rel).ok_or_else(|| Error::InvalidId(rel.display().to_string()))?;

    let bytes = tokio::fs::read(&abs).await.map_err(io_context("read", &abs))?;
    let mut issue = Issue::parse(&bytes).map_err(|source| Error::Parse {
        path: rel.to_path_buf(),
        source,
    })?;

    let modified = tokio::fs::metadata(&abs)
        .await
        .and_then(|meta| meta.modified())
        .ok();

    issue.id = id;
    issue.path = rel.to_path_buf();
    apply_defaults(&mut issue, modified, config);
    Ok(issue)
}

/// Fill in fields an issue file may leave out.
pub(crate) fn apply_defaults(issue: &mut Issue, modified: Option<SystemTime>, config: &StoreConfig) {
    if issue.issue_type.is_empty() {
        issue.issue_type.clone_from(&config.default_type);
    }
    if issue.status.is_empty() {
        issue.status.clone_from(&config.default_status);
    }

    let mtime = modified.map(|t| DateTime::<Utc>::from(t).trunc_subsecs(0));
    if issue.created_at.is_none() {
        issue.created_at = mtime;
    }
    if issue.updated_at.is_none() {
        issue.updated_at = mtime.or(issue.created_at);
    }
}

/// Current time at second precision.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}
