//! On-disk layout of a store root.
//!
//! ```text
//! <root>/
//!   a/abc-def--fix-the-login-page.md   active issues, bucketed by first ID char
//!   k/k3f-9qa.md                       slug is optional
//!   archive/q7k-m2x--old-idea.md       archived issues, flat
//! ```
//!
//! The file name encodes the ID and an optional slug separated by `--`. The
//! same file name is used in the bucket and in the archive, so moving an issue
//! back and forth always lands it at the same path.

use quill_doc::IssueId;
use std::path::{Component, Path, PathBuf};

/// Name of the archive subdirectory
pub const ARCHIVE_DIR: &str = "archive";

/// Extension of issue files
pub const ISSUE_EXTENSION: &str = "md";

/// Separator between ID and slug in a file name
pub const SLUG_SEPARATOR: &str = "--";

/// Maximum length of the slug part of a file name
pub const MAX_SLUG_LEN: usize = 48;

/// Turn a title into a file-name slug.
///
/// Lowercases ASCII alphanumerics and collapses every other run of characters
/// into a single `-`.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len().min(MAX_SLUG_LEN));
    let mut pending_dash = false;

    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
        if slug.len() >= MAX_SLUG_LEN {
            break;
        }
    }

    slug.truncate(MAX_SLUG_LEN);
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// File name for an issue: `<id>--<slug>.md`, or `<id>.md` without a slug.
pub fn file_name(id: &IssueId, title: &str) -> String {
    let slug = slugify(title);
    if slug.is_empty() {
        format!("{id}.{ISSUE_EXTENSION}")
    } else {
        format!("{id}{SLUG_SEPARATOR}{slug}.{ISSUE_EXTENSION}")
    }
}

/// Bucket directory for an ID: its first character, lowercased.
pub fn bucket_for(id: &IssueId) -> String {
    id.as_str()
        .chars()
        .next()
        .map(|c| c.to_lowercase().collect())
        .unwrap_or_default()
}

/// Relative path of an active issue file.
pub fn active_path(id: &IssueId, file_name: &str) -> PathBuf {
    PathBuf::from(bucket_for(id)).join(file_name)
}

/// Relative path of an archived issue file.
pub fn archive_path(file_name: &str) -> PathBuf {
    PathBuf::from(ARCHIVE_DIR).join(file_name)
}

/// Whether a relative path lies in the archive.
pub fn is_archived_path(rel: &Path) -> bool {
    matches!(
        rel.components().next(),
        Some(Component::Normal(first)) if first == ARCHIVE_DIR
    )
}

/// Extract the issue ID from a file name or path.
///
/// The ID is the file stem up to the first `--`. Returns `None` for files
/// that are not markdown or whose ID part is empty.
pub fn id_from_path(path: &Path) -> Option<IssueId> {
    if path.extension()? != ISSUE_EXTENSION {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let id = stem.split_once(SLUG_SEPARATOR).map_or(stem, |(id, _)| id);
    (!id.is_empty()).then(|| IssueId::new(id))
}

/// Whether a root-relative path names an issue file.
///
/// Only `.md` files count, and any hidden component (starting with `.`)
/// excludes the path.
pub fn is_issue_path(rel: &Path) -> bool {
    let visible = rel.components().all(|component| match component {
        Component::Normal(part) => !part.to_string_lossy().starts_with('.'),
        _ => false,
    });
    visible && id_from_path(rel).is_some()
}

/// Convert `path` to a root-relative path.
///
/// Absolute paths outside `root` yield `None`; relative paths are taken as
/// already relative to the root.
pub fn relative_to(root: &Path, path: &Path) -> Option<PathBuf> {
    if path.is_absolute() {
        path.strip_prefix(root).ok().map(Path::to_path_buf)
    } else {
        Some(path.to_path_buf())
    }
}
