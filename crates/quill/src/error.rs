//! Error types for quill store operations.

use crate::domain::LinkKind;
use crate::id_generation::IdGenerationError;
use quill_doc::IssueId;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// The error type for quill store operations.
///
/// Callers distinguish three families when choosing a recovery strategy:
/// conflicts ([`Error::is_conflict`]), unknown IDs ([`Error::is_not_found`]),
/// and everything else.
#[derive(Debug, Error)]
pub enum Error {
    /// Issue not found (exact ID match only).
    #[error("Issue not found: {0}")]
    IssueNotFound(IssueId),

    /// An issue with this ID already exists.
    #[error("Issue already exists: {0}")]
    AlreadyExists(IssueId),

    /// The caller's ETag does not match the current content.
    #[error("ETag mismatch: provided {provided}, current {current}")]
    ETagMismatch {
        /// The ETag supplied by the caller
        provided: String,
        /// The ETag of the current on-disk content
        current: String,
    },

    /// The store requires an ETag precondition and none was supplied.
    #[error("An If-Match ETag is required for this write")]
    ETagRequired,

    /// Caller-supplied ID is not usable as a file name.
    #[error("Invalid issue ID: '{0}'")]
    InvalidId(String),

    /// The parent's type is not allowed for the child's type.
    #[error(
        "Issue {child} of type '{child_type}' cannot have a parent of type '{parent_type}' (allowed: {})",
        format_allowed(.allowed)
    )]
    InvalidParent {
        /// The child issue
        child: IssueId,
        /// Type of the child issue
        child_type: String,
        /// Type of the proposed parent
        parent_type: String,
        /// Parent types the child accepts
        allowed: Vec<String>,
    },

    /// Adding a link would close a cycle.
    #[error("Adding this {kind} link would create a cycle: {}", format_path(.path))]
    CycleDetected {
        /// Link kind that would cycle
        kind: LinkKind,
        /// The cycle that would form
        path: Vec<IssueId>,
    },

    /// I/O failure with the operation and file it happened on.
    #[error("Failed to {op} {}: {source}", .path.display())]
    Io {
        /// What was being attempted
        op: &'static str,
        /// The file or directory involved
        path: PathBuf,
        /// The underlying IO error
        #[source]
        source: io::Error,
    },

    /// A file could not be parsed as an issue document.
    #[error("Failed to parse {}: {source}", .path.display())]
    Parse {
        /// The file that failed to parse
        path: PathBuf,
        /// The document error
        #[source]
        source: quill_doc::Error,
    },

    /// Document rendering or writing error.
    #[error("Document error: {0}")]
    Document(#[from] quill_doc::Error),

    /// ID generation failed.
    #[error("ID generation failed: {0}")]
    IdGeneration(#[from] IdGenerationError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Search index error.
    #[error("Search index error: {0}")]
    Search(String),

    /// Filesystem notification error.
    #[error("Watcher error: {0}")]
    Watch(#[from] notify::Error),
}

impl Error {
    /// Whether this is an optimistic-concurrency failure that a caller can
    /// resolve by re-reading and retrying.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ETagMismatch { .. } | Self::ETagRequired)
    }

    /// Whether the operation targeted an unknown issue.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::IssueNotFound(_))
    }
}

/// Build a closure that wraps an [`io::Error`] with operation context.
pub(crate) fn io_context(op: &'static str, path: &Path) -> impl FnOnce(io::Error) -> Error {
    let path = path.to_path_buf();
    move |source| Error::Io { op, path, source }
}

fn format_allowed(allowed: &[String]) -> String {
    if allowed.is_empty() {
        "none".to_string()
    } else {
        allowed.join(", ")
    }
}

fn format_path(path: &[IssueId]) -> String {
    path.iter()
        .map(IssueId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// A specialized Result type for quill operations.
pub type Result<T> = std::result::Result<T, Error>;
