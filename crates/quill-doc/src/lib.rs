//! # quill-doc
//!
//! Markdown issue documents with a YAML front-matter header.
//!
//! This crate owns the on-disk document format used by the quill issue store:
//!
//! - [`Issue`] and [`IssueId`], the issue value type
//! - [`SyncValue`], the typed payload for per-integration sync metadata
//! - [`Issue::parse`] / [`Issue::render`], a deterministic codec
//! - [`Issue::etag`], a content hash of the canonical rendered form
//! - [`write_atomic`], crash-safe replacement of a document on disk
//!
//! ## Example
//!
//! ```
//! use quill_doc::Issue;
//!
//! let mut issue = Issue::new("Write the docs");
//! issue.status = "open".to_string();
//! issue.body = "Start with the README.\n".to_string();
//!
//! let bytes = issue.render()?;
//! let parsed = Issue::parse(&bytes)?;
//! assert_eq!(parsed.title, "Write the docs");
//! assert_eq!(parsed.etag()?, issue.etag()?);
//! # Ok::<(), quill_doc::Error>(())
//! ```

#![forbid(unsafe_code)]

mod atomic;
mod error;
mod issue;
mod sync;

pub use atomic::write_atomic;
pub use error::{Error, Result};
pub use issue::{etag_of, Issue, IssueId};
pub use sync::{SyncData, SyncValue};
