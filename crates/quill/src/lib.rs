//! # quill
//!
//! Storage core of a file-backed issue tracker. Every issue is a markdown file
//! with a YAML front-matter header (see [`quill_doc`]); this crate keeps an
//! in-memory snapshot consistent with the directory tree whether changes come
//! from the program itself or from an editor, a sync tool or a checkout.
//!
//! - [`IssueStore`]: the snapshot, disk persistence, ETag preconditions and the
//!   archive lifecycle
//! - [`IssueStore::start_watching`]: notification and polling based change
//!   detection with debounced, incremental reconciliation
//! - [`events`]: non-blocking fan-out of change batches to subscribers
//! - [`graph`]: cycle, broken link and blocker analysis over the snapshot
//! - [`search`]: the pluggable full-text index seam

#![forbid(unsafe_code)]

pub mod config;
pub mod domain;
pub mod error;
pub mod events;
pub mod graph;
pub mod id_generation;
pub mod layout;
pub mod search;
pub mod storage;
mod watcher;

// Public CLI module (needed by binary)
pub mod cli;

pub use config::{StoreConfig, WatcherConfig};
pub use domain::{EventKind, IssueEvent, LinkKind, LinkReport};
pub use error::{Error, Result};
pub use events::{EventStream, Unsubscribe};
pub use quill_doc::{Issue, IssueId, SyncData, SyncValue};
pub use search::{MemoryIndex, SearchIndex};
pub use storage::IssueStore;
