//! Full-tree polling, covering gaps in filesystem notifications.

use super::pending::ChangeSignal;
use crate::storage::scan::{self, FileStamp};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Modification time and size of every issue file at the last scan.
#[derive(Debug, Default)]
pub(crate) struct PollSnapshot {
    files: HashMap<PathBuf, (SystemTime, u64)>,
}

impl PollSnapshot {
    pub(crate) fn from_stamps(stamps: Vec<FileStamp>) -> Self {
        Self {
            files: stamps
                .into_iter()
                .map(|stamp| (stamp.rel, (stamp.modified, stamp.len)))
                .collect(),
        }
    }

    /// Walk `root` off the async runtime and snapshot it.
    pub(crate) async fn capture(root: &Path) -> io::Result<Self> {
        let root = root.to_path_buf();
        let stamps = tokio::task::spawn_blocking(move || scan::scan_issue_files(&root))
            .await
            .map_err(io::Error::other)??;
        Ok(Self::from_stamps(stamps))
    }

    pub(crate) fn len(&self) -> usize {
        self.files.len()
    }

    /// Compare against a newer snapshot, adopt it, and report what changed.
    ///
    /// Paths are root-relative and sorted.
    pub(crate) fn diff_and_update(&mut self, current: Self) -> Vec<(PathBuf, ChangeSignal)> {
        let mut changes: Vec<(PathBuf, ChangeSignal)> = Vec::new();

        for (path, stamp) in &current.files {
            match self.files.get(path) {
                None => changes.push((path.clone(), ChangeSignal::Created)),
                Some(previous) if previous != stamp => {
                    changes.push((path.clone(), ChangeSignal::Written));
                }
                Some(_) => {}
            }
        }
        for path in self.files.keys() {
            if !current.files.contains_key(path) {
                changes.push((path.clone(), ChangeSignal::Removed));
            }
        }

        self.files = current.files;
        changes.sort_by(|a, b| a.0.cmp(&b.0));
        changes
    }
}
