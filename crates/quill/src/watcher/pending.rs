//! Accumulator for raw change signals awaiting reconciliation.

use std::collections::HashMap;
use std::path::PathBuf;

/// What a producer saw happen to a path.
///
/// Reconciliation always re-checks the disk, so the signal only matters for
/// logging and for collapsing bursts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChangeSignal {
    Created,
    Written,
    Renamed,
    Removed,
}

/// Changed paths keyed by path, latest signal wins.
#[derive(Debug, Default)]
pub(crate) struct PendingChanges {
    paths: HashMap<PathBuf, ChangeSignal>,
}

impl PendingChanges {
    pub(crate) fn record(&mut self, path: PathBuf, signal: ChangeSignal) {
        self.paths.insert(path, signal);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.paths.len()
    }

    /// Swap out the accumulated set, sorted by path.
    pub(crate) fn take(&mut self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = std::mem::take(&mut self.paths).into_keys().collect();
        paths.sort();
        paths
    }

    pub(crate) fn clear(&mut self) {
        self.paths.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_signals_collapse() {
        let mut pending = PendingChanges::default();
        for _ in 0..5 {
            pending.record(PathBuf::from("a/a1-a2.md"), ChangeSignal::Written);
        }
        pending.record(PathBuf::from("a/a0-a0.md"), ChangeSignal::Created);
        pending.record(PathBuf::from("a/a1-a2.md"), ChangeSignal::Removed);

        assert_eq!(pending.len(), 2);
        assert_eq!(
            pending.take(),
            vec![PathBuf::from("a/a0-a0.md"), PathBuf::from("a/a1-a2.md")]
        );
        assert!(pending.is_empty());
    }
}
