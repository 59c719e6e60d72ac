//! Background detection of external changes to a store root.
//!
//! Two producers feed one debounced reconciliation path:
//!
//! - filesystem notifications from a `notify` watcher with one non-recursive
//!   watch per directory
//! - a periodic full-tree poll that diffs modification times and sizes,
//!   catching anything notifications missed
//!
//! Signals accumulate in a pending set keyed by path. Every new signal resets
//! the debounce timer; once the tree has been quiet for the debounce period
//! the set is handed to [`IssueStore::reload_paths`] as one batch, which
//! updates the snapshot and publishes the resulting events.
//!
//! The loop runs as a single tokio task. It holds only a weak reference to
//! the store, so dropping every store handle also ends it.

mod pending;
mod poll;

use crate::config::WatcherConfig;
use crate::error::{Error, Result};
use crate::layout;
use crate::storage::scan;
use crate::storage::{IssueStore, StoreInner};
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use pending::{ChangeSignal, PendingChanges};
use poll::PollSnapshot;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, Weak};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

type FsEvents = mpsc::UnboundedReceiver<notify::Result<Event>>;

/// A running watch loop.
pub(crate) struct WatchHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl IssueStore {
    /// Start watching the root for external changes.
    ///
    /// Setup completes before this returns: every directory is watched and
    /// the initial poll snapshot is taken, so any change made afterwards is
    /// detected. Calling this while already watching is a no-op.
    ///
    /// If filesystem notifications are disabled in the configuration, or
    /// cannot be set up, the store relies on polling alone.
    ///
    /// # Errors
    ///
    /// `Error::Watch` if notifications fail and polling is disabled,
    /// `Error::Io` if the initial scan fails.
    pub async fn start_watching(&self) -> Result<()> {
        if self.is_watching() {
            return Ok(());
        }

        let root = self.inner.root.clone();
        let config = self.inner.config.watcher.clone();
        let (fs_tx, fs_rx) = mpsc::unbounded_channel();

        let notifier = if config.notifications {
            let notify_root = root.clone();
            let created =
                tokio::task::spawn_blocking(move || create_notifier(&notify_root, fs_tx))
                    .await
                    .map_err(|e| Error::Io {
                        op: "watch",
                        path: root.clone(),
                        source: std::io::Error::other(e),
                    })?;
            match created {
                Ok(notifier) => Some(notifier),
                Err(e) if config.poll_interval().is_some() => {
                    warn!(error = %e, "Filesystem notifications unavailable, polling only");
                    None
                }
                Err(e) => return Err(e),
            }
        } else {
            debug!("Filesystem notifications disabled, polling only");
            None
        };

        let snapshot = PollSnapshot::capture(&root)
            .await
            .map_err(crate::error::io_context("scan", &root))?;

        let (stop_tx, stop_rx) = watch::channel(false);
        let watch_loop = WatchLoop {
            store: Arc::downgrade(&self.inner),
            root: root.clone(),
            config,
            notifier,
            snapshot,
            pending: PendingChanges::default(),
        };
        let task = tokio::spawn(watch_loop.run(fs_rx, stop_rx));

        let mut slot = self
            .inner
            .watch
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            // Lost a race with a concurrent start.
            let _ = stop_tx.send(true);
            return Ok(());
        }
        *slot = Some(WatchHandle {
            stop: stop_tx,
            task,
        });
        drop(slot);

        info!(root = %root.display(), "Watching for changes");
        Ok(())
    }

    /// Install `callback` as the change callback and start watching.
    ///
    /// # Errors
    ///
    /// See [`IssueStore::start_watching`].
    pub async fn watch<F>(&self, callback: F) -> Result<()>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.set_on_change(callback);
        self.start_watching().await
    }

    /// Stop watching and end every subscriber stream.
    ///
    /// Pending, not yet reconciled changes are discarded. No-op when not
    /// watching.
    pub async fn unwatch(&self) {
        let handle = self
            .inner
            .watch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(handle) = handle else {
            return;
        };

        let _ = handle.stop.send(true);
        if let Err(e) = handle.task.await {
            warn!(error = %e, "Watch loop ended abnormally");
        }
        self.inner.bus.close_all();
        info!(root = %self.inner.root.display(), "Stopped watching");
    }

    /// Whether a watch loop is running
    pub fn is_watching(&self) -> bool {
        self.inner
            .watch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

fn create_notifier(
    root: &Path,
    tx: mpsc::UnboundedSender<notify::Result<Event>>,
) -> Result<RecommendedWatcher> {
    let mut notifier = RecommendedWatcher::new(
        move |res| {
            let _ = tx.send(res);
        },
        notify::Config::default(),
    )?;

    for dir in scan::scan_dirs(root) {
        notifier.watch(&dir, RecursiveMode::NonRecursive)?;
    }
    Ok(notifier)
}

fn classify(kind: &EventKind) -> Option<ChangeSignal> {
    match kind {
        EventKind::Create(_) => Some(ChangeSignal::Created),
        EventKind::Modify(ModifyKind::Name(_)) => Some(ChangeSignal::Renamed),
        EventKind::Modify(_) | EventKind::Any => Some(ChangeSignal::Written),
        EventKind::Remove(_) => Some(ChangeSignal::Removed),
        _ => None,
    }
}

async fn next_tick(poll: &mut Option<Interval>) {
    match poll {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

struct WatchLoop {
    store: Weak<StoreInner>,
    root: PathBuf,
    config: WatcherConfig,
    notifier: Option<RecommendedWatcher>,
    snapshot: PollSnapshot,
    pending: PendingChanges,
}

impl WatchLoop {
    async fn run(mut self, mut fs_rx: FsEvents, mut stop: watch::Receiver<bool>) {
        let debounce = self.config.debounce();
        let mut poll = self.config.poll_interval().map(|period| {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        let timer = time::sleep(debounce);
        tokio::pin!(timer);
        let mut armed = false;
        let mut fs_open = self.notifier.is_some();

        debug!(
            files = self.snapshot.len(),
            notifications = fs_open,
            poll_ms = self.config.poll_interval_ms,
            "Watch loop started"
        );

        loop {
            let signalled = tokio::select! {
                biased;

                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                    false
                }

                received = fs_rx.recv(), if fs_open => match received {
                    Some(Ok(event)) => self.handle_fs_event(event).await,
                    Some(Err(e)) => {
                        warn!(error = %e, "Filesystem notification error");
                        false
                    }
                    None => {
                        fs_open = false;
                        false
                    }
                },

                () = next_tick(&mut poll) => self.poll().await,

                () = &mut timer, if armed => {
                    armed = false;
                    if !self.reconcile().await {
                        break;
                    }
                    false
                }
            };

            if signalled {
                timer.as_mut().reset(Instant::now() + debounce);
                armed = true;
            }
        }

        if !self.pending.is_empty() {
            debug!(discarded = self.pending.len(), "Discarding pending changes");
            self.pending.clear();
        }
        debug!("Watch loop stopped");
    }

    /// Record a notification. Returns whether anything was signalled.
    async fn handle_fs_event(&mut self, event: Event) -> bool {
        if event.need_rescan() {
            debug!("Notification queue overflowed, rescanning");
            return self.poll().await;
        }
        let Some(signal) = classify(&event.kind) else {
            return false;
        };

        let mut signalled = false;
        for path in event.paths {
            if matches!(signal, ChangeSignal::Created | ChangeSignal::Renamed) && path.is_dir() {
                signalled |= self.adopt_directory(&path);
                continue;
            }
            if self.is_issue_file(&path) {
                self.pending.record(path, signal);
                signalled = true;
            }
        }
        signalled
    }

    /// Watch a newly appeared directory tree and signal the files inside it.
    fn adopt_directory(&mut self, dir: &Path) -> bool {
        let Some(rel) = layout::relative_to(&self.root, dir) else {
            return false;
        };
        if rel
            .components()
            .any(|c| c.as_os_str().to_string_lossy().starts_with('.'))
        {
            return false;
        }

        if let Some(notifier) = self.notifier.as_mut() {
            for sub in scan::scan_dirs(dir) {
                if let Err(e) = notifier.watch(&sub, RecursiveMode::NonRecursive) {
                    warn!(path = %sub.display(), error = %e, "Failed to watch new directory");
                }
            }
        }

        let files = match scan::scan_issue_files(dir) {
            Ok(files) => files,
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "Failed to scan new directory");
                return false;
            }
        };
        debug!(path = %rel.display(), files = files.len(), "Watching new directory");

        let mut signalled = false;
        for file in files {
            let path = dir.join(file.rel);
            if self.is_issue_file(&path) {
                self.pending.record(path, ChangeSignal::Created);
                signalled = true;
            }
        }
        signalled
    }

    fn is_issue_file(&self, path: &Path) -> bool {
        layout::relative_to(&self.root, path).is_some_and(|rel| layout::is_issue_path(&rel))
    }

    /// Diff the tree against the last poll. Returns whether anything changed.
    async fn poll(&mut self) -> bool {
        let current = match PollSnapshot::capture(&self.root).await {
            Ok(current) => current,
            Err(e) => {
                warn!(error = %e, "Poll scan failed");
                return false;
            }
        };

        let changes = self.snapshot.diff_and_update(current);
        if changes.is_empty() {
            return false;
        }
        debug!(changes = changes.len(), "Poll found changes");
        for (rel, signal) in changes {
            self.pending.record(self.root.join(rel), signal);
        }
        true
    }

    /// Hand the pending batch to the store. Returns `false` once the store
    /// has been dropped.
    async fn reconcile(&mut self) -> bool {
        let paths = self.pending.take();
        if paths.is_empty() {
            return true;
        }
        let Some(inner) = self.store.upgrade() else {
            return false;
        };

        let store = IssueStore { inner };
        let events = store.reload_paths(&paths).await;
        debug!(paths = paths.len(), events = events.len(), "Reconciled batch");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, RemoveKind, RenameMode};

    #[test]
    fn test_classify() {
        assert_eq!(
            classify(&EventKind::Create(CreateKind::File)),
            Some(ChangeSignal::Created)
        );
        assert_eq!(
            classify(&EventKind::Modify(ModifyKind::Data(DataChange::Content))),
            Some(ChangeSignal::Written)
        );
        assert_eq!(
            classify(&EventKind::Modify(ModifyKind::Name(RenameMode::To))),
            Some(ChangeSignal::Renamed)
        );
        assert_eq!(
            classify(&EventKind::Remove(RemoveKind::File)),
            Some(ChangeSignal::Removed)
        );
        assert_eq!(classify(&EventKind::Other), None);
    }
}
