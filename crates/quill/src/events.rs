//! Change notification fan-out.
//!
//! Every reconciliation pass produces a batch of [`IssueEvent`]s. The bus
//! delivers each non-empty batch to every queue subscriber through a bounded
//! channel, and pings the optional change callback. Delivery never blocks:
//! a subscriber whose queue is full loses that batch, and a subscriber whose
//! receiver has been dropped is removed.

use crate::domain::IssueEvent;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

type Callback = Arc<dyn Fn() + Send + Sync>;

#[derive(Clone)]
enum Sink {
    Queue(mpsc::Sender<Vec<IssueEvent>>),
    Callback(Callback),
}

#[derive(Default)]
struct BusState {
    next_id: u64,
    sinks: BTreeMap<u64, Sink>,
    callback_id: Option<u64>,
}

/// Registry of change subscribers.
pub struct EventBus {
    capacity: usize,
    state: Mutex<BusState>,
}

impl EventBus {
    /// Create a bus whose queues buffer up to `capacity` batches each.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(BusState::default()),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a queue subscriber.
    ///
    /// The returned [`Unsubscribe`] handle may be called any number of times.
    pub fn subscribe(self: &Arc<Self>) -> (EventStream, Unsubscribe) {
        let (tx, rx) = mpsc::channel(self.capacity);
        let mut state = self.state();
        let id = state.next_id;
        state.next_id += 1;
        state.sinks.insert(id, Sink::Queue(tx));
        debug!(subscriber = id, "Subscriber registered");

        (
            EventStream { rx },
            Unsubscribe {
                bus: Arc::downgrade(self),
                id,
            },
        )
    }

    /// Install or replace the change callback.
    pub fn set_callback<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut state = self.state();
        let id = match state.callback_id {
            Some(id) => id,
            None => {
                let id = state.next_id;
                state.next_id += 1;
                state.callback_id = Some(id);
                id
            }
        };
        state.sinks.insert(id, Sink::Callback(Arc::new(callback)));
    }

    /// Remove the change callback, if one is installed.
    pub fn clear_callback(&self) {
        let mut state = self.state();
        if let Some(id) = state.callback_id.take() {
            state.sinks.remove(&id);
        }
    }

    fn remove(&self, id: u64) {
        let mut state = self.state();
        if state.sinks.remove(&id).is_some() {
            debug!(subscriber = id, "Subscriber removed");
        }
        if state.callback_id == Some(id) {
            state.callback_id = None;
        }
    }

    /// Number of queue subscribers
    pub fn subscriber_count(&self) -> usize {
        self.state()
            .sinks
            .values()
            .filter(|sink| matches!(sink, Sink::Queue(_)))
            .count()
    }

    /// Deliver a batch to every sink. Empty batches are not delivered.
    pub fn publish(&self, events: &[IssueEvent]) {
        if events.is_empty() {
            return;
        }

        // Deliver outside the lock so callbacks may use the bus.
        let sinks: Vec<(u64, Sink)> = self
            .state()
            .sinks
            .iter()
            .map(|(id, sink)| (*id, sink.clone()))
            .collect();

        let mut closed = Vec::new();
        for (id, sink) in sinks {
            match sink {
                Sink::Queue(tx) => match tx.try_send(events.to_vec()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        warn!(
                            subscriber = id,
                            dropped = events.len(),
                            "Subscriber queue full, dropping change batch"
                        );
                    }
                    Err(TrySendError::Closed(_)) => closed.push(id),
                },
                Sink::Callback(callback) => callback(),
            }
        }

        for id in closed {
            self.remove(id);
        }
    }

    /// Drop every queue subscriber, ending their streams.
    ///
    /// The change callback survives.
    pub fn close_all(&self) {
        let mut state = self.state();
        let before = state.sinks.len();
        state.sinks.retain(|_, sink| matches!(sink, Sink::Callback(_)));
        debug!(closed = before - state.sinks.len(), "Closed subscriber queues");
    }
}

/// Receiving side of a subscription.
///
/// Yields one `Vec` per reconciliation pass. The stream ends once the store
/// stops watching or the subscription is cancelled.
pub struct EventStream {
    rx: mpsc::Receiver<Vec<IssueEvent>>,
}

impl EventStream {
    /// Wait for the next batch; `None` once the stream has ended.
    pub async fn recv(&mut self) -> Option<Vec<IssueEvent>> {
        self.rx.recv().await
    }

    /// Take a batch if one is ready.
    pub fn try_recv(&mut self) -> Option<Vec<IssueEvent>> {
        self.rx.try_recv().ok()
    }
}

/// Cancels a subscription. Cloneable and idempotent.
#[derive(Clone)]
pub struct Unsubscribe {
    bus: Weak<EventBus>,
    id: u64,
}

impl Unsubscribe {
    /// Remove the subscription; its stream ends after buffered batches drain.
    pub fn unsubscribe(&self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.remove(self.id);
        }
    }
}
