//! # Event bus for broadcasting component events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`]. The supervisor
//! and the recorder each own one; publishing never blocks their event loop.
//!
//! ## Architecture
//! ```text
//! Publisher (one loop):           Receivers (many):
//!   supervisor loop ──► Bus<SupervisorEvent> ──┬──► MessageRecorder (Message / Ok)
//!                                              ├──► AppContext listener ──► SubscriberSet
//!                                              └──► callers of subscribe()
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` calls `broadcast::Sender::send` and returns.
//! - **Bounded capacity**: one ring buffer of recent events shared by all receivers.
//! - **Lag handling**: slow receivers get `RecvError::Lagged(n)` and skip `n` oldest items.
//! - **No persistence**: events are dropped if nobody is subscribed at send time.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for [`Event`]s of kind `K`.
///
/// Cheap to clone (holds an `Arc`-backed sender).
#[derive(Debug)]
pub struct Bus<K> {
    tx: broadcast::Sender<Event<K>>,
}

impl<K> Clone for Bus<K> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<K: Clone> Bus<K> {
    /// Creates a new bus with the given channel capacity (clamped to at least 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event<K>>(capacity.max(1));
        Self { tx }
    }

    /// Wraps `kind` into a fresh [`Event`] and publishes it.
    pub fn emit(&self, kind: K) {
        self.publish(Event::new(kind));
    }

    /// Publishes an event to all active receivers.
    ///
    /// If there are no receivers, the event is dropped.
    pub fn publish(&self, ev: Event<K>) {
        let _ = self.tx.send(ev);
    }

    /// Creates a new receiver that observes events sent after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event<K>> {
        self.tx.subscribe()
    }

    /// Number of live receivers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
