//! Scripted in-memory client for supervisor tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::client::{Client, ClientEvent};
use crate::error::ClientError;
use crate::events::{Bus, Event};

pub(crate) struct MockClient {
    bus: Bus<ClientEvent>,
    connected: AtomicBool,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    results: Mutex<VecDeque<Result<(), ClientError>>>,
    connect_delay: Duration,
    disconnect_delay: Duration,
}

impl MockClient {
    pub(crate) fn new() -> Self {
        Self {
            bus: Bus::new(256),
            connected: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
            results: Mutex::new(VecDeque::new()),
            connect_delay: Duration::ZERO,
            disconnect_delay: Duration::ZERO,
        }
    }

    pub(crate) fn with_connect_delay(mut self, d: Duration) -> Self {
        self.connect_delay = d;
        self
    }

    pub(crate) fn with_disconnect_delay(mut self, d: Duration) -> Self {
        self.disconnect_delay = d;
        self
    }

    /// Queues outcomes for the next connects; once drained, connects succeed.
    pub(crate) fn script(&self, results: impl IntoIterator<Item = Result<(), ClientError>>) {
        self.results.lock().unwrap().extend(results);
    }

    pub(crate) fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub(crate) fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    /// Simulates the remote end dropping the session.
    pub(crate) fn drop_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.bus
            .emit(ClientEvent::Disconnected(Some(ClientError::Closed)));
    }

    /// Loses the session without telling anyone.
    pub(crate) fn sever(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub(crate) fn emit(&self, ev: ClientEvent) {
        self.bus.emit(ev);
    }
}

#[async_trait]
impl Client for MockClient {
    async fn connect(&self) -> Result<(), ClientError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if !self.connect_delay.is_zero() {
            tokio::time::sleep(self.connect_delay).await;
        }
        let outcome = self.results.lock().unwrap().pop_front().unwrap_or(Ok(()));
        if outcome.is_ok() {
            self.connected.store(true, Ordering::SeqCst);
            self.bus.emit(ClientEvent::Ready);
        }
        outcome
    }

    async fn disconnect(&self) -> Result<(), ClientError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        if !self.disconnect_delay.is_zero() {
            tokio::time::sleep(self.disconnect_delay).await;
        }
        if self.connected.swap(false, Ordering::SeqCst) {
            self.bus.emit(ClientEvent::Disconnected(None));
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> broadcast::Receiver<Event<ClientEvent>> {
        self.bus.subscribe()
    }
}
