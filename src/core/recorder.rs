//! # Message recorder: buffer inbound traffic, flush it to a store in batches.
//!
//! [`MessageRecorder`] is a handle to a loop task that owns the buffer:
//!
//! ```text
//!   upstream bus ── Message / Ok ──┐
//!   MessageRecorder::close ─ cmd ──┼──► recorder loop ──► Bus<RecorderEvent>
//!   flush timer ───────────────────┤         │
//!   store.insert() completion ─────┘         └──► store.insert(batch)
//! ```
//!
//! ## Rules
//! - A flush detaches the whole buffer; rows arriving during the write go to the next flush.
//! - At most one write is in flight; the timer is re-armed when it settles.
//! - A failed periodic write is put back at the head of the buffer.
//! - `close()` unsubscribes, waits for the in-flight write, flushes once more and stops.

use std::future::pending;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{self, Instant, Sleep};
use tracing::{debug, info, warn};

use crate::config::RecorderConfig;
use crate::error::{RecorderError, StoreError};
use crate::events::{AsInbound, Bus, Event, Inbound, RecorderEvent};
use crate::store::{BufferedMessage, MessageBuffer, MessageStore, StoreLocation};

enum Command {
    Close(oneshot::Sender<Result<(), RecorderError>>),
    Buffered(oneshot::Sender<usize>),
}

/// A finished store write, re-entering the loop.
struct Written {
    batch: Vec<BufferedMessage>,
    result: Result<usize, StoreError>,
}

/// Handle to the message recorder.
#[derive(Clone)]
pub struct MessageRecorder {
    cmd: mpsc::UnboundedSender<Command>,
    bus: Bus<RecorderEvent>,
    store: Arc<dyn MessageStore>,
}

impl MessageRecorder {
    /// Subscribes to `source` and spawns the recorder loop; the flush timer starts now.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new<E>(
        source: broadcast::Receiver<Event<E>>,
        store: Arc<dyn MessageStore>,
        cfg: &RecorderConfig,
    ) -> Self
    where
        E: AsInbound + Clone + Send + 'static,
    {
        let bus = Bus::new(cfg.bus_capacity);
        let (cmd, rx) = mpsc::unbounded_channel();

        let worker = Worker {
            store: Arc::clone(&store),
            bus: bus.clone(),
            include_heartbeats: cfg.include_heartbeats,
            interval: cfg.flush_interval,
            buffer: MessageBuffer::default(),
            source: Some(source),
            inflight: None,
            next_flush: Box::pin(time::sleep(cfg.flush_interval)),
            closing: false,
            close_waiters: Vec::new(),
        };
        tokio::spawn(worker.run(rx));

        Self { cmd, bus, store }
    }

    /// Resolves `cfg.store_url`, opens the store and starts the recorder.
    pub async fn open<E>(
        source: broadcast::Receiver<Event<E>>,
        cfg: &RecorderConfig,
    ) -> Result<Self, RecorderError>
    where
        E: AsInbound + Clone + Send + 'static,
    {
        let location = StoreLocation::from_url(cfg.store_url.as_deref())?;
        info!(store = %location.describe(), table = %location.table, "opening message store");
        let store = location.open().await?;
        Ok(Self::new(source, store, cfg))
    }

    /// Creates the target table if it is missing; returns whether it was created.
    pub async fn init(&self) -> Result<bool, RecorderError> {
        let table = self.store.table().to_string();
        self.bus.emit(RecorderEvent::Init {
            table: table.clone(),
            target: self.store.describe(),
        });
        if self.store.has_table().await? {
            return Ok(false);
        }
        self.bus.emit(RecorderEvent::Schema { table });
        self.store.create_table().await?;
        Ok(true)
    }

    /// Stops recording: unsubscribes, waits for a running write, then writes
    /// whatever is left. Fails if that last write fails.
    pub async fn close(&self) -> Result<(), RecorderError> {
        let (tx, rx) = oneshot::channel();
        self.cmd
            .send(Command::Close(tx))
            .map_err(|_| RecorderError::Closed)?;
        rx.await.map_err(|_| RecorderError::Closed)?
    }

    /// Number of rows waiting for the next flush.
    pub async fn buffered(&self) -> Result<usize, RecorderError> {
        let (tx, rx) = oneshot::channel();
        self.cmd
            .send(Command::Buffered(tx))
            .map_err(|_| RecorderError::Closed)?;
        rx.await.map_err(|_| RecorderError::Closed)
    }

    /// Subscribes to recorder events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event<RecorderEvent>> {
        self.bus.subscribe()
    }
}

struct Worker<E> {
    store: Arc<dyn MessageStore>,
    bus: Bus<RecorderEvent>,
    include_heartbeats: bool,
    interval: Duration,
    buffer: MessageBuffer,
    /// Upstream subscription; dropped on close.
    source: Option<broadcast::Receiver<Event<E>>>,
    inflight: Option<BoxFuture<'static, Written>>,
    next_flush: Pin<Box<Sleep>>,
    closing: bool,
    close_waiters: Vec<oneshot::Sender<Result<(), RecorderError>>>,
}

impl<E> Worker<E>
where
    E: AsInbound + Clone + Send + 'static,
{
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let mut handles_alive = true;
        loop {
            if self.closing && self.inflight.is_none() {
                break;
            }
            let timer_armed = !self.closing && self.inflight.is_none();

            tokio::select! {
                biased;
                ev = next_inbound(&mut self.source) => match ev {
                    Ok(ev) => self.on_inbound(ev.kind.as_inbound()),
                    Err(RecvError::Lagged(n)) => {
                        warn!(skipped = n, "recorder lagged behind upstream events");
                        self.bus.emit(RecorderEvent::Lagged { skipped: n });
                    }
                    Err(RecvError::Closed) => {
                        debug!("upstream closed");
                        self.source = None;
                    }
                },
                cmd = commands.recv(), if handles_alive => match cmd {
                    Some(Command::Close(reply)) => {
                        self.close_waiters.push(reply);
                        self.begin_close();
                    }
                    Some(Command::Buffered(reply)) => {
                        let _ = reply.send(self.buffer.len());
                    }
                    None => {
                        handles_alive = false;
                        self.begin_close();
                    }
                },
                written = settle(&mut self.inflight) => {
                    self.inflight = None;
                    self.on_written(written);
                }
                _ = self.next_flush.as_mut(), if timer_armed => self.on_tick(),
            }
        }

        let result = self.final_flush().await;
        self.bus.emit(RecorderEvent::Closed);
        info!("recorder closed");

        for waiter in self.close_waiters.drain(..) {
            let _ = waiter.send(result.as_ref().map(|_| ()).map_err(clone_final));
        }
    }

    fn on_inbound(&mut self, inbound: Option<Inbound>) {
        match inbound {
            Some(Inbound::Message(msg)) => {
                let store = self.include_heartbeats || !msg.is_heartbeat();
                if store {
                    self.buffer.push(BufferedMessage::from_message(&msg));
                }
                self.bus.emit(RecorderEvent::Message(msg));
            }
            Some(Inbound::Ok) => {
                self.buffer.push(BufferedMessage::ack());
                self.bus.emit(RecorderEvent::Ok);
            }
            None => {}
        }
    }

    fn on_tick(&mut self) {
        if self.buffer.is_empty() {
            self.rearm();
            return;
        }
        let batch = self.buffer.detach();
        debug!(count = batch.len(), "flushing buffered messages");
        let store = Arc::clone(&self.store);
        self.inflight = Some(Box::pin(async move {
            let result = store.insert(&batch).await;
            Written { batch, result }
        }));
    }

    fn on_written(&mut self, written: Written) {
        let count = written.batch.len();
        match written.result {
            Ok(_) => self.bus.emit(RecorderEvent::Flush { count }),
            Err(e) => {
                warn!(count, error = %e, label = e.as_label(), "flush failed; batch requeued");
                self.buffer.requeue(written.batch);
                self.bus.emit(RecorderEvent::FlushFailed {
                    count,
                    requeued: true,
                    error: e.to_string(),
                });
            }
        }
        if !self.closing {
            self.rearm();
        }
    }

    fn begin_close(&mut self) {
        if self.closing {
            return;
        }
        self.closing = true;
        self.source = None;
        self.bus.emit(RecorderEvent::Closing);
    }

    fn rearm(&mut self) {
        self.next_flush.as_mut().reset(Instant::now() + self.interval);
    }

    async fn final_flush(&mut self) -> Result<(), RecorderError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let batch = self.buffer.detach();
        let count = batch.len();
        match self.store.insert(&batch).await {
            Ok(_) => {
                self.bus.emit(RecorderEvent::Flush { count });
                Ok(())
            }
            Err(e) => {
                warn!(count, error = %e, label = e.as_label(), "final flush failed");
                self.bus.emit(RecorderEvent::FlushFailed {
                    count,
                    requeued: false,
                    error: e.to_string(),
                });
                Err(RecorderError::FinalFlush {
                    count,
                    reason: e.to_string(),
                })
            }
        }
    }
}

/// Every close caller gets its own copy of the final-flush outcome.
fn clone_final(err: &RecorderError) -> RecorderError {
    match err {
        RecorderError::FinalFlush { count, reason } => RecorderError::FinalFlush {
            count: *count,
            reason: reason.clone(),
        },
        _ => RecorderError::Closed,
    }
}

/// Next upstream event; pends forever once unsubscribed.
async fn next_inbound<E: Clone>(
    source: &mut Option<broadcast::Receiver<Event<E>>>,
) -> Result<Event<E>, RecvError> {
    match source {
        Some(rx) => rx.recv().await,
        None => pending().await,
    }
}

/// Completion of the in-flight write; pends forever when none is running.
async fn settle(slot: &mut Option<BoxFuture<'static, Written>>) -> Written {
    match slot {
        Some(fut) => fut.await,
        None => pending().await,
    }
}
