//! # Events emitted by the supervisor and the recorder.
//!
//! Each component publishes a tagged enum describing what happened:
//! - [`SupervisorEvent`]: connection lifecycle, backoff pacing and relayed client traffic;
//! - [`RecorderEvent`]: schema setup, flush outcomes, shutdown and forwarded traffic.
//!
//! Every event travels inside an [`Event`] envelope that carries a global
//! sequence number and a wall-clock timestamp.
//!
//! ## Ordering guarantees
//! `seq` is unique and increases monotonically across all buses in the
//! process. Use it to restore the exact order when events from both
//! components are merged.
//!
//! ## Example
//! ```rust
//! use elkvisor::{Event, SupervisorEvent};
//!
//! let a = Event::new(SupervisorEvent::Starting);
//! let b = Event::new(SupervisorEvent::Started { connected: true });
//! assert!(a.seq < b.seq);
//! assert_eq!(b.kind.as_label(), "started");
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::client::Message;
use crate::error::{ClientError, SupervisorError};
use crate::policies::BackoffStep;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Envelope shared by all event kinds.
#[derive(Clone, Debug)]
pub struct Event<K> {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// What happened.
    pub kind: K,
}

impl<K> Event<K> {
    /// Creates a new event with the current timestamp and the next sequence number.
    pub fn new(kind: K) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
        }
    }

    /// Converts the kind, keeping `seq` and `at`.
    pub fn map<T>(self, f: impl FnOnce(K) -> T) -> Event<T> {
        Event {
            seq: self.seq,
            at: self.at,
            kind: f(self.kind),
        }
    }
}

/// Lifecycle and traffic events of the connection supervisor.
#[derive(Clone, Debug, PartialEq)]
pub enum SupervisorEvent {
    /// `start()` accepted; the initial connect is about to be issued.
    Starting,
    /// The initial connect settled.
    Started {
        /// Whether the connect succeeded.
        connected: bool,
    },
    /// The client reported a usable session; backoff has been reset.
    Ready,
    /// The client reported an error (does not trigger a reconnect by itself).
    ClientError(ClientError),
    /// An inbound message relayed from the client.
    Message(Message),
    /// A bare acknowledgement relayed from the client.
    Ok,
    /// The client lost its connection.
    Disconnected(Option<ClientError>),
    /// A reconnect attempt was scheduled.
    Wait(BackoffStep),
    /// A scheduled reconnect attempt fired and a connect was issued.
    Retry(BackoffStep),
    /// Teardown began; carries the cause for forced teardowns.
    Stopping(Option<SupervisorError>),
    /// Teardown finished; carries the cause for forced teardowns.
    Stopped(Option<SupervisorError>),
    /// A terminal supervisor failure.
    Error(SupervisorError),
    /// The loop fell behind the client's event stream and lost events.
    Lagged {
        /// Client events dropped.
        skipped: u64,
    },
}

impl SupervisorEvent {
    /// Returns a short stable label (kebab-case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            SupervisorEvent::Starting => "starting",
            SupervisorEvent::Started { .. } => "started",
            SupervisorEvent::Ready => "ready",
            SupervisorEvent::ClientError(_) => "client-error",
            SupervisorEvent::Message(_) => "message",
            SupervisorEvent::Ok => "ok",
            SupervisorEvent::Disconnected(_) => "disconnected",
            SupervisorEvent::Wait(_) => "wait",
            SupervisorEvent::Retry(_) => "retry",
            SupervisorEvent::Stopping(_) => "stopping",
            SupervisorEvent::Stopped(_) => "stopped",
            SupervisorEvent::Error(_) => "error",
            SupervisorEvent::Lagged { .. } => "lagged",
        }
    }
}

/// Events of the message recorder.
#[derive(Clone, Debug, PartialEq)]
pub enum RecorderEvent {
    /// `init()` began against the given table and store.
    Init {
        /// Target table.
        table: String,
        /// Human-readable store description (no credentials).
        target: String,
    },
    /// The target table was absent and is being created.
    Schema {
        /// Target table.
        table: String,
    },
    /// A batch was written.
    Flush {
        /// Rows written.
        count: usize,
    },
    /// A batch write failed.
    FlushFailed {
        /// Rows in the failed batch.
        count: usize,
        /// Whether the batch went back to the head of the buffer.
        requeued: bool,
        /// Store error message.
        error: String,
    },
    /// `close()` began.
    Closing,
    /// `close()` finished; no further flush will run.
    Closed,
    /// An inbound message (heartbeats included, even when not stored).
    Message(Message),
    /// A bare acknowledgement.
    Ok,
    /// The recorder fell behind its source; that many events never reached the buffer.
    Lagged {
        /// Source events dropped.
        skipped: u64,
    },
}

impl RecorderEvent {
    /// Returns a short stable label (kebab-case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            RecorderEvent::Init { .. } => "init",
            RecorderEvent::Schema { .. } => "schema",
            RecorderEvent::Flush { .. } => "flush",
            RecorderEvent::FlushFailed { .. } => "flush-failed",
            RecorderEvent::Closing => "closing",
            RecorderEvent::Closed => "closed",
            RecorderEvent::Message(_) => "message",
            RecorderEvent::Ok => "ok",
            RecorderEvent::Lagged { .. } => "lagged",
        }
    }
}

/// Inbound traffic the recorder cares about.
#[derive(Clone, Debug, PartialEq)]
pub enum Inbound {
    /// A parsed message.
    Message(Message),
    /// A bare acknowledgement.
    Ok,
}

/// Anything that can carry inbound traffic for the recorder.
///
/// Implemented by [`SupervisorEvent`] and [`ClientEvent`](crate::ClientEvent)
/// so the recorder can sit behind either.
pub trait AsInbound {
    /// Returns the inbound traffic carried by this event, if any.
    fn as_inbound(&self) -> Option<Inbound>;
}

impl AsInbound for SupervisorEvent {
    fn as_inbound(&self) -> Option<Inbound> {
        match self {
            SupervisorEvent::Message(m) => Some(Inbound::Message(m.clone())),
            SupervisorEvent::Ok => Some(Inbound::Ok),
            _ => None,
        }
    }
}

/// Either component's event, for consumers that watch both.
#[derive(Clone, Debug, PartialEq)]
pub enum AppEvent {
    Supervisor(SupervisorEvent),
    Recorder(RecorderEvent),
}
