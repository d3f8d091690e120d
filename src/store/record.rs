//! Rows waiting to be persisted and the buffer that holds them between flushes.

use chrono::{DateTime, Utc};

use crate::client::Message;

/// Payload stored for a bare acknowledgement.
pub const ACK_PAYLOAD: &str = "OK";

/// One row to be written: arrival time, raw text and command code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BufferedMessage {
    pub received_at: DateTime<Utc>,
    pub payload: String,
    pub command: Option<String>,
}

impl BufferedMessage {
    /// Row for an inbound message, stamped now.
    pub fn from_message(msg: &Message) -> Self {
        Self {
            received_at: Utc::now(),
            payload: msg.raw().to_string(),
            command: msg.command(),
        }
    }

    /// Sentinel row for a bare acknowledgement (no command).
    pub fn ack() -> Self {
        Self {
            received_at: Utc::now(),
            payload: ACK_PAYLOAD.to_string(),
            command: None,
        }
    }
}

/// Arrival-ordered rows owned by the recorder loop.
#[derive(Debug, Default)]
pub(crate) struct MessageBuffer {
    rows: Vec<BufferedMessage>,
}

impl MessageBuffer {
    pub(crate) fn push(&mut self, row: BufferedMessage) {
        self.rows.push(row);
    }

    pub(crate) fn len(&self) -> usize {
        self.rows.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Takes every buffered row, leaving the buffer empty for new arrivals.
    pub(crate) fn detach(&mut self) -> Vec<BufferedMessage> {
        std::mem::take(&mut self.rows)
    }

    /// Puts a failed batch back in front of anything that arrived since.
    pub(crate) fn requeue(&mut self, mut batch: Vec<BufferedMessage>) {
        batch.append(&mut self.rows);
        self.rows = batch;
    }
}
