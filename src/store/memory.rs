//! In-memory store for recorder tests: records batches, can fail or stall writes.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::store::{BufferedMessage, MessageStore};

pub(crate) struct MemoryStore {
    table: String,
    created: AtomicBool,
    batches: Mutex<Vec<Vec<BufferedMessage>>>,
    failures: AtomicUsize,
    write_delay: Duration,
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self {
            table: "elk_messages".into(),
            created: AtomicBool::new(false),
            batches: Mutex::new(Vec::new()),
            failures: AtomicUsize::new(0),
            write_delay: Duration::ZERO,
        }
    }

    pub(crate) fn with_write_delay(mut self, d: Duration) -> Self {
        self.write_delay = d;
        self
    }

    /// The next `n` inserts fail.
    pub(crate) fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// Successfully written batches, payloads only.
    pub(crate) fn payloads(&self) -> Vec<Vec<String>> {
        self.batches
            .lock()
            .unwrap()
            .iter()
            .map(|b| b.iter().map(|m| m.payload.clone()).collect())
            .collect()
    }

    pub(crate) fn batches(&self) -> Vec<Vec<BufferedMessage>> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    fn table(&self) -> &str {
        &self.table
    }

    fn describe(&self) -> String {
        "memory".into()
    }

    async fn has_table(&self) -> Result<bool, StoreError> {
        Ok(self.created.load(Ordering::SeqCst))
    }

    async fn create_table(&self) -> Result<(), StoreError> {
        self.created.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn insert(&self, rows: &[BufferedMessage]) -> Result<usize, StoreError> {
        if !self.write_delay.is_zero() {
            tokio::time::sleep(self.write_delay).await;
        }
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::Connection("injected write failure".into()));
        }
        self.batches.lock().unwrap().push(rows.to_vec());
        Ok(rows.len())
    }
}
