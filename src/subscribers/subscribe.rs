//! # Core subscriber trait
//!
//! `Subscribe` is the extension point for reacting to supervisor and recorder
//! events. Each subscriber is driven by a dedicated worker loop fed by a bounded
//! queue owned by the [`SubscriberSet`](crate::subscribers::SubscriberSet).
//!
//! ## Contract
//! - Implementations may be slow (I/O, alerting); they do **not** block the
//!   component loops nor other subscribers.
//! - Each subscriber declares its preferred queue capacity via
//!   [`Subscribe::queue_capacity`]. If a queue overflows, events for that
//!   subscriber are **dropped** (warn).
//!
//! ## Example
//! ```rust
//! use elkvisor::{AppEvent, Event, RecorderEvent, Subscribe};
//!
//! struct FlushCounter(std::sync::atomic::AtomicUsize);
//!
//! #[async_trait::async_trait]
//! impl Subscribe for FlushCounter {
//!     async fn on_event(&self, ev: &Event<AppEvent>) {
//!         if let AppEvent::Recorder(RecorderEvent::Flush { count }) = &ev.kind {
//!             self.0.fetch_add(*count, std::sync::atomic::Ordering::Relaxed);
//!         }
//!     }
//!     fn name(&self) -> &'static str { "flush-counter" }
//! }
//! ```

use async_trait::async_trait;

use crate::events::{AppEvent, Event};

/// Contract for event subscribers.
///
/// Called from a subscriber-dedicated worker task. Implementations should avoid
/// blocking the async runtime.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handle a single event.
    async fn on_event(&self, event: &Event<AppEvent>);

    /// Human-readable name (for logs).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Preferred capacity of this subscriber's queue.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
