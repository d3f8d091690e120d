//! # LogWriter: component events as log lines
//!
//! Maps every [`SupervisorEvent`] and [`RecorderEvent`] onto a `tracing` event.
//! Supervisor lines carry `module = "client"` for connection traffic,
//! recorder lines carry `module = "recorder"`.
//!
//! ## Levels
//! ```text
//! heartbeat message            trace
//! other message, ok, init,     debug
//!   closing, closed
//! started, ready, wait, retry, info
//!   disconnected, flush
//! client error, flush failed,  warn
//!   supervisor lag
//! error, forced stop,          error
//!   recorder lag
//! ```

use async_trait::async_trait;
use tracing::{debug, error, info, trace, warn};

use crate::events::{AppEvent, Event, RecorderEvent, SupervisorEvent};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn supervisor(&self, ev: &SupervisorEvent) {
        match ev {
            SupervisorEvent::Starting => debug!("starting"),
            SupervisorEvent::Started { connected } => info!(connected, "started"),
            SupervisorEvent::Ready => info!(module = "client", "ready"),
            SupervisorEvent::ClientError(e) => {
                warn!(module = "client", error = %e, label = e.as_label(), "error")
            }
            SupervisorEvent::Message(m) if m.is_heartbeat() => {
                trace!(module = "client", "{}", m.raw())
            }
            SupervisorEvent::Message(m) => debug!(module = "client", "{}", m.raw()),
            SupervisorEvent::Ok => debug!(module = "client", "ok"),
            SupervisorEvent::Disconnected(None) => info!(module = "client", "disconnected"),
            SupervisorEvent::Disconnected(Some(e)) => {
                info!(module = "client", error = %e, "disconnected")
            }
            SupervisorEvent::Wait(step) => {
                info!(number = step.attempt, delay = ?step.delay, "waiting")
            }
            SupervisorEvent::Retry(step) => {
                info!(number = step.attempt, delay = ?step.delay, "retrying")
            }
            SupervisorEvent::Stopping(None) => info!("stopping"),
            SupervisorEvent::Stopping(Some(e)) => error!(error = %e, "stopping"),
            SupervisorEvent::Stopped(None) => info!("stopped"),
            SupervisorEvent::Stopped(Some(e)) => error!(error = %e, "stopped"),
            SupervisorEvent::Error(e) => error!(error = %e, label = e.as_label(), "supervisor error"),
            SupervisorEvent::Lagged { skipped } => {
                warn!(module = "client", skipped, "client events lost")
            }
        }
    }

    fn recorder(&self, ev: &RecorderEvent) {
        match ev {
            RecorderEvent::Init { table, target } => {
                debug!(module = "recorder", table = %table, store = %target, "init")
            }
            RecorderEvent::Schema { table } => {
                info!(module = "recorder", table = %table, "creating table")
            }
            RecorderEvent::Flush { count } => {
                info!(module = "recorder", records = count, "wrote {count}")
            }
            RecorderEvent::FlushFailed {
                count,
                requeued,
                error,
            } => warn!(module = "recorder", records = count, requeued, error = %error, "flush failed"),
            RecorderEvent::Closing => debug!(module = "recorder", "closing"),
            RecorderEvent::Closed => debug!(module = "recorder", "closed"),
            RecorderEvent::Lagged { skipped } => {
                error!(module = "recorder", skipped, "messages lost before buffering")
            }
            // Traffic is already logged from the supervisor side.
            RecorderEvent::Message(_) | RecorderEvent::Ok => {}
        }
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event<AppEvent>) {
        match &e.kind {
            AppEvent::Supervisor(ev) => self.supervisor(ev),
            AppEvent::Recorder(ev) => self.recorder(ev),
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
