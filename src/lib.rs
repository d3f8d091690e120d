//! # elkvisor
//!
//! **elkvisor** keeps one connection to an alarm panel alive and records
//! everything the panel says.
//!
//! It provides two components and the glue between them:
//! - a [`Supervisor`] that owns a [`Client`], makes `start`/`stop` idempotent
//!   and reconnects with Fibonacci backoff after unexpected disconnects;
//! - a [`MessageRecorder`] that buffers the supervisor's traffic and writes it
//!   in batches to SQLite (or PostgreSQL with the `postgres` feature);
//! - an [`AppContext`] that wires both and fans their events out to
//!   [`Subscribe`] implementations such as [`LogWriter`].
//!
//! ## Architecture
//! ```text
//!                         connect()/disconnect()
//!            ┌──────────────────────────────────────────────┐
//!            ▼                                              │
//!     ┌──────────────┐  ClientEvent   ┌───────────────────────────────┐
//!     │    Client    │ ─────────────► │ Supervisor loop               │
//!     │ (TcpClient)  │                │  - ConnectionState            │
//!     └──────────────┘                │  - Backoff (Fibonacci timer)  │
//!                                     └───────────────┬───────────────┘
//!                                                     ▼
//!                                       Bus<SupervisorEvent> (broadcast)
//!                                        │                        │
//!                                        ▼                        │
//!                     ┌───────────────────────────────────┐       │
//!                     │ MessageRecorder loop              │       │
//!                     │  - buffer (arrival order)         │       │
//!                     │  - flush timer / final flush      │       │
//!                     └──────┬─────────────────┬──────────┘       │
//!                            ▼                 ▼                  │
//!                      MessageStore     Bus<RecorderEvent>        │
//!                   (SQLite/Postgres)          │                  │
//!                                              ▼                  ▼
//!                                       AppContext listener (AppEvent)
//!                                                  │
//!                                                  ▼
//!                                  SubscriberSet ──► LogWriter, ...
//! ```
//!
//! ### Reconnect pacing
//! ```text
//! disconnected (while active)
//!   ├─► Backoff::schedule() ─► Wait{attempt, delay}
//!   ├─► timer elapses       ─► Retry{attempt, delay} ─► client.connect()
//!   │        ├─ ok    ─► Ready ─► backoff reset
//!   │        └─ error ─► schedule next step (1, 1, 2, 3, 5, ... capped at max)
//!   └─► max_attempts exceeded ─► Error(BackoffExhausted) ─► Stopping ─► Stopped
//! ```
//!
//! ## Features
//! | Area              | Description                                                 | Key types / traits                        |
//! |-------------------|-------------------------------------------------------------|-------------------------------------------|
//! | **Supervision**   | One connection, idempotent start/stop, automatic reconnect. | [`Supervisor`], [`Client`]                |
//! | **Policies**      | Fibonacci backoff with cap, jitter and attempt ceiling.     | [`BackoffPolicy`], [`JitterPolicy`]       |
//! | **Recording**     | Buffered, batched persistence of inbound traffic.           | [`MessageRecorder`], [`MessageStore`]     |
//! | **Subscriber API**| Hook into supervisor/recorder events.                       | [`Subscribe`], [`SubscriberSet`]          |
//! | **Errors**        | Typed errors with stable labels.                            | [`ClientError`], [`RecorderError`], ...   |
//! | **Configuration** | Plain config structs with documented defaults.              | [`SupervisorConfig`], [`RecorderConfig`]  |
//!
//! ## Optional features
//! - `postgres`: enables [`PostgresStore`](store::PostgresStore) for `postgres:` store URLs.
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use elkvisor::{AppContext, LogWriter, RecorderConfig, SupervisorConfig, TcpClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut sup_cfg = SupervisorConfig::default();
//!     sup_cfg.client.transport.host = Some("192.168.1.20".into());
//!
//!     let client = Arc::new(TcpClient::new(sup_cfg.client.clone()));
//!     let mut app = AppContext::build(
//!         client,
//!         &sup_cfg,
//!         &RecorderConfig::default(),
//!         vec![Arc::new(LogWriter::new())],
//!     )
//!     .await?;
//!
//!     app.startup().await?;
//!     tokio::select! {
//!         _ = tokio::signal::ctrl_c() => {}
//!         err = app.fatal() => eprintln!("giving up: {err}"),
//!     }
//!     app.shutdown().await?;
//!     Ok(())
//! }
//! ```

mod app;
mod client;
mod config;
mod core;
mod error;
mod events;
mod policies;
mod subscribers;

pub mod store;

// ---- Public re-exports ----

pub use app::AppContext;
pub use client::{Client, ClientEvent, Message, TcpClient};
pub use config::{
    ClientConfig, Credentials, RecorderConfig, SupervisorConfig, TransportConfig,
    DEFAULT_PLAIN_PORT, DEFAULT_SECURE_PORT,
};
pub use self::core::{wait_for_shutdown_signal, ConnectionState, MessageRecorder, ShutdownSignal, Supervisor};
pub use error::{AppError, ClientError, RecorderError, StoreError, SupervisorError};
pub use events::{AppEvent, AsInbound, Bus, Event, Inbound, RecorderEvent, SupervisorEvent};
pub use policies::{Backoff, BackoffPolicy, BackoffStep, JitterPolicy};
pub use store::{BufferedMessage, MessageStore};
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
