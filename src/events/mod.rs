//! Component events: types and broadcast bus.
//!
//! ## Contents
//! - [`Event`] envelope (sequence number + timestamp) around a typed kind
//! - [`SupervisorEvent`], [`RecorderEvent`] one tagged variant per event kind
//! - [`AppEvent`] either of the two, for subscribers
//! - [`Inbound`], [`AsInbound`] the traffic slice the recorder consumes
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: the supervisor loop and the recorder loop, one bus each.
//! - **Consumers**: the recorder (supervisor traffic), `AppContext` listeners
//!   feeding the [`SubscriberSet`](crate::SubscriberSet), and tests.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{AppEvent, AsInbound, Event, Inbound, RecorderEvent, SupervisorEvent};
