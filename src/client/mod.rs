//! # Transport client seam.
//!
//! The supervisor never touches sockets. It drives a [`Client`] through
//! `connect`/`disconnect` and listens to its [`ClientEvent`] stream:
//!
//! ```text
//!   Client ── ready / error / message / ok / disconnected ──► supervisor loop
//!     ▲
//!     └──── connect() / disconnect() ─────────────────────── supervisor loop
//! ```
//!
//! [`TcpClient`] is a plain line-framed implementation used by the binary.

mod message;
mod tcp;

#[cfg(test)]
pub(crate) mod mock;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::ClientError;
use crate::events::{AsInbound, Event, Inbound};

pub use message::Message;
pub use tcp::TcpClient;

/// Events a client reports about its connection.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientEvent {
    /// The session is usable (connected and, if required, authenticated).
    Ready,
    /// A non-terminal error.
    Error(ClientError),
    /// An inbound packet.
    Message(Message),
    /// A bare acknowledgement line.
    Ok,
    /// The connection is gone; `None` for a requested disconnect.
    Disconnected(Option<ClientError>),
}

impl AsInbound for ClientEvent {
    fn as_inbound(&self) -> Option<Inbound> {
        match self {
            ClientEvent::Message(m) => Some(Inbound::Message(m.clone())),
            ClientEvent::Ok => Some(Inbound::Ok),
            _ => None,
        }
    }
}

/// # Connection to the remote panel.
///
/// Implementations must:
/// - emit [`ClientEvent::Ready`] once per established session;
/// - emit [`ClientEvent::Disconnected`] whenever an established session ends;
/// - keep `connect`/`disconnect` safe to call repeatedly.
#[async_trait]
pub trait Client: Send + Sync + 'static {
    /// Opens the connection; resolves once the attempt settles.
    async fn connect(&self) -> Result<(), ClientError>;

    /// Closes the connection; resolves once teardown is complete.
    async fn disconnect(&self) -> Result<(), ClientError>;

    /// Whether a session is currently established.
    fn is_connected(&self) -> bool;

    /// Subscribes to the client's event stream.
    fn subscribe(&self) -> broadcast::Receiver<Event<ClientEvent>>;
}
