//! # Component configuration.
//!
//! - [`SupervisorConfig`]: panel credentials, transport and reconnect pacing;
//! - [`RecorderConfig`]: store location, heartbeat filtering and flush cadence.
//!
//! Both are plain data with `Default` impls; the binary fills them from
//! command-line flags and environment variables.
//!
//! ## Sentinel values
//! - `TransportConfig::port = None` → panel default (2101 plain, 2601 secure)
//! - `RecorderConfig::store_url = None` → `./mydb.sqlite`, table `elk_messages`

use std::fmt;
use std::time::Duration;

use crate::policies::BackoffPolicy;

/// Default plain-text panel port.
pub const DEFAULT_PLAIN_PORT: u16 = 2101;
/// Default secure panel port.
pub const DEFAULT_SECURE_PORT: u16 = 2601;

/// Panel login.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Where and how to reach the panel.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransportConfig {
    /// Request a secure transport.
    pub secure: bool,
    /// Panel host name or address.
    pub host: Option<String>,
    /// Panel port; `None` picks the default for `secure`.
    pub port: Option<u16>,
}

impl TransportConfig {
    /// Returns the port to dial, applying the plain/secure default.
    #[inline]
    pub fn effective_port(&self) -> u16 {
        match (self.port, self.secure) {
            (Some(p), _) => p,
            (None, true) => DEFAULT_SECURE_PORT,
            (None, false) => DEFAULT_PLAIN_PORT,
        }
    }
}

/// Settings for the client the supervisor owns.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClientConfig {
    /// Login; `None` connects without authenticating.
    pub credentials: Option<Credentials>,
    pub transport: TransportConfig,
}

/// Configuration of the connection supervisor.
///
/// ## Field semantics
/// - `client`: passed to the transport client the binary builds
/// - `backoff`: reconnect pacing after unexpected disconnects
/// - `bus_capacity`: event ring buffer size (min 1; clamped by the bus)
#[derive(Clone, Debug, PartialEq)]
pub struct SupervisorConfig {
    pub client: ClientConfig,
    pub backoff: BackoffPolicy,
    pub bus_capacity: usize,
}

impl Default for SupervisorConfig {
    /// Default configuration:
    ///
    /// - `backoff = BackoffPolicy::default()` (1s → 30s Fibonacci, no jitter)
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            client: ClientConfig::default(),
            backoff: BackoffPolicy::default(),
            bus_capacity: 1024,
        }
    }
}

/// Configuration of the message recorder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecorderConfig {
    /// Store location (`sqlite:`, `file:`, `postgresql:`), `?table=` selects the table.
    pub store_url: Option<String>,
    /// Persist heartbeat messages too.
    pub include_heartbeats: bool,
    /// Time between periodic flushes.
    pub flush_interval: Duration,
    /// Event ring buffer size (min 1; clamped by the bus).
    pub bus_capacity: usize,
}

impl Default for RecorderConfig {
    /// Default configuration:
    ///
    /// - `store_url = None` (local SQLite file)
    /// - `include_heartbeats = false`
    /// - `flush_interval = 30s`
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            store_url: None,
            include_heartbeats: false,
            flush_interval: Duration::from_secs(30),
            bus_capacity: 1024,
        }
    }
}
