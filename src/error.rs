//! Error types used by the supervisor, the recorder and the stores behind it.
//!
//! - [`ClientError`]: failures reported by a [`Client`](crate::Client) implementation.
//! - [`SupervisorError`]: terminal failures of the connection supervisor.
//! - [`StoreError`]: failures of a [`MessageStore`](crate::MessageStore) backend.
//! - [`RecorderError`]: failures surfaced by the message recorder.
//! - [`AppError`]: startup/shutdown failures of the wired application.
//!
//! Every enum provides `as_label` (stable snake_case label for logs).

use thiserror::Error;

/// # Errors produced by a transport client.
///
/// Connection problems are transient from the supervisor's point of view:
/// they are absorbed and drive the backoff loop instead of reaching callers.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Transport-level I/O failure (connect refused, reset, broken pipe).
    #[error("connection failed: {reason}")]
    Connection {
        /// The underlying error message.
        reason: String,
    },

    /// The remote end rejected the supplied credentials.
    #[error("authentication rejected")]
    Authentication,

    /// The client is not configured with a host to connect to.
    #[error("no host configured")]
    MissingHost,

    /// Secure transport was requested but this client only speaks plain TCP.
    #[error("secure transport is not supported by this client")]
    TlsUnsupported,

    /// The remote end closed the connection.
    #[error("connection closed by peer")]
    Closed,
}

impl ClientError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use elkvisor::ClientError;
    ///
    /// let err = ClientError::Connection { reason: "refused".into() };
    /// assert_eq!(err.as_label(), "client_connection");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ClientError::Connection { .. } => "client_connection",
            ClientError::Authentication => "client_authentication",
            ClientError::MissingHost => "client_missing_host",
            ClientError::TlsUnsupported => "client_tls_unsupported",
            ClientError::Closed => "client_closed",
        }
    }

    pub(crate) fn io(err: std::io::Error) -> Self {
        ClientError::Connection {
            reason: err.to_string(),
        }
    }
}

/// # Terminal errors of the connection supervisor.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SupervisorError {
    /// The configured attempt ceiling was exceeded while reconnecting.
    #[error("could not connect after {attempts} attempts")]
    BackoffExhausted {
        /// Number of backoff attempts that were made.
        attempts: u32,
    },

    /// The supervisor event loop is gone (runtime shut down).
    #[error("supervisor is closed")]
    Closed,
}

impl SupervisorError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            SupervisorError::BackoffExhausted { .. } => "supervisor_backoff_exhausted",
            SupervisorError::Closed => "supervisor_closed",
        }
    }

    /// True for errors that must bring the process down.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SupervisorError::BackoffExhausted { .. })
    }
}

/// # Errors produced by a persistence backend.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// PostgreSQL failure.
    #[cfg(feature = "postgres")]
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// Could not open or keep the connection to the store.
    #[error("store connection error: {0}")]
    Connection(String),

    /// Table name is not a plain SQL identifier.
    #[error("invalid table name {0:?}")]
    InvalidTable(String),

    /// I/O error (e.g. creating the database directory).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            StoreError::Sqlite(_) => "store_sqlite",
            #[cfg(feature = "postgres")]
            StoreError::Postgres(_) => "store_postgres",
            StoreError::Connection(_) => "store_connection",
            StoreError::InvalidTable(_) => "store_invalid_table",
            StoreError::Io(_) => "store_io",
        }
    }
}

impl From<tokio_rusqlite::Error> for StoreError {
    fn from(err: tokio_rusqlite::Error) -> Self {
        match err {
            tokio_rusqlite::Error::Rusqlite(e) => StoreError::Sqlite(e),
            other => StoreError::Connection(other.to_string()),
        }
    }
}

/// # Errors surfaced by the message recorder.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RecorderError {
    /// The store URL could not be parsed.
    #[error("invalid store url {url:?}: {reason}")]
    InvalidStoreUrl {
        /// The offending URL.
        url: String,
        /// Parser message.
        reason: String,
    },

    /// The store URL names a scheme this build cannot serve.
    #[error("unsupported store scheme {scheme:?}")]
    UnsupportedScheme {
        /// The URL scheme, without the trailing colon.
        scheme: String,
    },

    /// The backing store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The final flush at close failed; the batch could not be persisted.
    #[error("final flush of {count} messages failed: {reason}")]
    FinalFlush {
        /// Rows in the lost batch.
        count: usize,
        /// Store error message.
        reason: String,
    },

    /// The recorder has already been closed.
    #[error("recorder is closed")]
    Closed,
}

impl RecorderError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use elkvisor::RecorderError;
    ///
    /// let err = RecorderError::UnsupportedScheme { scheme: "mysql".into() };
    /// assert_eq!(err.as_label(), "recorder_unsupported_scheme");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RecorderError::InvalidStoreUrl { .. } => "recorder_invalid_store_url",
            RecorderError::UnsupportedScheme { .. } => "recorder_unsupported_scheme",
            RecorderError::Store(e) => e.as_label(),
            RecorderError::FinalFlush { .. } => "recorder_final_flush",
            RecorderError::Closed => "recorder_closed",
        }
    }
}

/// # Errors surfaced by [`AppContext`](crate::AppContext).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum AppError {
    /// The supervisor failed or is gone.
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    /// The recorder failed (schema, store or final flush).
    #[error(transparent)]
    Recorder(#[from] RecorderError),
}

impl AppError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            AppError::Supervisor(e) => e.as_label(),
            AppError::Recorder(e) => e.as_label(),
        }
    }
}
