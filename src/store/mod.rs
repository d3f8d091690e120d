//! # Persistence backends for recorded messages.
//!
//! The recorder writes batches of [`BufferedMessage`] rows through the
//! [`MessageStore`] trait. Which backend serves a recorder is decided by a
//! store URL, parsed into a [`StoreLocation`]:
//!
//! ```text
//! None / sqlite: / sqlite3: / file:  ──► SqliteStore   (default ./mydb.sqlite)
//! postgres: / postgresql:            ──► PostgresStore (feature "postgres")
//! anything else                      ──► RecorderError::UnsupportedScheme
//! ```
//!
//! Every backend stores the same four columns:
//! `id` (auto-increment key), `received` (timestamp), `message` (raw text),
//! `command` (message type + sub-type, nullable).

mod location;
mod record;
mod sqlite;

#[cfg(feature = "postgres")]
mod postgres;

#[cfg(test)]
pub(crate) mod memory;

use async_trait::async_trait;

use crate::error::StoreError;

pub use location::{StoreLocation, StoreTarget, DEFAULT_SQLITE_PATH, DEFAULT_TABLE};
pub use record::{BufferedMessage, ACK_PAYLOAD};
pub(crate) use record::MessageBuffer;
#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;
pub use sqlite::SqliteStore;

/// # Table-backed sink for message batches.
///
/// Implementations must:
/// - write a batch atomically (all rows or none);
/// - preserve the order of rows within a batch;
/// - keep `create_table` idempotent.
#[async_trait]
pub trait MessageStore: Send + Sync + 'static {
    /// Target table name.
    fn table(&self) -> &str;

    /// Human-readable location, free of credentials.
    fn describe(&self) -> String;

    /// Whether the target table already exists.
    async fn has_table(&self) -> Result<bool, StoreError>;

    /// Creates the target table if missing.
    async fn create_table(&self) -> Result<(), StoreError>;

    /// Appends `rows` in order; returns the number of rows written.
    async fn insert(&self, rows: &[BufferedMessage]) -> Result<usize, StoreError>;
}

/// Checks that `name` is a plain SQL identifier (`[A-Za-z_][A-Za-z0-9_]*`).
///
/// Table names end up inside DDL/DML text, so anything else is refused.
pub(crate) fn validate_table(name: &str) -> Result<(), StoreError> {
    let mut chars = name.chars();
    let head_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if head_ok && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(StoreError::InvalidTable(name.to_string()))
    }
}
