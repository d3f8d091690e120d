//! # Embedded SQLite backend.
//!
//! Runs on a dedicated connection thread through [`tokio_rusqlite`]; each
//! batch is one transaction with a single prepared insert.

use std::path::Path;

use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};
use tokio_rusqlite::Connection;
use tracing::debug;

use crate::error::StoreError;
use crate::store::{validate_table, BufferedMessage, MessageStore};

/// [`MessageStore`] over a SQLite database file.
pub struct SqliteStore {
    conn: Connection,
    table: String,
    location: String,
}

impl SqliteStore {
    /// Opens (or creates) the database file; missing parent directories are created.
    pub async fn open(path: &Path, table: &str) -> Result<Self, StoreError> {
        validate_table(table)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let conn = Connection::open(path).await?;
        conn.call(|c| {
            c.busy_timeout(std::time::Duration::from_secs(5))?;
            Ok(())
        })
        .await?;
        debug!(path = %path.display(), table, "sqlite store opened");

        Ok(Self {
            conn,
            table: table.to_string(),
            location: format!("sqlite:{}", path.display()),
        })
    }

    /// In-memory database, gone when the store is dropped.
    pub async fn open_in_memory(table: &str) -> Result<Self, StoreError> {
        validate_table(table)?;
        let conn = Connection::open_in_memory().await?;
        Ok(Self {
            conn,
            table: table.to_string(),
            location: "sqlite::memory:".to_string(),
        })
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    fn table(&self) -> &str {
        &self.table
    }

    fn describe(&self) -> String {
        self.location.clone()
    }

    async fn has_table(&self) -> Result<bool, StoreError> {
        let table = self.table.clone();
        let found = self
            .conn
            .call(move |c| {
                let hit = c
                    .query_row(
                        "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                        [&table],
                        |row| row.get::<_, i64>(0),
                    )
                    .optional()?;
                Ok(hit.is_some())
            })
            .await?;
        Ok(found)
    }

    async fn create_table(&self) -> Result<(), StoreError> {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                received TIMESTAMP,
                message TEXT,
                command TEXT
            )",
            self.table
        );
        self.conn
            .call(move |c| {
                c.execute_batch(&ddl)?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn insert(&self, rows: &[BufferedMessage]) -> Result<usize, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "INSERT INTO \"{}\" (received, message, command) VALUES (?1, ?2, ?3)",
            self.table
        );
        let rows = rows.to_vec();
        let written = self
            .conn
            .call(move |c| {
                let tx = c.transaction()?;
                {
                    let mut stmt = tx.prepare(&sql)?;
                    for row in &rows {
                        stmt.execute(params![row.received_at, row.payload, row.command])?;
                    }
                }
                tx.commit()?;
                Ok(rows.len())
            })
            .await?;
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn row(payload: &str, command: Option<&str>) -> BufferedMessage {
        BufferedMessage {
            received_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            payload: payload.to_string(),
            command: command.map(str::to_string),
        }
    }

    async fn dump(store: &SqliteStore) -> Vec<(i64, String, Option<String>)> {
        let sql = format!("SELECT id, message, command FROM \"{}\" ORDER BY id", store.table);
        store
            .conn
            .call(move |c| {
                let mut stmt = c.prepare(&sql)?;
                let rows = stmt
                    .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_is_idempotent() {
        let store = SqliteStore::open_in_memory("elk_messages").await.unwrap();
        assert!(!store.has_table().await.unwrap());
        store.create_table().await.unwrap();
        assert!(store.has_table().await.unwrap());
        store.create_table().await.unwrap();
        assert!(store.has_table().await.unwrap());
    }

    #[tokio::test]
    async fn test_batch_keeps_order() {
        let store = SqliteStore::open_in_memory("t").await.unwrap();
        store.create_table().await.unwrap();

        let batch = vec![row("m1", Some("AS")), row("OK", None), row("m3", Some("ZC"))];
        assert_eq!(store.insert(&batch).await.unwrap(), 3);
        assert_eq!(store.insert(&[]).await.unwrap(), 0);

        let rows = dump(&store).await;
        assert_eq!(
            rows.iter().map(|r| r.1.as_str()).collect::<Vec<_>>(),
            ["m1", "OK", "m3"]
        );
        assert_eq!(rows[1].2, None);
        assert_eq!(rows[2].2.as_deref(), Some("ZC"));
        assert!(rows.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[tokio::test]
    async fn test_insert_without_table_fails() {
        let store = SqliteStore::open_in_memory("missing").await.unwrap();
        let err = store.insert(&[row("m1", None)]).await.unwrap_err();
        assert_eq!(err.as_label(), "store_sqlite");
    }

    #[tokio::test]
    async fn test_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("elk.sqlite");

        let store = SqliteStore::open(&path, "elk_messages").await.unwrap();
        store.create_table().await.unwrap();
        store.insert(&[row("m1", Some("AS"))]).await.unwrap();
        drop(store);

        let reopened = SqliteStore::open(&path, "elk_messages").await.unwrap();
        assert!(reopened.has_table().await.unwrap());
        assert_eq!(dump(&reopened).await.len(), 1);
        assert!(reopened.describe().ends_with("elk.sqlite"));
    }

    #[tokio::test]
    async fn test_rejects_bad_table() {
        assert!(matches!(
            SqliteStore::open_in_memory("x\"; --").await,
            Err(StoreError::InvalidTable(_))
        ));
    }
}
