//! # PostgreSQL backend (feature `postgres`).

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, warn};
use url::Url;

use crate::error::StoreError;
use crate::store::{validate_table, BufferedMessage, MessageStore};

/// Rows per INSERT statement; keeps bind parameters under the protocol limit.
const ROWS_PER_STATEMENT: usize = 1000;

/// [`MessageStore`] over a PostgreSQL connection.
pub struct PostgresStore {
    client: Mutex<Client>,
    table: String,
    location: String,
    driver: JoinHandle<()>,
}

impl PostgresStore {
    /// Connects and spawns the connection driver task.
    pub async fn connect(url: &str, table: &str) -> Result<Self, StoreError> {
        validate_table(table)?;
        let (client, connection) = tokio_postgres::connect(url, NoTls).await?;
        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!(error = %e, "postgres connection ended");
            }
        });

        let location = match Url::parse(url) {
            Ok(mut u) => {
                let _ = u.set_password(None);
                u.to_string()
            }
            Err(_) => "postgres".to_string(),
        };
        debug!(location = %location, table, "postgres store connected");

        Ok(Self {
            client: Mutex::new(client),
            table: table.to_string(),
            location,
            driver,
        })
    }
}

impl Drop for PostgresStore {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

#[async_trait]
impl MessageStore for PostgresStore {
    fn table(&self) -> &str {
        &self.table
    }

    fn describe(&self) -> String {
        self.location.clone()
    }

    async fn has_table(&self) -> Result<bool, StoreError> {
        let client = self.client.lock().await;
        let row = client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_name = $1)",
                &[&self.table],
            )
            .await?;
        Ok(row.get(0))
    }

    async fn create_table(&self) -> Result<(), StoreError> {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (
                id BIGSERIAL PRIMARY KEY,
                received TIMESTAMPTZ,
                message TEXT,
                command TEXT
            )",
            self.table
        );
        self.client.lock().await.batch_execute(&ddl).await?;
        Ok(())
    }

    async fn insert(&self, rows: &[BufferedMessage]) -> Result<usize, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let mut client = self.client.lock().await;
        let tx = client.transaction().await?;
        for chunk in rows.chunks(ROWS_PER_STATEMENT) {
            let sql = insert_statement(&self.table, chunk.len());
            let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(chunk.len() * 3);
            for row in chunk {
                params.push(&row.received_at);
                params.push(&row.payload);
                params.push(&row.command);
            }
            tx.execute(sql.as_str(), &params).await?;
        }
        tx.commit().await?;
        Ok(rows.len())
    }
}

/// `INSERT INTO "t" (received, message, command) VALUES ($1, $2, $3), ($4, $5, $6)...`
fn insert_statement(table: &str, rows: usize) -> String {
    let values = (0..rows)
        .map(|i| format!("(${}, ${}, ${})", i * 3 + 1, i * 3 + 2, i * 3 + 3))
        .collect::<Vec<_>>()
        .join(", ");
    format!("INSERT INTO \"{table}\" (received, message, command) VALUES {values}")
}
