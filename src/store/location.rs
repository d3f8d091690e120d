//! Store URL parsing.
//!
//! ```text
//! sqlite:///var/lib/elk/db.sqlite        → SqliteStore("/var/lib/elk/db.sqlite")
//! sqlite://data/db.sqlite?table=events   → SqliteStore("data/db.sqlite"), table "events"
//! file:log.sqlite                        → SqliteStore("log.sqlite")
//! postgres://u:p@db/elk?table=events     → PostgresStore("postgres://u:p@db/elk"), table "events"
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use url::Url;

use crate::error::RecorderError;
use crate::store::{validate_table, MessageStore, SqliteStore};

/// Table used when the URL has no `table` parameter.
pub const DEFAULT_TABLE: &str = "elk_messages";
/// Database file used when no URL (or an empty SQLite URL) is given.
pub const DEFAULT_SQLITE_PATH: &str = "./mydb.sqlite";

/// Which backend serves the recorder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreTarget {
    /// Embedded SQLite database file.
    Sqlite {
        /// Database file path.
        path: PathBuf,
    },
    /// Network PostgreSQL server.
    Postgres {
        /// Connection URL with the `table` parameter removed.
        url: String,
    },
}

/// Parsed store URL: backend plus table name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreLocation {
    pub target: StoreTarget,
    pub table: String,
}

impl Default for StoreLocation {
    fn default() -> Self {
        Self {
            target: StoreTarget::Sqlite {
                path: PathBuf::from(DEFAULT_SQLITE_PATH),
            },
            table: DEFAULT_TABLE.to_string(),
        }
    }
}

impl StoreLocation {
    /// Parses an optional store URL; `None` selects the local SQLite default.
    ///
    /// # Example
    /// ```
    /// use elkvisor::store::{StoreLocation, StoreTarget};
    ///
    /// let loc = StoreLocation::from_url(Some("sqlite:///tmp/elk.db?table=panel")).unwrap();
    /// assert_eq!(loc.table, "panel");
    /// assert_eq!(loc.target, StoreTarget::Sqlite { path: "/tmp/elk.db".into() });
    /// ```
    pub fn from_url(raw: Option<&str>) -> Result<Self, RecorderError> {
        let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(Self::default());
        };
        let url = Url::parse(raw).map_err(|e| RecorderError::InvalidStoreUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        })?;

        let table = url
            .query_pairs()
            .find(|(k, _)| k == "table")
            .map(|(_, v)| v.into_owned())
            .unwrap_or_else(|| DEFAULT_TABLE.to_string());
        validate_table(&table)?;

        let target = match url.scheme() {
            "sqlite" | "sqlite3" | "file" => StoreTarget::Sqlite {
                path: sqlite_path(&url),
            },
            "postgres" | "postgresql" => StoreTarget::Postgres {
                url: without_table_param(url),
            },
            other => {
                return Err(RecorderError::UnsupportedScheme {
                    scheme: other.to_string(),
                })
            }
        };
        Ok(Self { target, table })
    }

    /// Location text for logs and events; passwords are masked.
    pub fn describe(&self) -> String {
        match &self.target {
            StoreTarget::Sqlite { path } => format!("sqlite:{}", path.display()),
            StoreTarget::Postgres { url } => match Url::parse(url) {
                Ok(mut u) => {
                    if u.password().is_some() {
                        let _ = u.set_password(Some("***"));
                    }
                    u.to_string()
                }
                Err(_) => "postgres:<unparseable>".to_string(),
            },
        }
    }

    /// Opens the backend this location points at.
    pub async fn open(&self) -> Result<Arc<dyn MessageStore>, RecorderError> {
        match &self.target {
            StoreTarget::Sqlite { path } => {
                let store = SqliteStore::open(path, &self.table).await?;
                Ok(Arc::new(store))
            }
            #[cfg(feature = "postgres")]
            StoreTarget::Postgres { url } => {
                let store = crate::store::PostgresStore::connect(url, &self.table).await?;
                Ok(Arc::new(store))
            }
            #[cfg(not(feature = "postgres"))]
            StoreTarget::Postgres { .. } => Err(RecorderError::UnsupportedScheme {
                scheme: "postgres".to_string(),
            }),
        }
    }
}

/// Host and path joined; `sqlite://data/x.db` is the relative file `data/x.db`.
fn sqlite_path(url: &Url) -> PathBuf {
    let host = url.host_str().unwrap_or_default();
    let path = url.path();
    match (host.is_empty(), path.is_empty() || path == "/") {
        (true, true) => PathBuf::from(DEFAULT_SQLITE_PATH),
        (true, false) => PathBuf::from(path),
        (false, true) => PathBuf::from(host),
        (false, false) => PathBuf::from(host).join(path.trim_start_matches('/')),
    }
}

fn without_table_param(mut url: Url) -> String {
    let rest: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "table")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if rest.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(rest);
    }
    url.to_string()
}
