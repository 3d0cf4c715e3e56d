//! Ledger trait and SQLite implementation.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rusqlite::{Connection, OptionalExtension};

use super::error::StateError;
use super::schema;
use super::types::{channel_from_column, channel_to_column, ItemRecord};

/// How long a writer waits on a locked database before giving up. Concurrent
/// sync runs each hold their own connection and serialize here.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// Idempotency ledger operations.
///
/// Object-safe so the controller can hold an `Arc<dyn Ledger>`.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Create the schema if it does not exist yet. Idempotent.
    async fn ensure_schema(&self) -> Result<(), StateError>;

    /// Whether the item has a ledger record.
    async fn is_synced(&self, item_id: &str) -> Result<bool, StateError>;

    /// Record the item as synced.
    ///
    /// Upsert: an existing record gets the new channel id and timestamp.
    async fn mark_synced(&self, item_id: &str, channel_id: Option<&str>)
        -> Result<(), StateError>;

    /// Fetch the record for an item, if any.
    async fn get_record(&self, item_id: &str) -> Result<Option<ItemRecord>, StateError>;
}

/// SQLite implementation of the ledger.
pub struct SqliteLedger {
    /// Wrapped in Mutex because rusqlite::Connection is not Sync.
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl std::fmt::Debug for SqliteLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteLedger")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteLedger {
    /// Open or create a ledger at the given path and ensure its schema.
    pub async fn open(path: &Path) -> Result<Self, StateError> {
        let path = path.to_path_buf();
        let path_clone = path.clone();

        let conn = tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&path_clone).map_err(|e| StateError::Open {
                path: path_clone.clone(),
                source: e,
            })?;

            conn.busy_timeout(BUSY_TIMEOUT)
                .map_err(|source| StateError::Configure {
                    setting: "busy_timeout",
                    source,
                })?;

            // WAL lets readers of one sync run proceed while another writes.
            conn.pragma_update(None, "journal_mode", "WAL")
                .map_err(|source| StateError::Configure {
                    setting: "journal_mode",
                    source,
                })?;
            conn.pragma_update(None, "synchronous", "NORMAL")
                .map_err(|source| StateError::Configure {
                    setting: "synchronous",
                    source,
                })?;

            schema::migrate(&conn)?;

            Ok::<_, StateError>(conn)
        })
        .await??;

        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Open an in-memory ledger (for testing).
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StateError> {
        let conn = Connection::open_in_memory().map_err(|e| StateError::Open {
            path: PathBuf::from(":memory:"),
            source: e,
        })?;
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: PathBuf::from(":memory:"),
        })
    }

    /// Path to the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StateError> {
        self.conn.lock().map_err(|_| StateError::Poisoned)
    }
}

#[async_trait]
impl Ledger for SqliteLedger {
    async fn ensure_schema(&self) -> Result<(), StateError> {
        let conn = self.lock()?;
        schema::migrate(&conn)
    }

    async fn is_synced(&self, item_id: &str) -> Result<bool, StateError> {
        let conn = self.lock()?;

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(1) FROM synced_items WHERE item_id = ?1",
                [item_id],
                |row| row.get(0),
            )
            .map_err(StateError::query("check"))?;

        Ok(count > 0)
    }

    async fn mark_synced(
        &self,
        item_id: &str,
        channel_id: Option<&str>,
    ) -> Result<(), StateError> {
        let synced_at = Utc::now().timestamp();

        let conn = self.lock()?;

        conn.execute(
            r#"
            INSERT INTO synced_items (item_id, channel_id, synced_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(item_id) DO UPDATE SET
                channel_id = excluded.channel_id,
                synced_at = excluded.synced_at
            "#,
            rusqlite::params![item_id, channel_to_column(channel_id), synced_at],
        )
        .map_err(StateError::query("mark-synced"))?;

        Ok(())
    }

    async fn get_record(&self, item_id: &str) -> Result<Option<ItemRecord>, StateError> {
        let conn = self.lock()?;

        let row: Option<(String, String, i64)> = conn
            .query_row(
                "SELECT item_id, channel_id, synced_at FROM synced_items WHERE item_id = ?1",
                [item_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(StateError::query("record lookup"))?;

        Ok(row.map(|(item_id, channel, ts)| ItemRecord {
            item_id,
            channel_id: channel_from_column(channel),
            synced_at: Utc.timestamp_opt(ts, 0).single().unwrap_or_default(),
        }))
    }
}
