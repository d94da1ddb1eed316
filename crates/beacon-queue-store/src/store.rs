//! Async queue store using a dedicated SQLite executor thread.
//!
//! - All SQLite work runs on one background thread, in FIFO order
//! - Callers await results without blocking the Tokio runtime
//! - Only SQL runs inside `call()`; no network or heavy work

use crate::{migrations, queries, QueueStoreError, QueueStoreResult};
use beacon_types::{EventRecord, QueuedRecord};
use std::path::Path;
use tokio_rusqlite::Connection;
use tracing::{debug, info, warn};

/// Convert a tokio_rusqlite::Error to QueueStoreError.
fn from_tokio_rusqlite(e: tokio_rusqlite::Error) -> QueueStoreError {
    match e {
        tokio_rusqlite::Error::Rusqlite(e) => QueueStoreError::Sqlite(e),
        tokio_rusqlite::Error::ConnectionClosed => {
            QueueStoreError::Connection("Connection closed".to_string())
        }
        other => QueueStoreError::Connection(other.to_string()),
    }
}

/// Durable, ordered queue of event records partitioned by write key.
///
/// Cloning is cheap; clones share the same executor thread.
#[derive(Clone)]
pub struct QueueStore {
    conn: Connection,
    path: String,
}

impl QueueStore {
    /// Open the queue database at the given path.
    ///
    /// Creates the file and parent directory if needed, enables WAL with full
    /// fsync on commit, and runs pending migrations.
    pub async fn open(path: &Path) -> QueueStoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let path_str = path.to_string_lossy().to_string();
        info!(path = %path_str, "Opening queue store");

        let conn = Connection::open(path)
            .await
            .map_err(|e| QueueStoreError::Connection(e.to_string()))?;

        let store = Self {
            conn,
            path: path_str,
        };

        store
            .call_sqlite(|conn| {
                conn.execute_batch(
                    "
                    PRAGMA journal_mode = WAL;
                    PRAGMA synchronous = FULL;
                    PRAGMA temp_store = MEMORY;
                    PRAGMA busy_timeout = 5000;
                    ",
                )
            })
            .await?;
        store.migrate().await?;

        info!(path = %store.path, "Queue store initialized");
        Ok(store)
    }

    /// Open an in-memory store for testing.
    pub async fn open_in_memory() -> QueueStoreResult<Self> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| QueueStoreError::Connection(e.to_string()))?;

        let store = Self {
            conn,
            path: ":memory:".to_string(),
        };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> QueueStoreResult<()> {
        self.call(|conn| migrations::run_migrations(conn))
            .await
            .map_err(|e| match e {
                QueueStoreError::Sqlite(e) => QueueStoreError::Migration(e.to_string()),
                other => other,
            })
    }

    /// Execute a closure on the executor thread.
    pub async fn call<F, T>(&self, f: F) -> QueueStoreResult<T>
    where
        F: FnOnce(&rusqlite::Connection) -> QueueStoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        // The inner QueueStoreResult rides inside tokio_rusqlite's Ok variant.
        let outer_result = self.conn.call(move |conn| Ok(f(conn))).await;

        match outer_result {
            Ok(inner) => inner,
            Err(e) => Err(from_tokio_rusqlite(e)),
        }
    }

    /// Execute a closure that only produces rusqlite errors.
    pub async fn call_sqlite<F, T>(&self, f: F) -> QueueStoreResult<T>
    where
        F: FnOnce(&rusqlite::Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.conn
            .call(move |conn| Ok(f(conn)?))
            .await
            .map_err(from_tokio_rusqlite)
    }

    /// Append a record and return it with its store id.
    ///
    /// A failure here means the record was not persisted.
    pub async fn add(&self, record: &EventRecord) -> QueueStoreResult<QueuedRecord> {
        let record = record.clone();
        let queued = self
            .call(move |conn| queries::insert_record(conn, &record))
            .await?;

        debug!(
            id = queued.id(),
            write_key = %queued.write_key(),
            endpoint = %queued.endpoint(),
            "Queued record"
        );
        Ok(queued)
    }

    /// Oldest `limit` records for `write_key`, in enqueue order. Nothing is removed.
    pub async fn peek(&self, write_key: &str, limit: usize) -> QueueStoreResult<Vec<QueuedRecord>> {
        let write_key = write_key.to_string();
        self.call(move |conn| queries::peek_records(conn, &write_key, limit))
            .await
    }

    /// Remove the record with this id. Returns false if it no longer exists.
    pub async fn delete(&self, record: &QueuedRecord) -> QueueStoreResult<bool> {
        let id = record.id();
        let deleted = self.call(move |conn| queries::delete_record(conn, id)).await?;

        if !deleted {
            debug!(id, "Record already removed from queue");
        }
        Ok(deleted)
    }

    /// Remove every record for every write key. Returns true if anything was removed.
    pub async fn truncate(&self) -> QueueStoreResult<bool> {
        let removed = self.call(queries::truncate_queue).await?;
        warn!(removed, "Queue truncated");
        Ok(removed > 0)
    }

    /// Number of records waiting for a write key.
    pub async fn pending_count(&self, write_key: &str) -> QueueStoreResult<usize> {
        let write_key = write_key.to_string();
        self.call(move |conn| queries::count_pending(conn, &write_key))
            .await
    }

    /// Write keys that still have records queued, oldest first.
    pub async fn write_keys_with_pending(&self) -> QueueStoreResult<Vec<String>> {
        self.call(queries::list_pending_write_keys).await
    }

    /// Get the database file path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Check the store is usable by running a trivial query.
    pub async fn health_check(&self) -> QueueStoreResult<()> {
        self.call_sqlite(|conn| conn.execute_batch("SELECT 1"))
            .await?;
        debug!("Queue store health check passed");
        Ok(())
    }

    /// Close the store once pending operations have finished.
    pub async fn close(self) -> QueueStoreResult<()> {
        self.conn
            .close()
            .await
            .map_err(|e| QueueStoreError::Connection(format!("Failed to close queue store: {:?}", e)))?;
        info!(path = %self.path, "Queue store closed");
        Ok(())
    }
}
