//! Queue schema migrations.
//!
//! Migrations are run in order and tracked in the `migrations` table.

use crate::QueueStoreResult;
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version.
pub const CURRENT_VERSION: i32 = 1;

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> QueueStoreResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current_version >= CURRENT_VERSION {
        debug!(current_version, "Queue schema up to date");
        return Ok(());
    }

    info!(current_version, target_version = CURRENT_VERSION, "Running queue migrations");

    if current_version < 1 {
        migrate_v1_api_queue(conn)?;
    }

    info!("Queue migrations complete");
    Ok(())
}

fn record_migration(conn: &Connection, version: i32, name: &str) -> QueueStoreResult<()> {
    conn.execute(
        "INSERT INTO migrations (version, name) VALUES (?1, ?2)",
        rusqlite::params![version, name],
    )?;
    debug!(version, name, "Migration applied");
    Ok(())
}

/// V1: pending API call queue.
///
/// AUTOINCREMENT keeps ids strictly increasing even after the newest row is
/// deleted, which is what FIFO order per write key relies on.
fn migrate_v1_api_queue(conn: &Connection) -> QueueStoreResult<()> {
    info!("Applying migration v1: api queue");

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS api_queue (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            endpoint TEXT NOT NULL,
            payload TEXT NOT NULL,
            write_key TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_api_queue_write_key_id
            ON api_queue(write_key, id);
        ",
    )?;

    record_migration(conn, 1, "api_queue")
}
