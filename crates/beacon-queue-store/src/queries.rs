//! Query helpers for the `api_queue` table.
//!
//! These run on the executor thread and take a plain `&Connection`.

use crate::QueueStoreResult;
use beacon_types::{EventRecord, QueuedRecord};
use rusqlite::{params, Connection};

/// Append a record and return it with its new id.
pub fn insert_record(conn: &Connection, record: &EventRecord) -> QueueStoreResult<QueuedRecord> {
    conn.execute(
        "INSERT INTO api_queue (endpoint, payload, write_key) VALUES (?1, ?2, ?3)",
        params![record.endpoint(), record.payload(), record.write_key()],
    )?;
    let id = conn.last_insert_rowid();
    Ok(QueuedRecord::new(id, record.clone()))
}

/// Oldest `limit` records for a write key, in enqueue order.
pub fn peek_records(
    conn: &Connection,
    write_key: &str,
    limit: usize,
) -> QueueStoreResult<Vec<QueuedRecord>> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let mut stmt = conn.prepare_cached(
        "SELECT id, endpoint, payload, write_key
         FROM api_queue WHERE write_key = ?1 ORDER BY id ASC LIMIT ?2",
    )?;

    let rows = stmt
        .query_map(params![write_key, limit], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(id, endpoint, payload, write_key)| -> QueueStoreResult<QueuedRecord> {
            Ok(QueuedRecord::new(
                id,
                EventRecord::new(endpoint, payload, write_key)?,
            ))
        })
        .collect()
}

/// Delete a record by id. Returns false if it was already gone.
pub fn delete_record(conn: &Connection, id: i64) -> QueueStoreResult<bool> {
    let count = conn.execute("DELETE FROM api_queue WHERE id = ?1", params![id])?;
    Ok(count > 0)
}

/// Delete every queued record. Returns the number of rows removed.
pub fn truncate_queue(conn: &Connection) -> QueueStoreResult<usize> {
    let count = conn.execute("DELETE FROM api_queue", [])?;
    Ok(count)
}

/// Number of records waiting for a write key.
pub fn count_pending(conn: &Connection, write_key: &str) -> QueueStoreResult<usize> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM api_queue WHERE write_key = ?1",
        params![write_key],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

/// Distinct write keys that still have queued records.
pub fn list_pending_write_keys(conn: &Connection) -> QueueStoreResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT write_key FROM api_queue GROUP BY write_key ORDER BY MIN(id) ASC",
    )?;
    let keys = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(keys)
}
