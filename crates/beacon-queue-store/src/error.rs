//! Queue store error types.

use thiserror::Error;

/// Queue store error type.
#[derive(Error, Debug)]
pub enum QueueStoreError {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Executor connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(String),

    /// A stored row could not be turned back into a record
    #[error("Invalid record: {0}")]
    InvalidRecord(#[from] beacon_types::RecordError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using QueueStoreError.
pub type QueueStoreResult<T> = Result<T, QueueStoreError>;
