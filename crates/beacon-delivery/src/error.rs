//! Delivery error types.

use thiserror::Error;

/// Delivery error type.
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// Queue store error
    #[error("Queue store error: {0}")]
    Store(#[from] beacon_queue_store::QueueStoreError),

    /// Record was routed to a handler for a different write key
    #[error("Record write key {record} does not match handler write key {handler}")]
    WriteKeyMismatch {
        /// Write key owned by the handler.
        handler: String,
        /// Write key carried by the record.
        record: String,
    },

    /// Write key was empty
    #[error("Write key must not be empty")]
    EmptyWriteKey,

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias using DeliveryError.
pub type DeliveryResult<T> = Result<T, DeliveryError>;
