//! Record error types.

use thiserror::Error;

/// Record construction error type.
#[derive(Error, Debug)]
pub enum RecordError {
    /// Endpoint name was empty
    #[error("Endpoint must not be empty")]
    EmptyEndpoint,

    /// Write key was empty
    #[error("Write key must not be empty")]
    EmptyWriteKey,

    /// Actor was empty
    #[error("Actor must not be empty")]
    EmptyActor,

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using RecordError.
pub type RecordResult<T> = Result<T, RecordError>;
