//! Shared record types for the Beacon event pipeline.
//!
//! This crate provides:
//! - EventRecord: the immutable unit of work handed to the delivery queue
//! - QueuedRecord: an EventRecord plus the id assigned by the persistent store
//! - ApiCall: the call kinds producers emit (actions and identity transfers)
//! - Reserved action property names understood by the analytics API

mod api_call;
mod error;
mod record;
pub mod reserved;

pub use api_call::{ApiCall, TRACK_ENDPOINT, TRANSFER_ENDPOINT};
pub use error::{RecordError, RecordResult};
pub use record::{EventRecord, QueuedRecord};
