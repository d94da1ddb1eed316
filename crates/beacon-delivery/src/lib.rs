//! Batched, retrying delivery of queued event records.
//!
//! This crate provides:
//! - DeliveryHandler: per-write-key enqueue and single-flight delivery procedure
//! - DeliveryRegistry: write key → handler map plus the periodic scheduler
//! - Transport: the seam to the network, with an HTTP implementation
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐ enqueue ┌─────────────────┐  add/peek/delete  ┌────────────┐
//! │ Producers │────────▶│ DeliveryHandler │◀─────────────────▶│ QueueStore │
//! └───────────┘         │ (per write key) │                   │  (SQLite)  │
//!                       └────────┬────────┘                   └────────────┘
//!        ┌───────────┐  tick     │ deliver
//!        │ Scheduler │───────────┤
//!        └───────────┘           ▼
//!                          ┌───────────┐
//!                          │ Transport │
//!                          └───────────┘
//! ```
//!
//! Records for one write key are delivered strictly in enqueue order. A retryable
//! failure stops the pass and leaves the record and everything behind it queued;
//! a terminal failure drops that record and moves on.

mod backoff;
mod config;
mod error;
mod handler;
mod registry;
#[cfg(test)]
mod testing;
mod transport;

pub use backoff::compute_backoff;
pub use config::DeliveryConfig;
pub use error::{DeliveryError, DeliveryResult};
pub use handler::{CycleReport, DeliveryHandler, QueueStatus};
pub use registry::DeliveryRegistry;
pub use transport::{classify_status, DeliveryOutcome, HttpTransport, Transport};
