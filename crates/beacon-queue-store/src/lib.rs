//! Durable SQLite queue for pending event records.
//!
//! This crate provides:
//! - QueueStore: async store backed by a dedicated SQLite executor thread
//! - Schema migrations for the `api_queue` table
//! - Synchronous query helpers used inside the executor
//!
//! # Architecture
//!
//! Every operation is sent to one background thread through `tokio-rusqlite`
//! and executed in FIFO order. That single thread is what serializes concurrent
//! `add`/`peek`/`delete` calls, so a record is visible to `peek` as soon as `add`
//! returns and gone as soon as `delete` returns.
//!
//! ```ignore
//! let store = QueueStore::open(&path).await?;
//! let queued = store.add(&record).await?;
//! let batch = store.peek("write-key", 50).await?;
//! store.delete(&queued).await?;
//! ```

mod error;
mod migrations;
pub mod queries;
mod store;

pub use error::{QueueStoreError, QueueStoreResult};
pub use migrations::{run_migrations, CURRENT_VERSION};
pub use store::QueueStore;
