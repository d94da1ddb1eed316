//! Delivery tuning.

use beacon_config_and_utils::Config;
use std::time::Duration;

/// Batching, timeout and backoff settings for delivery handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryConfig {
    /// Time between scheduled delivery passes.
    pub flush_interval: Duration,
    /// Records peeked per batch.
    pub batch_size: usize,
    /// Upper bound on batches drained in one scheduled pass. `flush` is not capped.
    pub max_batches_per_cycle: usize,
    /// Bound on a single transport call. Elapsed calls count as retryable.
    pub transport_timeout: Duration,
    /// First backoff step after a failed pass. Zero disables backoff.
    pub backoff_base: Duration,
    /// Backoff cap.
    pub backoff_max: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_secs(60),
            batch_size: 100,
            max_batches_per_cycle: 100,
            transport_timeout: Duration::from_secs(30),
            backoff_base: Duration::from_secs(60),
            backoff_max: Duration::from_secs(900),
        }
    }
}

impl From<&Config> for DeliveryConfig {
    fn from(config: &Config) -> Self {
        Self {
            flush_interval: config.flush_interval(),
            batch_size: config.batch_size,
            max_batches_per_cycle: config.max_batches_per_cycle,
            transport_timeout: config.transport_timeout(),
            backoff_base: config.backoff_base(),
            backoff_max: config.backoff_max(),
        }
    }
}
