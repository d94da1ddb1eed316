//! Capped exponential backoff for scheduled delivery passes.

use crate::DeliveryConfig;
use std::time::Duration;
use tokio::time::Instant;

/// Backoff after `failures` consecutive failed passes.
///
/// `base * 2^(failures - 1)`, capped at `backoff_max`. Zero failures means no wait.
///
/// | Failures | Delay (base 60s, max 900s) |
/// |----------|----------------------------|
/// | 0        | 0s                         |
/// | 1        | 60s                        |
/// | 2        | 120s                       |
/// | 3        | 240s                       |
/// | 4        | 480s                       |
/// | 5+       | 900s (capped)              |
pub fn compute_backoff(failures: u32, config: &DeliveryConfig) -> Duration {
    if failures == 0 {
        return Duration::ZERO;
    }

    let base_ms = u64::try_from(config.backoff_base.as_millis()).unwrap_or(u64::MAX);
    let max_ms = u64::try_from(config.backoff_max.as_millis()).unwrap_or(u64::MAX);
    let multiplier = 1u64.checked_shl(failures - 1).unwrap_or(u64::MAX);
    let delay_ms = base_ms.saturating_mul(multiplier).min(max_ms);

    Duration::from_millis(delay_ms)
}

/// Whether a handler should run on this tick.
pub(crate) fn is_due(
    last_attempt: Option<Instant>,
    failures: u32,
    now: Instant,
    config: &DeliveryConfig,
) -> bool {
    let Some(last_attempt) = last_attempt else {
        return true;
    };

    match last_attempt.checked_add(compute_backoff(failures, config)) {
        Some(due_at) => now >= due_at,
        None => false,
    }
}
