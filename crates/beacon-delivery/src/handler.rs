//! Per-write-key delivery handler.

use crate::backoff::{compute_backoff, is_due};
use crate::{DeliveryConfig, DeliveryError, DeliveryOutcome, DeliveryResult, Transport};
use beacon_queue_store::QueueStore;
use beacon_types::{EventRecord, QueuedRecord};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// What one delivery pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Records accepted by the server and removed from the queue.
    pub delivered: usize,
    /// Records terminally rejected and removed from the queue.
    pub dropped: usize,
    /// Set when the pass stopped on a retryable failure.
    pub retryable_failure: Option<String>,
    /// True when a scheduled pass hit the batch cap with a full last batch.
    pub more_pending: bool,
}

impl CycleReport {
    /// True when nothing is left behind: no retryable failure and no batch cap hit.
    ///
    /// Terminally dropped records do not count as failures.
    pub fn is_success(&self) -> bool {
        self.retryable_failure.is_none() && !self.more_pending
    }

    /// Whether the pass counts against the backoff streak.
    ///
    /// Stopping at the batch cap is not a failure.
    fn is_failure(&self) -> bool {
        self.retryable_failure.is_some()
    }
}

/// Status of one write key's queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStatus {
    pub write_key: String,
    /// Records waiting in the store.
    pub pending: usize,
    /// Failed passes since the last successful one.
    pub consecutive_failures: u32,
}

#[derive(Debug, Default)]
struct RetryState {
    consecutive_failures: u32,
    last_attempt: Option<Instant>,
}

/// Owns delivery for a single write key.
///
/// `enqueue` only touches the store. Delivery passes, whether triggered by the
/// scheduler or by `flush`, run under one guard, so at most one pass per write
/// key is ever in progress.
pub struct DeliveryHandler {
    write_key: String,
    store: QueueStore,
    transport: Arc<dyn Transport>,
    config: DeliveryConfig,
    /// Held for the whole of a delivery pass.
    delivery_guard: tokio::sync::Mutex<()>,
    retry_state: Mutex<RetryState>,
}

impl DeliveryHandler {
    /// Create a handler for `write_key`.
    pub fn new(
        write_key: impl Into<String>,
        store: QueueStore,
        transport: Arc<dyn Transport>,
        config: DeliveryConfig,
    ) -> DeliveryResult<Self> {
        let write_key = write_key.into();
        if write_key.trim().is_empty() {
            return Err(DeliveryError::EmptyWriteKey);
        }

        Ok(Self {
            write_key,
            store,
            transport,
            config,
            delivery_guard: tokio::sync::Mutex::new(()),
            retry_state: Mutex::new(RetryState::default()),
        })
    }

    pub fn write_key(&self) -> &str {
        &self.write_key
    }

    /// Persist a record for later delivery and return immediately.
    ///
    /// Never waits on the network. A store failure means the record was not
    /// persisted; it is logged and returned, not retried.
    pub async fn enqueue(&self, record: EventRecord) -> DeliveryResult<QueuedRecord> {
        if record.write_key() != self.write_key {
            return Err(DeliveryError::WriteKeyMismatch {
                handler: self.write_key.clone(),
                record: record.write_key().to_string(),
            });
        }

        match self.store.add(&record).await {
            Ok(queued) => Ok(queued),
            Err(e) => {
                error!(
                    write_key = %self.write_key,
                    endpoint = %record.endpoint(),
                    error = %e,
                    "Failed to persist record, dropping it"
                );
                Err(e.into())
            }
        }
    }

    /// Deliver everything currently pending, waiting until the pass completes.
    ///
    /// Returns true only if the queue was drained: no record hit a retryable
    /// failure and the store did not fail. Ignores backoff and the batch cap.
    pub async fn flush(&self) -> bool {
        self.run_pass("flush", None).await
    }

    /// Run a pass of at most `max_batches_per_cycle` batches if backoff allows it.
    ///
    /// Returns None when the handler was skipped, otherwise whether the queue was
    /// drained.
    pub async fn run_scheduled(&self) -> Option<bool> {
        let (failures, last_attempt) = {
            let state = self.retry_state.lock().unwrap_or_else(|e| e.into_inner());
            (state.consecutive_failures, state.last_attempt)
        };

        if !is_due(last_attempt, failures, Instant::now(), &self.config) {
            debug!(
                write_key = %self.write_key,
                failures,
                backoff_secs = compute_backoff(failures, &self.config).as_secs(),
                "Skipping scheduled delivery (backing off)"
            );
            return None;
        }

        Some(
            self.run_pass("scheduled", Some(self.config.max_batches_per_cycle))
                .await,
        )
    }

    /// Pending count and failure streak for this write key.
    pub async fn status(&self) -> DeliveryResult<QueueStatus> {
        let pending = self.store.pending_count(&self.write_key).await?;
        Ok(QueueStatus {
            write_key: self.write_key.clone(),
            pending,
            consecutive_failures: self.consecutive_failures(),
        })
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.retry_state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .consecutive_failures
    }

    async fn run_pass(&self, trigger: &'static str, max_batches: Option<usize>) -> bool {
        let _guard = self.delivery_guard.lock().await;
        let started_at = Instant::now();

        let (drained, failed) = match self.deliver_pending(max_batches).await {
            Ok(report) => {
                if report.delivered > 0 || report.dropped > 0 || !report.is_success() {
                    info!(
                        write_key = %self.write_key,
                        trigger,
                        delivered = report.delivered,
                        dropped = report.dropped,
                        more_pending = report.more_pending,
                        retryable_failure = ?report.retryable_failure,
                        "Delivery pass finished"
                    );
                }
                (report.is_success(), report.is_failure())
            }
            Err(e) => {
                error!(write_key = %self.write_key, trigger, error = %e, "Delivery pass aborted");
                (false, true)
            }
        };

        self.record_attempt(started_at, failed);
        drained
    }

    /// Backoff is measured from the start of the pass.
    fn record_attempt(&self, started_at: Instant, failed: bool) {
        let mut state = self.retry_state.lock().unwrap_or_else(|e| e.into_inner());
        state.last_attempt = Some(started_at);
        if failed {
            state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        } else {
            state.consecutive_failures = 0;
        }
    }

    /// The delivery procedure. Callers must hold the delivery guard.
    ///
    /// `max_batches` of None keeps going until the queue is empty or a record fails.
    async fn deliver_pending(&self, max_batches: Option<usize>) -> DeliveryResult<CycleReport> {
        let mut report = CycleReport::default();
        let mut batches = 0;

        loop {
            if max_batches.is_some_and(|max| batches >= max) {
                break;
            }
            batches += 1;

            let batch = self
                .store
                .peek(&self.write_key, self.config.batch_size)
                .await?;
            if batch.is_empty() {
                return Ok(report);
            }
            let batch_full = batch.len() >= self.config.batch_size;

            for record in &batch {
                match self.attempt(record).await {
                    DeliveryOutcome::Delivered => {
                        self.store.delete(record).await?;
                        report.delivered += 1;
                    }
                    DeliveryOutcome::Terminal(reason) => {
                        warn!(
                            write_key = %self.write_key,
                            id = record.id(),
                            endpoint = %record.endpoint(),
                            reason = %reason,
                            "Record rejected by server, dropping it"
                        );
                        self.store.delete(record).await?;
                        report.dropped += 1;
                    }
                    DeliveryOutcome::Retryable(reason) => {
                        warn!(
                            write_key = %self.write_key,
                            id = record.id(),
                            endpoint = %record.endpoint(),
                            reason = %reason,
                            "Delivery failed, will retry"
                        );
                        report.retryable_failure = Some(reason);
                        return Ok(report);
                    }
                }
            }

            if !batch_full {
                return Ok(report);
            }
        }

        report.more_pending = true;
        debug!(
            write_key = %self.write_key,
            batches,
            "Batch cap reached, leaving the rest for the next pass"
        );
        Ok(report)
    }

    async fn attempt(&self, record: &QueuedRecord) -> DeliveryOutcome {
        let send = self
            .transport
            .deliver(record.endpoint(), record.payload(), record.write_key());

        match tokio::time::timeout(self.config.transport_timeout, send).await {
            Ok(outcome) => outcome,
            Err(_) => DeliveryOutcome::Retryable(format!(
                "timed out after {}ms",
                self.config.transport_timeout.as_millis()
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;
    use std::time::Duration;

    const KEY: &str = "key-1";

    fn record(payload: &str) -> EventRecord {
        EventRecord::new("track", payload, KEY).unwrap()
    }

    async fn setup(config: DeliveryConfig) -> (Arc<DeliveryHandler>, Arc<ScriptedTransport>, QueueStore) {
        let store = QueueStore::open_in_memory().await.unwrap();
        let transport = Arc::new(ScriptedTransport::new());
        let handler = DeliveryHandler::new(KEY, store.clone(), transport.clone(), config).unwrap();
        (Arc::new(handler), transport, store)
    }

    async fn pending_payloads(store: &QueueStore) -> Vec<String> {
        store
            .peek(KEY, 1000)
            .await
            .unwrap()
            .iter()
            .map(|r| r.payload().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_new_rejects_empty_write_key() {
        let store = QueueStore::open_in_memory().await.unwrap();
        let result = DeliveryHandler::new(
            "",
            store,
            Arc::new(ScriptedTransport::new()),
            DeliveryConfig::default(),
        );
        assert!(matches!(result, Err(DeliveryError::EmptyWriteKey)));
    }

    #[tokio::test]
    async fn test_enqueue_rejects_other_write_key() {
        let (handler, _, store) = setup(DeliveryConfig::default()).await;
        let other = EventRecord::new("track", "{}", "key-2").unwrap();

        let err = handler.enqueue(other).await.unwrap_err();
        assert!(matches!(err, DeliveryError::WriteKeyMismatch { .. }));
        assert!(store.peek("key-2", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_enqueue_does_not_deliver() {
        let (handler, transport, store) = setup(DeliveryConfig::default()).await;

        handler.enqueue(record("a")).await.unwrap();

        assert!(transport.calls().is_empty());
        assert_eq!(pending_payloads(&store).await, vec!["a"]);
    }

    #[tokio::test]
    async fn test_flush_empty_queue_succeeds() {
        let (handler, transport, _) = setup(DeliveryConfig::default()).await;
        assert!(handler.flush().await);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_flush_delivers_in_enqueue_order() {
        let (handler, transport, store) = setup(DeliveryConfig::default()).await;
        for payload in ["a", "b", "c", "d"] {
            handler.enqueue(record(payload)).await.unwrap();
        }

        assert!(handler.flush().await);
        assert_eq!(transport.sent_payloads(), vec!["a", "b", "c", "d"]);
        assert!(pending_payloads(&store).await.is_empty());

        let (endpoint, _, write_key) = &transport.calls()[0];
        assert_eq!(endpoint, "track");
        assert_eq!(write_key, KEY);
    }

    #[tokio::test]
    async fn test_retryable_failure_stops_pass_then_recovers() {
        let (handler, transport, store) = setup(DeliveryConfig::default()).await;
        for payload in ["A", "B", "C"] {
            handler.enqueue(record(payload)).await.unwrap();
        }
        transport.script("B", vec![DeliveryOutcome::Retryable("HTTP 503".to_string())]);

        assert!(!handler.flush().await);
        assert_eq!(transport.sent_payloads(), vec!["A", "B"]);
        assert_eq!(pending_payloads(&store).await, vec!["B", "C"]);
        assert_eq!(handler.consecutive_failures(), 1);

        assert!(handler.flush().await);
        assert_eq!(transport.sent_payloads(), vec!["A", "B", "B", "C"]);
        assert!(pending_payloads(&store).await.is_empty());
        assert_eq!(handler.consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn test_terminal_failure_drops_record_and_continues() {
        let (handler, transport, store) = setup(DeliveryConfig::default()).await;
        for payload in ["a", "bad", "c"] {
            handler.enqueue(record(payload)).await.unwrap();
        }
        transport.script("bad", vec![DeliveryOutcome::Terminal("HTTP 400".to_string())]);

        assert!(handler.flush().await);
        assert_eq!(transport.sent_payloads(), vec!["a", "bad", "c"]);
        assert!(pending_payloads(&store).await.is_empty());
    }

    #[tokio::test]
    async fn test_terminal_only_record_counts_as_success() {
        let (handler, transport, store) = setup(DeliveryConfig::default()).await;
        handler.enqueue(record("bad")).await.unwrap();
        transport.script("bad", vec![DeliveryOutcome::Terminal("HTTP 422".to_string())]);

        assert!(handler.flush().await);
        assert!(pending_payloads(&store).await.is_empty());
    }

    #[tokio::test]
    async fn test_flush_drains_multiple_batches() {
        let config = DeliveryConfig {
            batch_size: 2,
            ..DeliveryConfig::default()
        };
        let (handler, transport, store) = setup(config).await;
        for i in 0..5 {
            handler.enqueue(record(&format!("p{}", i))).await.unwrap();
        }

        assert!(handler.flush().await);
        assert_eq!(transport.sent_payloads(), vec!["p0", "p1", "p2", "p3", "p4"]);
        assert!(pending_payloads(&store).await.is_empty());
    }

    #[tokio::test]
    async fn test_scheduled_batch_cap_leaves_remainder_queued() {
        let config = DeliveryConfig {
            batch_size: 2,
            max_batches_per_cycle: 2,
            ..DeliveryConfig::default()
        };
        let (handler, transport, store) = setup(config).await;
        for i in 0..5 {
            handler.enqueue(record(&format!("p{}", i))).await.unwrap();
        }

        assert_eq!(handler.run_scheduled().await, Some(false));
        assert_eq!(transport.sent_payloads().len(), 4);
        assert_eq!(pending_payloads(&store).await, vec!["p4"]);

        // Hitting the cap is not a failure, so the next tick is not delayed.
        assert_eq!(handler.consecutive_failures(), 0);
        assert_eq!(handler.run_scheduled().await, Some(true));
        assert!(pending_payloads(&store).await.is_empty());
    }

    #[tokio::test]
    async fn test_flush_ignores_batch_cap() {
        let config = DeliveryConfig {
            batch_size: 1,
            max_batches_per_cycle: 1,
            ..DeliveryConfig::default()
        };
        let (handler, transport, store) = setup(config).await;
        for payload in ["a", "b", "c"] {
            handler.enqueue(record(payload)).await.unwrap();
        }

        assert!(handler.flush().await);
        assert_eq!(transport.sent_payloads(), vec!["a", "b", "c"]);
        assert!(pending_payloads(&store).await.is_empty());
    }

    #[tokio::test]
    async fn test_store_read_error_fails_flush() {
        let (handler, transport, store) = setup(DeliveryConfig::default()).await;
        // A row with an empty endpoint cannot be turned back into a record.
        store
            .call(|conn| {
                conn.execute(
                    "INSERT INTO api_queue (endpoint, payload, write_key) VALUES ('', 'x', ?1)",
                    [KEY],
                )?;
                Ok(())
            })
            .await
            .unwrap();

        assert!(!handler.flush().await);
        assert!(transport.calls().is_empty());
        assert_eq!(store.pending_count(KEY).await.unwrap(), 1);
        assert_eq!(handler.consecutive_failures(), 1);
    }

    #[tokio::test]
    async fn test_backoff_is_measured_from_pass_start() {
        let config = DeliveryConfig {
            backoff_base: Duration::from_millis(400),
            ..DeliveryConfig::default()
        };
        let (handler, transport, _) = setup(config).await;
        transport.set_delay(Duration::from_millis(300));
        handler.enqueue(record("a")).await.unwrap();
        transport.script("a", vec![DeliveryOutcome::Retryable("offline".to_string())]);

        assert_eq!(handler.run_scheduled().await, Some(false));

        // 300ms pass + 150ms wait is past the 400ms backoff counted from the start,
        // but well short of it counted from the end.
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(handler.run_scheduled().await, Some(true));
    }

    #[tokio::test]
    async fn test_transport_timeout_is_retryable() {
        let config = DeliveryConfig {
            transport_timeout: Duration::from_millis(50),
            ..DeliveryConfig::default()
        };
        let (handler, transport, store) = setup(config).await;
        transport.set_delay(Duration::from_secs(5));
        handler.enqueue(record("slow")).await.unwrap();

        assert!(!handler.flush().await);
        assert_eq!(pending_payloads(&store).await, vec!["slow"]);
    }

    #[tokio::test]
    async fn test_scheduled_run_backs_off_after_failure() {
        let (handler, transport, _) = setup(DeliveryConfig::default()).await;
        handler.enqueue(record("a")).await.unwrap();
        transport.script("a", vec![DeliveryOutcome::Retryable("offline".to_string())]);

        assert_eq!(handler.run_scheduled().await, Some(false));
        // Default backoff is 60s, so an immediate second tick is skipped.
        assert_eq!(handler.run_scheduled().await, None);
        assert_eq!(transport.calls().len(), 1);

        // Manual flush ignores backoff.
        assert!(handler.flush().await);
        assert_eq!(handler.run_scheduled().await, Some(true));
    }

    #[tokio::test]
    async fn test_concurrent_passes_never_overlap() {
        let (handler, transport, store) = setup(DeliveryConfig::default()).await;
        transport.set_delay(Duration::from_millis(20));
        for payload in ["a", "b", "c"] {
            handler.enqueue(record(payload)).await.unwrap();
        }

        let h1 = handler.clone();
        let h2 = handler.clone();
        let h3 = handler.clone();
        let (r1, r2, r3) = tokio::join!(
            tokio::spawn(async move { h1.flush().await }),
            tokio::spawn(async move { h2.flush().await }),
            tokio::spawn(async move { h3.run_scheduled().await }),
        );

        assert!(r1.unwrap());
        assert!(r2.unwrap());
        assert_ne!(r3.unwrap(), Some(false));
        assert_eq!(transport.max_in_flight(), 1);
        assert_eq!(transport.sent_payloads(), vec!["a", "b", "c"]);
        assert!(pending_payloads(&store).await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_enqueues_lose_nothing() {
        let (handler, _, store) = setup(DeliveryConfig::default()).await;
        handler.enqueue(record("existing")).await.unwrap();

        let mut tasks = vec![];
        for i in 0..20 {
            let handler = handler.clone();
            tasks.push(tokio::spawn(async move {
                handler.enqueue(record(&format!("p{}", i))).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(store.pending_count(KEY).await.unwrap(), 21);
        let status = handler.status().await.unwrap();
        assert_eq!(status.pending, 21);
        assert_eq!(status.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_other_write_keys_are_untouched() {
        let (handler, transport, store) = setup(DeliveryConfig::default()).await;
        store
            .add(&EventRecord::new("track", "other", "key-2").unwrap())
            .await
            .unwrap();
        handler.enqueue(record("mine")).await.unwrap();

        assert!(handler.flush().await);
        assert_eq!(transport.sent_payloads(), vec!["mine"]);
        assert_eq!(store.pending_count("key-2").await.unwrap(), 1);
    }

    #[test]
    fn test_cycle_report_success() {
        let mut report = CycleReport {
            dropped: 1,
            ..CycleReport::default()
        };
        assert!(report.is_success());

        report.retryable_failure = Some("offline".to_string());
        assert!(!report.is_success());
        assert!(report.is_failure());

        let capped = CycleReport {
            delivered: 4,
            more_pending: true,
            ..CycleReport::default()
        };
        assert!(!capped.is_success());
        assert!(!capped.is_failure());
    }
}
