//! Write key → handler registry and the periodic scheduler.

use crate::{
    DeliveryConfig, DeliveryError, DeliveryHandler, DeliveryResult, QueueStatus, Transport,
};
use beacon_queue_store::QueueStore;
use beacon_types::{EventRecord, QueuedRecord};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

struct Scheduler {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Owns one [`DeliveryHandler`] per write key plus the scheduler that drives them.
///
/// Handlers are created lazily on first use and live as long as the registry.
pub struct DeliveryRegistry {
    store: QueueStore,
    transport: Arc<dyn Transport>,
    config: DeliveryConfig,
    handlers: RwLock<HashMap<String, Arc<DeliveryHandler>>>,
    scheduler: Mutex<Option<Scheduler>>,
}

impl DeliveryRegistry {
    pub fn new(store: QueueStore, transport: Arc<dyn Transport>, config: DeliveryConfig) -> Self {
        Self {
            store,
            transport,
            config,
            handlers: RwLock::new(HashMap::new()),
            scheduler: Mutex::new(None),
        }
    }

    /// Get or create the handler for a write key.
    pub async fn handler(&self, write_key: &str) -> DeliveryResult<Arc<DeliveryHandler>> {
        if write_key.trim().is_empty() {
            return Err(DeliveryError::EmptyWriteKey);
        }

        {
            let handlers = self.handlers.read().await;
            if let Some(handler) = handlers.get(write_key) {
                return Ok(handler.clone());
            }
        }

        let mut handlers = self.handlers.write().await;
        // Another task may have created it between the two locks.
        if let Some(handler) = handlers.get(write_key) {
            return Ok(handler.clone());
        }

        let handler = Arc::new(DeliveryHandler::new(
            write_key,
            self.store.clone(),
            self.transport.clone(),
            self.config.clone(),
        )?);
        handlers.insert(write_key.to_string(), handler.clone());

        info!(write_key = %write_key, "Created delivery handler");
        Ok(handler)
    }

    /// Route a record to its write key's handler.
    pub async fn enqueue(&self, record: EventRecord) -> DeliveryResult<QueuedRecord> {
        let handler = self.handler(record.write_key()).await?;
        handler.enqueue(record).await
    }

    /// Deliver everything pending for one write key now.
    pub async fn flush(&self, write_key: &str) -> bool {
        match self.handler(write_key).await {
            Ok(handler) => handler.flush().await,
            Err(e) => {
                warn!(write_key = %write_key, error = %e, "Cannot flush");
                false
            }
        }
    }

    /// Flush every registered handler. True only if all of them succeeded.
    pub async fn flush_all(&self) -> bool {
        let mut all_ok = true;
        for handler in self.snapshot().await {
            if !handler.flush().await {
                all_ok = false;
            }
        }
        all_ok
    }

    /// Register handlers for write keys that still have rows from an earlier run.
    ///
    /// Returns the number of write keys found.
    pub async fn recover(&self) -> DeliveryResult<usize> {
        let write_keys = self.store.write_keys_with_pending().await?;
        for write_key in &write_keys {
            self.handler(write_key).await?;
        }

        if !write_keys.is_empty() {
            info!(count = write_keys.len(), "Recovered write keys with pending records");
        }
        Ok(write_keys.len())
    }

    /// One scheduler tick: run every handler that is not backing off.
    ///
    /// Returns the number of handlers that ran.
    pub async fn run_scheduled_pass(&self) -> usize {
        let mut ran = 0;
        for handler in self.snapshot().await {
            if handler.run_scheduled().await.is_some() {
                ran += 1;
            }
        }
        ran
    }

    /// Spawn the scheduler task. Returns false if it is already running.
    ///
    /// The task holds only a weak reference, so dropping the registry also stops it.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut scheduler = self.scheduler.lock().unwrap_or_else(|e| e.into_inner());
        if scheduler.is_some() {
            return false;
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let registry = Arc::downgrade(self);
        let period = self.config.flush_interval;

        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {}
                }

                let Some(registry) = registry.upgrade() else {
                    break;
                };

                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    ran = registry.run_scheduled_pass() => {
                        debug!(handlers = ran, "Scheduled delivery pass finished");
                    }
                }
            }

            debug!("Delivery scheduler stopped");
        });

        info!(interval_secs = period.as_secs_f64(), "Delivery scheduler started");
        *scheduler = Some(Scheduler { shutdown_tx, task });
        true
    }

    /// Stop the scheduler and wait for its task to exit.
    pub async fn shutdown(&self) {
        let scheduler = self
            .scheduler
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        let Some(Scheduler { shutdown_tx, task }) = scheduler else {
            return;
        };

        let _ = shutdown_tx.send(true);
        if let Err(e) = task.await {
            warn!(error = %e, "Delivery scheduler task failed");
        }
        info!("Delivery scheduler shut down");
    }

    pub fn is_running(&self) -> bool {
        self.scheduler
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Status of every registered handler, sorted by write key.
    pub async fn status(&self) -> DeliveryResult<Vec<QueueStatus>> {
        let mut statuses = Vec::new();
        for handler in self.snapshot().await {
            statuses.push(handler.status().await?);
        }
        statuses.sort_by(|a, b| a.write_key.cmp(&b.write_key));
        Ok(statuses)
    }

    pub async fn handler_count(&self) -> usize {
        self.handlers.read().await.len()
    }

    pub fn store(&self) -> &QueueStore {
        &self.store
    }

    async fn snapshot(&self) -> Vec<Arc<DeliveryHandler>> {
        self.handlers.read().await.values().cloned().collect()
    }
}
