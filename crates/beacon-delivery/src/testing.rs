//! In-process transport fake for delivery tests.

use crate::{DeliveryOutcome, Transport};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// A transport whose outcomes are scripted per payload.
///
/// Payloads without a script are delivered. Every call is recorded.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    scripts: Mutex<HashMap<String, VecDeque<DeliveryOutcome>>>,
    calls: Mutex<Vec<(String, String, String)>>,
    delay: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue outcomes for a payload; they are consumed in order.
    pub(crate) fn script(&self, payload: &str, outcomes: Vec<DeliveryOutcome>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(payload.to_string())
            .or_default()
            .extend(outcomes);
    }

    /// Make every call sleep before answering.
    pub(crate) fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Payloads in the order they were sent.
    pub(crate) fn sent_payloads(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, payload, _)| payload.clone())
            .collect()
    }

    pub(crate) fn calls(&self) -> Vec<(String, String, String)> {
        self.calls.lock().unwrap().clone()
    }

    /// Highest number of calls that were ever running at once.
    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn deliver(&self, endpoint: &str, payload: &str, write_key: &str) -> DeliveryOutcome {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        self.calls.lock().unwrap().push((
            endpoint.to_string(),
            payload.to_string(),
            write_key.to_string(),
        ));

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let outcome = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(payload)
            .and_then(|queue| queue.pop_front())
            .unwrap_or(DeliveryOutcome::Delivered);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}
