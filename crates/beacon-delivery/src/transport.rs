//! Transport seam and HTTP implementation.

use crate::{DeliveryError, DeliveryResult};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Result of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The server accepted the record.
    Delivered,
    /// Transient failure (connectivity, timeout, 5xx). The record stays queued.
    Retryable(String),
    /// The server rejected this record for good (4xx). Retrying will not help.
    Terminal(String),
}

/// Performs the network call for a single record.
///
/// Implementations must not panic and must classify every failure; the
/// delivery handler adds its own timeout around each call.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn deliver(&self, endpoint: &str, payload: &str, write_key: &str) -> DeliveryOutcome;
}

/// Map an HTTP status to a delivery outcome.
///
/// 408 and 429 are treated as transient even though they are 4xx.
pub fn classify_status(status: StatusCode) -> DeliveryOutcome {
    if status.is_success() {
        DeliveryOutcome::Delivered
    } else if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::TOO_MANY_REQUESTS {
        DeliveryOutcome::Retryable(format!("HTTP {}", status))
    } else if status.is_client_error() {
        DeliveryOutcome::Terminal(format!("HTTP {}", status))
    } else {
        DeliveryOutcome::Retryable(format!("HTTP {}", status))
    }
}

/// POSTs each payload as JSON to `{base_url}/{endpoint}`.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: Url,
}

impl HttpTransport {
    /// Create a transport with the given per-request timeout.
    pub fn new(base_url: Url, timeout: Duration) -> DeliveryResult<Self> {
        if base_url.cannot_be_a_base() {
            return Err(DeliveryError::Config(format!(
                "API URL cannot be used as a base: {}",
                base_url
            )));
        }

        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    /// Full URL for an endpoint.
    pub fn endpoint_url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            endpoint.trim_matches('/')
        )
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn deliver(&self, endpoint: &str, payload: &str, write_key: &str) -> DeliveryOutcome {
        let url = self.endpoint_url(endpoint);

        debug!(url = %url, write_key = %write_key, bytes = payload.len(), "Sending record");

        let response = match self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .body(payload.to_string())
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return DeliveryOutcome::Retryable(e.to_string()),
        };

        let status = response.status();
        match classify_status(status) {
            DeliveryOutcome::Delivered => DeliveryOutcome::Delivered,
            DeliveryOutcome::Retryable(reason) => DeliveryOutcome::Retryable(reason),
            DeliveryOutcome::Terminal(reason) => {
                let body = response.text().await.unwrap_or_default();
                if body.is_empty() {
                    DeliveryOutcome::Terminal(reason)
                } else {
                    DeliveryOutcome::Terminal(format!("{}: {}", reason, body))
                }
            }
        }
    }
}
