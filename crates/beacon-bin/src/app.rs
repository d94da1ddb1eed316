//! Command implementations.

use anyhow::{bail, Context};
use beacon_config_and_utils::{Config, Paths};
use beacon_delivery::{DeliveryConfig, DeliveryRegistry, HttpTransport};
use beacon_queue_store::QueueStore;
use beacon_types::ApiCall;
use chrono::Utc;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{info, warn};

/// Opened store plus the registry built on it.
pub struct App {
    paths: Paths,
    registry: Arc<DeliveryRegistry>,
}

impl App {
    pub async fn open(paths: Paths, config: Config) -> anyhow::Result<Self> {
        paths.ensure_dirs()?;

        let db_path = paths.queue_database_file();
        let store = QueueStore::open(&db_path)
            .await
            .with_context(|| format!("opening queue at {}", db_path.display()))?;

        let transport = HttpTransport::new(config.api_url()?, config.transport_timeout())?;
        let registry = DeliveryRegistry::new(
            store,
            Arc::new(transport),
            DeliveryConfig::from(&config),
        );

        Ok(Self {
            paths,
            registry: Arc::new(registry),
        })
    }

    pub async fn track(
        &self,
        write_key: &str,
        actor: &str,
        action: &str,
        properties: Map<String, Value>,
        sale: Option<(String, f64)>,
    ) -> anyhow::Result<()> {
        let call = match sale {
            Some((currency, value)) => {
                ApiCall::sale(actor, action, properties, currency, value, write_key)
            }
            None => ApiCall::action(actor, action, properties, write_key),
        };
        self.enqueue(call.with_timestamp(Utc::now())).await
    }

    pub async fn transfer(
        &self,
        write_key: &str,
        old_actor: &str,
        new_actor: &str,
    ) -> anyhow::Result<()> {
        self.enqueue(ApiCall::transfer(old_actor, new_actor, write_key))
            .await
    }

    async fn enqueue(&self, call: ApiCall) -> anyhow::Result<()> {
        let queued = self.registry.enqueue(call.into_record()?).await?;
        println!("queued {} #{}", queued.endpoint(), queued.id());
        Ok(())
    }

    pub async fn flush(&self, write_key: &str) -> bool {
        let ok = self.registry.flush(write_key).await;
        if !ok {
            warn!(write_key = %write_key, "Flush left records queued");
        }
        ok
    }

    pub async fn print_status(&self) -> anyhow::Result<()> {
        self.registry.recover().await?;
        let statuses = self.registry.status().await?;

        if statuses.is_empty() {
            println!("queue empty");
        }
        for status in statuses {
            println!("{}\t{}", status.write_key, status.pending);
        }
        Ok(())
    }

    pub async fn truncate(&self) -> anyhow::Result<()> {
        let removed = self.registry.store().truncate().await?;
        println!("{}", if removed { "queue truncated" } else { "queue already empty" });
        Ok(())
    }

    /// Drain leftovers from earlier runs, then deliver on schedule until Ctrl-C.
    pub async fn run(&self) -> anyhow::Result<()> {
        let recovered = self.registry.recover().await?;
        info!(
            base_dir = %self.paths.base_dir().display(),
            write_keys = recovered,
            "Beacon running"
        );

        self.registry.start();

        tokio::signal::ctrl_c()
            .await
            .context("waiting for Ctrl-C")?;
        info!("Received shutdown signal");

        self.registry.shutdown().await;
        Ok(())
    }
}

/// Parse `key=value` pairs into a property map.
///
/// Values that parse as JSON (numbers, booleans, objects) keep their type;
/// anything else is stored as a string.
pub fn parse_properties(raw: &[String]) -> anyhow::Result<Map<String, Value>> {
    let mut properties = Map::new();
    for pair in raw {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("property must be KEY=VALUE, got {:?}", pair);
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("property key must not be empty: {:?}", pair);
        }
        let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
        properties.insert(key.to_string(), value);
    }
    Ok(properties)
}
