//! Call kinds emitted by producers.

use crate::{reserved, EventRecord, RecordError, RecordResult};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

/// Endpoint used for actions.
pub const TRACK_ENDPOINT: &str = "track";

/// Endpoint used for identity transfers.
pub const TRANSFER_ENDPOINT: &str = "transfer";

/// A call to the analytics API, before it has been queued.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    /// An action performed by an actor.
    Action {
        actor: String,
        action: String,
        properties: Map<String, Value>,
        /// When the action happened. Set it when the call may be sent much later.
        timestamp: Option<DateTime<Utc>>,
        write_key: String,
    },
    /// Moves everything known about `old_actor` onto `new_actor`.
    Transfer {
        old_actor: String,
        new_actor: String,
        write_key: String,
    },
}

#[derive(Serialize)]
struct ActionPayload<'a> {
    actor: &'a str,
    action_name: &'a str,
    write_key: &'a str,
    properties: &'a Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
}

#[derive(Serialize)]
struct TransferPayload<'a> {
    old_actor: &'a str,
    new_actor: &'a str,
    write_key: &'a str,
}

impl ApiCall {
    /// Build an action call.
    pub fn action(
        actor: impl Into<String>,
        action: impl Into<String>,
        properties: Map<String, Value>,
        write_key: impl Into<String>,
    ) -> Self {
        Self::Action {
            actor: actor.into(),
            action: action.into(),
            properties,
            timestamp: None,
            write_key: write_key.into(),
        }
    }

    /// Build an action call carrying revenue.
    ///
    /// `value` may be negative for refunds.
    pub fn sale(
        actor: impl Into<String>,
        action: impl Into<String>,
        mut properties: Map<String, Value>,
        currency: impl Into<String>,
        value: f64,
        write_key: impl Into<String>,
    ) -> Self {
        properties.insert(reserved::SALE_CURRENCY.to_string(), Value::String(currency.into()));
        properties.insert(reserved::SALE_VALUE.to_string(), Value::from(value));
        Self::action(actor, action, properties, write_key)
    }

    /// Build a transfer call.
    pub fn transfer(
        old_actor: impl Into<String>,
        new_actor: impl Into<String>,
        write_key: impl Into<String>,
    ) -> Self {
        Self::Transfer {
            old_actor: old_actor.into(),
            new_actor: new_actor.into(),
            write_key: write_key.into(),
        }
    }

    /// Attach a timestamp to an action. Transfers are returned unchanged.
    pub fn with_timestamp(self, at: DateTime<Utc>) -> Self {
        match self {
            Self::Action {
                actor,
                action,
                properties,
                write_key,
                ..
            } => Self::Action {
                actor,
                action,
                properties,
                timestamp: Some(at),
                write_key,
            },
            other => other,
        }
    }

    /// The endpoint this call goes to.
    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::Action { .. } => TRACK_ENDPOINT,
            Self::Transfer { .. } => TRANSFER_ENDPOINT,
        }
    }

    pub fn write_key(&self) -> &str {
        match self {
            Self::Action { write_key, .. } | Self::Transfer { write_key, .. } => write_key,
        }
    }

    /// Serialize the JSON payload for this call.
    pub fn payload(&self) -> RecordResult<String> {
        let json = match self {
            Self::Action {
                actor,
                action,
                properties,
                timestamp,
                write_key,
            } => {
                if actor.trim().is_empty() {
                    return Err(RecordError::EmptyActor);
                }
                serde_json::to_string(&ActionPayload {
                    actor,
                    action_name: action,
                    write_key,
                    properties,
                    timestamp: timestamp
                        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true)),
                })?
            }
            Self::Transfer {
                old_actor,
                new_actor,
                write_key,
            } => {
                if old_actor.trim().is_empty() || new_actor.trim().is_empty() {
                    return Err(RecordError::EmptyActor);
                }
                serde_json::to_string(&TransferPayload {
                    old_actor,
                    new_actor,
                    write_key,
                })?
            }
        };
        Ok(json)
    }

    /// Convert into a queueable record.
    pub fn into_record(self) -> RecordResult<EventRecord> {
        let payload = self.payload()?;
        EventRecord::new(self.endpoint(), payload, self.write_key())
    }
}
