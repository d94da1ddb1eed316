//! Event and queued record types.

use crate::{RecordError, RecordResult};

/// One unit of work to deliver: which endpoint to call, the serialized payload,
/// and the write key that scopes it to a tenant.
///
/// Fields are private so a record cannot change once it has been validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    endpoint: String,
    payload: String,
    write_key: String,
}

impl EventRecord {
    /// Create a new record.
    ///
    /// The payload is taken as-is; it must already be in its wire form.
    pub fn new(
        endpoint: impl Into<String>,
        payload: impl Into<String>,
        write_key: impl Into<String>,
    ) -> RecordResult<Self> {
        let endpoint = endpoint.into();
        let write_key = write_key.into();

        if endpoint.trim().is_empty() {
            return Err(RecordError::EmptyEndpoint);
        }
        if write_key.trim().is_empty() {
            return Err(RecordError::EmptyWriteKey);
        }

        Ok(Self {
            endpoint,
            payload: payload.into(),
            write_key,
        })
    }

    /// Name of the remote operation (e.g. "track").
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Serialized payload, opaque to the queue.
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Tenant write key.
    pub fn write_key(&self) -> &str {
        &self.write_key
    }
}

/// An EventRecord that has been persisted and given a store id.
///
/// Ids are strictly increasing in enqueue order, so comparing ids of two records
/// with the same write key tells which was enqueued first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedRecord {
    id: i64,
    record: EventRecord,
}

impl QueuedRecord {
    /// Wrap a record with its store id.
    pub fn new(id: i64, record: EventRecord) -> Self {
        Self { id, record }
    }

    /// Store-assigned id.
    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn endpoint(&self) -> &str {
        self.record.endpoint()
    }

    pub fn payload(&self) -> &str {
        self.record.payload()
    }

    pub fn write_key(&self) -> &str {
        self.record.write_key()
    }

    /// Borrow the underlying event record.
    pub fn record(&self) -> &EventRecord {
        &self.record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_record_new() {
        let record = EventRecord::new("track", r#"{"a":1}"#, "key-1").unwrap();
        assert_eq!(record.endpoint(), "track");
        assert_eq!(record.payload(), r#"{"a":1}"#);
        assert_eq!(record.write_key(), "key-1");
    }

    #[test]
    fn test_event_record_rejects_empty_endpoint() {
        let err = EventRecord::new("  ", "{}", "key-1").unwrap_err();
        assert!(matches!(err, RecordError::EmptyEndpoint));
    }

    #[test]
    fn test_event_record_rejects_empty_write_key() {
        let err = EventRecord::new("track", "{}", "").unwrap_err();
        assert!(matches!(err, RecordError::EmptyWriteKey));
    }

    #[test]
    fn test_event_record_allows_empty_payload() {
        let record = EventRecord::new("track", "", "key-1").unwrap();
        assert!(record.payload().is_empty());
    }

    #[test]
    fn test_queued_record_accessors() {
        let record = EventRecord::new("transfer", "{}", "key-2").unwrap();
        let queued = QueuedRecord::new(7, record.clone());

        assert_eq!(queued.id(), 7);
        assert_eq!(queued.endpoint(), "transfer");
        assert_eq!(queued.payload(), "{}");
        assert_eq!(queued.write_key(), "key-2");
        assert_eq!(queued.record(), &record);
    }
}
