//! Notification payloads.

use crate::error::{CodecError, CodecResult};
use crate::record::{EventRecord, RecordKind};
use serde::{Deserialize, Serialize};

/// An annotation the agent writes into the capture stream, e.g. to mark
/// where an alert fired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Short identifier.
    pub id: String,
    /// Human-readable description.
    pub description: String,
}

impl Notification {
    /// Creates a notification.
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
        }
    }

    /// Wraps the notification into a record.
    ///
    /// # Errors
    ///
    /// Returns an error if CBOR serialization fails.
    pub fn into_record(&self, ts: u64, tid: u64) -> CodecResult<EventRecord> {
        let mut payload = Vec::new();
        ciborium::into_writer(self, &mut payload)
            .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
        Ok(EventRecord {
            ts,
            tid,
            kind: RecordKind::Notification,
            payload,
        })
    }

    /// Extracts the notification from a record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is not a notification or its payload
    /// is malformed.
    pub fn from_record(record: &EventRecord) -> CodecResult<Self> {
        if !record.is_notification() {
            return Err(CodecError::decoding_failed("record is not a notification"));
        }
        ciborium::from_reader(record.payload.as_slice())
            .map_err(|e| CodecError::decoding_failed(e.to_string()))
    }
}
