//! Local store entries.

use kvsync_protocol::{Bucket, RemoteEntry};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One row of the local store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Globally unique key.
    pub key: String,
    /// Opaque JSON value.
    pub value: Value,
    /// Milliseconds since the Unix epoch, set by the writer.
    pub timestamp: i64,
    /// Transfer unit this key belongs to.
    #[serde(default)]
    pub bucket: Bucket,
}

impl Entry {
    /// Creates a new entry.
    pub fn new(key: impl Into<String>, value: Value, timestamp: i64, bucket: Bucket) -> Self {
        Self {
            key: key.into(),
            value,
            timestamp,
            bucket,
        }
    }

    /// Returns the `{value, timestamp}` pair sent to the remote store.
    #[must_use]
    pub fn to_remote(&self) -> RemoteEntry {
        RemoteEntry::new(self.value.clone(), self.timestamp)
    }
}
