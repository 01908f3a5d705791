//! In-memory store for testing.

use crate::clock;
use crate::entry::Entry;
use crate::error::StorageResult;
use crate::store::LocalStore;
use kvsync_protocol::Bucket;
use serde_json::Value;
use std::collections::HashMap;

/// An in-memory local store.
///
/// This store keeps all entries in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Sessions that don't need local persistence
///
/// # Example
///
/// ```rust
/// use kvsync_storage::{InMemoryStore, LocalStore};
/// use kvsync_protocol::Bucket;
/// use serde_json::json;
///
/// let mut store = InMemoryStore::new();
/// store.put("a", json!(1), Bucket::global(), Some(100)).unwrap();
/// assert_eq!(store.get("a").unwrap().unwrap().timestamp, 100);
/// ```
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    entries: HashMap<String, Entry>,
}

impl InMemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with pre-existing entries.
    ///
    /// Useful for setting up reconciliation scenarios.
    #[must_use]
    pub fn with_entries(entries: impl IntoIterator<Item = Entry>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|entry| (entry.key.clone(), entry))
                .collect(),
        }
    }
}

impl LocalStore for InMemoryStore {
    fn put(
        &mut self,
        key: &str,
        value: Value,
        bucket: Bucket,
        timestamp: Option<i64>,
    ) -> StorageResult<Entry> {
        let timestamp = timestamp.unwrap_or_else(clock::next_timestamp);
        let entry = Entry::new(key, value, timestamp, bucket);
        self.entries.insert(key.to_owned(), entry.clone());
        Ok(entry)
    }

    fn get(&self, key: &str) -> StorageResult<Option<Entry>> {
        Ok(self.entries.get(key).cloned())
    }

    fn remove(&mut self, key: &str) -> StorageResult<Option<Entry>> {
        Ok(self.entries.remove(key))
    }

    fn all_entries(&self) -> StorageResult<Vec<Entry>> {
        Ok(self.entries.values().cloned().collect())
    }

    fn clear(&mut self) -> StorageResult<()> {
        self.entries.clear();
        Ok(())
    }

    fn len(&self) -> StorageResult<usize> {
        Ok(self.entries.len())
    }
}
