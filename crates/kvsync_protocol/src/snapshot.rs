//! Bucket snapshots.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::btree_map;
use std::collections::BTreeMap;

/// The remote representation of one entry: its value and write timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteEntry {
    /// Opaque JSON value.
    pub value: Value,
    /// Wall-clock milliseconds at write time.
    pub timestamp: i64,
}

impl RemoteEntry {
    /// Creates a new remote entry.
    pub fn new(value: Value, timestamp: i64) -> Self {
        Self { value, timestamp }
    }
}

/// The complete `key -> {value, timestamp}` content of one bucket.
///
/// Keys are kept ordered so that encoding the same snapshot twice yields
/// byte-identical bodies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BucketSnapshot(BTreeMap<String, RemoteEntry>);

impl BucketSnapshot {
    /// Creates an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an entry, returning the previous one for `key`.
    pub fn insert(&mut self, key: impl Into<String>, entry: RemoteEntry) -> Option<RemoteEntry> {
        self.0.insert(key.into(), entry)
    }

    /// Removes the entry for `key`.
    pub fn remove(&mut self, key: &str) -> Option<RemoteEntry> {
        self.0.remove(key)
    }

    /// Returns the entry for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&RemoteEntry> {
        self.0.get(key)
    }

    /// Returns true if the snapshot holds `key`.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the snapshot is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates entries in key order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, RemoteEntry> {
        self.0.iter()
    }

    /// Iterates keys in order.
    pub fn keys(&self) -> btree_map::Keys<'_, String, RemoteEntry> {
        self.0.keys()
    }

    /// Returns the `key -> value` pairs without timestamps.
    #[must_use]
    pub fn values(&self) -> BTreeMap<String, Value> {
        self.0
            .iter()
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect()
    }

    /// Consumes the snapshot, returning the underlying map.
    #[must_use]
    pub fn into_inner(self) -> BTreeMap<String, RemoteEntry> {
        self.0
    }
}

impl From<BTreeMap<String, RemoteEntry>> for BucketSnapshot {
    fn from(map: BTreeMap<String, RemoteEntry>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, RemoteEntry)> for BucketSnapshot {
    fn from_iter<I: IntoIterator<Item = (String, RemoteEntry)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for BucketSnapshot {
    type Item = (String, RemoteEntry);
    type IntoIter = btree_map::IntoIter<String, RemoteEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a BucketSnapshot {
    type Item = (&'a String, &'a RemoteEntry);
    type IntoIter = btree_map::Iter<'a, String, RemoteEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
