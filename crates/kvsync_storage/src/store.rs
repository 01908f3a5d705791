//! Local store trait definition.

use crate::entry::Entry;
use crate::error::StorageResult;
use kvsync_protocol::{Bucket, BucketSnapshot};
use serde_json::Value;
use std::collections::BTreeSet;

/// A persistent keyed table of [`Entry`] rows.
///
/// Stores have no network awareness. The sync engine serializes all access
/// behind a single lock, so implementations need not be internally
/// synchronized.
///
/// # Invariants
///
/// - `put` overwrites both value and timestamp of an existing key
/// - a `put` without a timestamp stamps the entry with
///   [`crate::clock::next_timestamp`]
/// - `remove` of an absent key is a no-op
/// - when a mutating call returns `Ok`, the change is durable for that store
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - For testing
/// - [`super::FileStore`] - For persistent storage
pub trait LocalStore: Send {
    /// Inserts or overwrites the entry for `key`, returning what was written.
    ///
    /// # Errors
    ///
    /// Returns an error if the change cannot be persisted; the store is left
    /// as it was before the call.
    fn put(
        &mut self,
        key: &str,
        value: Value,
        bucket: Bucket,
        timestamp: Option<i64>,
    ) -> StorageResult<Entry>;

    /// Returns the entry for `key`.
    fn get(&self, key: &str) -> StorageResult<Option<Entry>>;

    /// Removes the entry for `key`, returning it if it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the change cannot be persisted.
    fn remove(&mut self, key: &str) -> StorageResult<Option<Entry>>;

    /// Returns a snapshot of every entry, in no particular order.
    fn all_entries(&self) -> StorageResult<Vec<Entry>>;

    /// Removes every entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the change cannot be persisted.
    fn clear(&mut self) -> StorageResult<()>;

    /// Returns every entry tagged with `bucket` in wire form.
    fn entries_for_bucket(&self, bucket: &Bucket) -> StorageResult<BucketSnapshot> {
        Ok(self
            .all_entries()?
            .into_iter()
            .filter(|entry| &entry.bucket == bucket)
            .map(|entry| {
                let remote = entry.to_remote();
                (entry.key, remote)
            })
            .collect())
    }

    /// Returns the distinct buckets holding at least one entry.
    fn buckets(&self) -> StorageResult<BTreeSet<Bucket>> {
        Ok(self
            .all_entries()?
            .into_iter()
            .map(|entry| entry.bucket)
            .collect())
    }

    /// Returns the number of entries.
    fn len(&self) -> StorageResult<usize> {
        Ok(self.all_entries()?.len())
    }

    /// Returns true if the store holds no entries.
    fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }
}

impl<S: LocalStore + ?Sized> LocalStore for Box<S> {
    fn put(
        &mut self,
        key: &str,
        value: Value,
        bucket: Bucket,
        timestamp: Option<i64>,
    ) -> StorageResult<Entry> {
        (**self).put(key, value, bucket, timestamp)
    }

    fn get(&self, key: &str) -> StorageResult<Option<Entry>> {
        (**self).get(key)
    }

    fn remove(&mut self, key: &str) -> StorageResult<Option<Entry>> {
        (**self).remove(key)
    }

    fn all_entries(&self) -> StorageResult<Vec<Entry>> {
        (**self).all_entries()
    }

    fn clear(&mut self) -> StorageResult<()> {
        (**self).clear()
    }

    fn entries_for_bucket(&self, bucket: &Bucket) -> StorageResult<BucketSnapshot> {
        (**self).entries_for_bucket(bucket)
    }

    fn buckets(&self) -> StorageResult<BTreeSet<Bucket>> {
        (**self).buckets()
    }
}
