//! The synchronized store facade.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::gateway::RemoteGateway;
use crate::publisher::DebouncedPublisher;
use crate::reconcile;
use crate::state::{FlushReport, ReconcileState, SyncStats, SyncStatus};
use kvsync_protocol::{Bucket, BucketSnapshot};
use kvsync_storage::{clock, Entry, LocalStore};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::watch;

/// State shared between the facade, the reconciler and armed push timers.
pub(crate) struct Core<S, G> {
    pub(crate) config: SyncConfig,
    pub(crate) store: Mutex<S>,
    pub(crate) gateway: Arc<G>,
    pub(crate) stats: RwLock<SyncStats>,
    status: watch::Sender<SyncStatus>,
    publisher: Arc<DebouncedPublisher>,
    runtime: Handle,
}

impl<S, G> Core<S, G>
where
    S: LocalStore + 'static,
    G: RemoteGateway + 'static,
{
    fn is_reconciled(&self) -> bool {
        self.status.borrow().is_reconciled()
    }

    /// Buckets reconciliation visits: everything stored locally, every
    /// configured bucket and the global bucket.
    pub(crate) fn known_buckets(&self) -> SyncResult<BTreeSet<Bucket>> {
        let mut buckets = self.store.lock().buckets()?;
        buckets.extend(self.config.buckets.iter().cloned());
        buckets.insert(Bucket::global());
        Ok(buckets)
    }

    pub(crate) fn finish_reconcile(&self) {
        self.status.send_modify(|status| status.reconcile = ReconcileState::Done);
        tracing::info!("reconciliation finished, incremental sync enabled");
    }

    /// Arms the debounce timer of `bucket`. Does nothing until reconciled.
    fn notify(self: &Arc<Self>, bucket: Bucket) {
        if !self.is_reconciled() {
            tracing::trace!(bucket = %bucket, "write before reconciliation, push deferred");
            return;
        }
        let core = Arc::clone(self);
        let target = bucket.clone();
        self.publisher.schedule(bucket, move || async move {
            core.push_bucket(&target).await.ok();
        });
    }

    /// Pushes the current snapshot of `bucket`.
    pub(crate) async fn push_bucket(self: &Arc<Self>, bucket: &Bucket) -> SyncResult<()> {
        let read = self.store.lock().entries_for_bucket(bucket);
        let snapshot = match read {
            Ok(snapshot) => snapshot,
            Err(err) => {
                tracing::error!(bucket = %bucket, error = %err, "cannot read bucket for push");
                return Err(err.into());
            }
        };
        self.push_snapshot(bucket, snapshot).await
    }

    pub(crate) async fn push_snapshot(
        self: &Arc<Self>,
        bucket: &Bucket,
        snapshot: BucketSnapshot,
    ) -> SyncResult<()> {
        let entries = snapshot.len();
        let gateway = Arc::clone(&self.gateway);
        let target = bucket.clone();

        self.status.send_modify(|status| status.pushes_in_flight += 1);
        let result = tokio::task::spawn_blocking(move || gateway.push(&target, &snapshot))
            .await
            .unwrap_or_else(|err| Err(SyncError::Unreachable(format!("push task failed: {err}"))));
        self.status.send_modify(|status| {
            status.pushes_in_flight = status.pushes_in_flight.saturating_sub(1)
        });

        self.stats.write().record_push(&result, clock::wall_millis());
        match &result {
            Ok(()) => tracing::debug!(bucket = %bucket, entries, "bucket pushed"),
            Err(SyncError::Unauthenticated) => {
                tracing::debug!(bucket = %bucket, "no credential, push skipped")
            }
            Err(err) => tracing::warn!(bucket = %bucket, error = %err, "push failed"),
        }
        result
    }

    /// Pushes each bucket in turn. A local storage failure aborts the run.
    async fn push_all(
        self: &Arc<Self>,
        buckets: BTreeSet<Bucket>,
    ) -> SyncResult<FlushReport> {
        let mut report = FlushReport::default();
        for bucket in buckets {
            match self.push_bucket(&bucket).await {
                Err(err) if err.is_local() => return Err(err),
                result => report.record(bucket, result),
            }
        }
        Ok(report)
    }
}

/// A local key-value store kept in sync with a remote store.
///
/// Reads and writes go to the local store and complete without touching the
/// network. After the one-time startup reconciliation, every write arms a
/// debounced push of the written entry's bucket. Remote failures never reach
/// the caller; only local storage failures do.
///
/// The store is cheap to clone; clones share the same state.
///
/// # Example
///
/// ```rust
/// use kvsync_engine::{MemoryRemote, StaticCredential, SyncConfig, SyncedStore};
/// use kvsync_storage::InMemoryStore;
/// use serde_json::json;
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), kvsync_engine::SyncError> {
/// let remote = Arc::new(MemoryRemote::with_token("secret"));
/// let gateway = remote.connect(StaticCredential::new("secret"));
///
/// let store = SyncedStore::open(SyncConfig::default(), InMemoryStore::new(), gateway)?;
/// store.wait_reconciled().await;
///
/// store.set_in_bucket("theme", json!("dark"), "settings")?;
/// assert_eq!(store.get("theme")?, Some(json!("dark")));
///
/// store.flush().await?;
/// assert_eq!(remote.bucket(&"settings".into()).len(), 1);
/// # Ok(())
/// # }
/// ```
pub struct SyncedStore<S, G>
where
    S: LocalStore + 'static,
    G: RemoteGateway + 'static,
{
    core: Arc<Core<S, G>>,
}

impl<S, G> Clone for SyncedStore<S, G>
where
    S: LocalStore + 'static,
    G: RemoteGateway + 'static,
{
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<S, G> SyncedStore<S, G>
where
    S: LocalStore + 'static,
    G: RemoteGateway + 'static,
{
    /// Creates a store without starting reconciliation.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NoRuntime`] when called outside a Tokio runtime.
    pub fn new(config: SyncConfig, store: S, gateway: G) -> SyncResult<Self> {
        let runtime = Handle::try_current().map_err(|_| SyncError::NoRuntime)?;
        let publisher = Arc::new(DebouncedPublisher::new(
            config.debounce_window,
            config.max_pending_buckets,
            runtime.clone(),
        ));
        let (status, _) = watch::channel(SyncStatus::default());

        Ok(Self {
            core: Arc::new(Core {
                config,
                store: Mutex::new(store),
                gateway: Arc::new(gateway),
                stats: RwLock::new(SyncStats::default()),
                status,
                publisher,
                runtime,
            }),
        })
    }

    /// Creates a store and starts reconciliation in the background.
    ///
    /// The store is usable immediately; writes made before reconciliation
    /// finishes stay local until a later write or flush publishes them.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NoRuntime`] when called outside a Tokio runtime.
    pub fn open(config: SyncConfig, store: S, gateway: G) -> SyncResult<Self> {
        let synced = Self::new(config, store, gateway)?;
        synced.start();
        Ok(synced)
    }

    /// Starts the background reconciliation. Returns false if it was already
    /// started.
    pub fn start(&self) -> bool {
        let started = self.core.status.send_if_modified(|status| {
            if status.reconcile == ReconcileState::NotStarted {
                status.reconcile = ReconcileState::Reconciling;
                true
            } else {
                false
            }
        });
        if started {
            self.core
                .runtime
                .spawn(reconcile::run(Arc::clone(&self.core)));
        }
        started
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.core.config
    }

    /// Returns the value stored under `key`.
    pub fn get(&self, key: &str) -> SyncResult<Option<Value>> {
        Ok(self.get_entry(key)?.map(|entry| entry.value))
    }

    /// Returns the full entry stored under `key`.
    pub fn get_entry(&self, key: &str) -> SyncResult<Option<Entry>> {
        Ok(self.core.store.lock().get(key)?)
    }

    /// Writes `key` into the global bucket.
    pub fn set(&self, key: &str, value: Value) -> SyncResult<Entry> {
        self.set_in_bucket(key, value, Bucket::global())
    }

    /// Writes `key` into `bucket`, stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::LocalStorage`] if the write could not be
    /// persisted. No push is scheduled in that case.
    pub fn set_in_bucket(
        &self,
        key: &str,
        value: Value,
        bucket: impl Into<Bucket>,
    ) -> SyncResult<Entry> {
        let bucket = bucket.into();
        let (entry, previous) = {
            let mut store = self.core.store.lock();
            let previous = store.get(key)?.map(|entry| entry.bucket);
            (store.put(key, value, bucket.clone(), None)?, previous)
        };
        // A key moving buckets must also be republished out of its old one.
        if let Some(old) = previous.filter(|old| *old != bucket) {
            self.core.notify(old);
        }
        self.core.notify(bucket);
        Ok(entry)
    }

    /// Removes `key`. The bucket it lived in is republished without it.
    pub fn remove(&self, key: &str) -> SyncResult<Option<Entry>> {
        let removed = self.core.store.lock().remove(key)?;
        if let Some(entry) = &removed {
            self.core.notify(entry.bucket.clone());
        }
        Ok(removed)
    }

    /// Returns every entry.
    pub fn get_all(&self) -> SyncResult<Vec<Entry>> {
        Ok(self.core.store.lock().all_entries()?)
    }

    /// Returns the wire snapshot of `bucket`.
    pub fn entries_for_bucket(&self, bucket: &Bucket) -> SyncResult<BucketSnapshot> {
        Ok(self.core.store.lock().entries_for_bucket(bucket)?)
    }

    /// Returns the buckets holding at least one local entry.
    pub fn buckets(&self) -> SyncResult<BTreeSet<Bucket>> {
        Ok(self.core.store.lock().buckets()?)
    }

    /// Empties the local store and disarms pending pushes. The remote is
    /// left untouched.
    pub fn clear(&self) -> SyncResult<()> {
        let cancelled = self.core.publisher.cancel_all();
        self.core.store.lock().clear()?;
        tracing::info!(cancelled = cancelled.len(), "local store cleared");
        Ok(())
    }

    /// Returns true once startup reconciliation has completed.
    pub fn is_reconciled(&self) -> bool {
        self.core.is_reconciled()
    }

    /// Returns the current sync status.
    pub fn status(&self) -> SyncStatus {
        *self.core.status.borrow()
    }

    /// Subscribes to status changes.
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.core.status.subscribe()
    }

    /// Waits until startup reconciliation has completed.
    ///
    /// Never returns if [`SyncedStore::start`] is never called.
    pub async fn wait_reconciled(&self) {
        let mut status = self.core.status.subscribe();
        let _ = status.wait_for(SyncStatus::is_reconciled).await;
    }

    /// Returns a snapshot of the sync counters.
    pub fn stats(&self) -> SyncStats {
        self.core.stats.read().clone()
    }

    /// Returns the buckets with an armed push timer.
    pub fn pending_buckets(&self) -> Vec<Bucket> {
        self.core.publisher.pending_buckets()
    }

    /// Pushes every locally held bucket now, bypassing the debounce window.
    ///
    /// Buckets with an armed timer are pushed too, even if they no longer
    /// hold entries, so pending deletions reach the remote.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotReconciled`] before reconciliation finished and
    /// [`SyncError::LocalStorage`] if a bucket cannot be read. Remote
    /// failures are reported per bucket in the [`FlushReport`].
    pub async fn flush(&self) -> SyncResult<FlushReport> {
        if !self.is_reconciled() {
            return Err(SyncError::NotReconciled);
        }
        let mut buckets = self.buckets()?;
        buckets.extend(self.core.publisher.cancel_all());

        let report = self.core.push_all(buckets).await?;
        tracing::info!(
            pushed = report.pushed.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "flush complete"
        );
        Ok(report)
    }

    /// Re-stamps every local entry with the current time and pushes every
    /// bucket, so this device's data wins over anything older on the remote.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::LocalStorage`] if the store cannot be rewritten.
    pub async fn force_push(&self) -> SyncResult<FlushReport> {
        let mut buckets = {
            let mut store = self.core.store.lock();
            let now = clock::next_timestamp();
            for entry in store.all_entries()? {
                store.put(&entry.key, entry.value, entry.bucket, Some(now))?;
            }
            store.buckets()?
        };
        buckets.extend(self.core.publisher.cancel_all());

        tracing::info!(buckets = buckets.len(), "force pushing local data");
        self.core.push_all(buckets).await
    }

    /// Flushes pending work and disarms all timers.
    ///
    /// Before reconciliation finished there is nothing safe to publish; the
    /// timers are disarmed and an empty report is returned.
    pub async fn shutdown(self) -> SyncResult<FlushReport> {
        let report = match self.flush().await {
            Err(SyncError::NotReconciled) => {
                tracing::info!("shutdown before reconciliation, nothing published");
                Ok(FlushReport::default())
            }
            other => other,
        };
        self.core.publisher.cancel_all();
        report
    }
}
