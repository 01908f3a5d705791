//! Debounced, per-bucket push scheduling.
//!
//! Each bucket owns at most one armed timer. Re-arming a bucket aborts its
//! previous timer and starts a fresh quiescence window, so a burst of writes
//! collapses into a single push issued after the burst goes quiet. Timers are
//! keyed by bucket and tagged with a generation number; a timer that fires
//! after being superseded finds a different generation and does nothing.
//!
//! Once a timer has fired, its push is detached from the table and cannot be
//! cancelled.

use kvsync_protocol::Bucket;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;

struct PendingPush {
    generation: u64,
    timer: AbortHandle,
}

/// Coalesces bursts of writes to a bucket into one deferred push.
pub struct DebouncedPublisher {
    window: Duration,
    max_pending: usize,
    runtime: Handle,
    pending: Mutex<HashMap<Bucket, PendingPush>>,
    next_generation: AtomicU64,
}

impl DebouncedPublisher {
    /// Creates a publisher arming timers on `runtime`.
    ///
    /// At most `max_pending` buckets hold an armed timer; a bucket arriving
    /// when the table is full is pushed without waiting.
    pub fn new(window: Duration, max_pending: usize, runtime: Handle) -> Self {
        Self {
            window,
            max_pending: max_pending.max(1),
            runtime,
            pending: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Returns the quiescence window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Arms (or re-arms) the timer for `bucket`. When it fires, `push` runs.
    pub fn schedule<F, Fut>(self: &Arc<Self>, bucket: Bucket, push: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let mut pending = self.pending.lock();

        if let Some(previous) = pending.remove(&bucket) {
            previous.timer.abort();
            tracing::trace!(bucket = %bucket, "debounce timer reset");
        }

        if pending.len() >= self.max_pending {
            drop(pending);
            tracing::warn!(
                bucket = %bucket,
                max_pending = self.max_pending,
                "too many armed push timers, pushing immediately"
            );
            self.runtime.spawn(push());
            return;
        }

        let this = Arc::clone(self);
        let key = bucket.clone();
        let window = self.window;
        let timer = self.runtime.spawn(async move {
            tokio::time::sleep(window).await;
            if this.take_if_current(&key, generation) {
                push().await;
            }
        });

        pending.insert(
            bucket,
            PendingPush {
                generation,
                timer: timer.abort_handle(),
            },
        );
    }

    /// Detaches the timer of `bucket` if it is still the one armed as
    /// `generation`.
    fn take_if_current(&self, bucket: &Bucket, generation: u64) -> bool {
        let mut pending = self.pending.lock();
        match pending.get(bucket) {
            Some(entry) if entry.generation == generation => {
                pending.remove(bucket);
                true
            }
            _ => false,
        }
    }

    /// Aborts every armed timer, returning the buckets that were pending.
    pub fn cancel_all(&self) -> Vec<Bucket> {
        let mut pending = self.pending.lock();
        pending
            .drain()
            .map(|(bucket, entry)| {
                entry.timer.abort();
                bucket
            })
            .collect()
    }

    /// Returns true if `bucket` has an armed timer.
    pub fn is_pending(&self, bucket: &Bucket) -> bool {
        self.pending.lock().contains_key(bucket)
    }

    /// Returns the buckets with an armed timer.
    pub fn pending_buckets(&self) -> Vec<Bucket> {
        self.pending.lock().keys().cloned().collect()
    }
}
