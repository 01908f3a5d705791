//! Startup reconciliation.
//!
//! For every known bucket the remote snapshot is pulled and merged into the
//! local store with last-write-wins on the per-entry timestamp:
//!
//! | local          | remote         | outcome                          |
//! |----------------|----------------|----------------------------------|
//! | absent         | present        | adopt remote (value + timestamp) |
//! | older          | present        | adopt remote                     |
//! | newer          | present        | keep local, push bucket          |
//! | equal          | present        | keep local                       |
//! | present        | absent         | keep local, push bucket          |
//!
//! Adoption never triggers a push. A bucket that needs pushing is pushed
//! exactly once, after its merge. A failed pull is logged and the bucket is
//! merged against an empty remote, so its local entries are pushed.

use crate::error::{SyncError, SyncResult};
use crate::gateway::RemoteGateway;
use crate::store::Core;
use kvsync_protocol::{Bucket, BucketSnapshot, RemoteEntry};
use kvsync_storage::LocalStore;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Per-key decisions for one bucket.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergePlan {
    /// Remote entries to write locally, with their remote timestamps.
    pub adopt: Vec<(String, RemoteEntry)>,
    /// Keys whose local copy is strictly newer than the remote one.
    pub local_newer: Vec<String>,
    /// Keys the remote does not know.
    pub local_only: Vec<String>,
    /// Keys with equal timestamps on both sides.
    pub unchanged: Vec<String>,
}

impl MergePlan {
    /// Returns true if the remote is missing local knowledge.
    pub fn needs_push(&self) -> bool {
        !self.local_newer.is_empty() || !self.local_only.is_empty()
    }
}

/// Compares a local and a remote view of the same bucket.
pub fn plan_merge(local: &BucketSnapshot, remote: &BucketSnapshot) -> MergePlan {
    let mut plan = MergePlan::default();

    for (key, theirs) in remote {
        match local.get(key) {
            None => plan.adopt.push((key.clone(), theirs.clone())),
            Some(ours) if theirs.timestamp > ours.timestamp => {
                plan.adopt.push((key.clone(), theirs.clone()))
            }
            Some(ours) if ours.timestamp > theirs.timestamp => plan.local_newer.push(key.clone()),
            Some(_) => plan.unchanged.push(key.clone()),
        }
    }

    for key in local.keys() {
        if !remote.contains_key(key) {
            plan.local_only.push(key.clone());
        }
    }

    plan
}

#[derive(Debug, Default)]
struct BucketOutcome {
    pull_error: Option<SyncError>,
    adopted: usize,
    pushed: bool,
}

/// Runs one reconciliation pass over every known bucket, then marks the
/// store reconciled regardless of individual failures.
pub(crate) async fn run<S, G>(core: Arc<Core<S, G>>)
where
    S: LocalStore + 'static,
    G: RemoteGateway + 'static,
{
    let buckets = match core.known_buckets() {
        Ok(buckets) => buckets,
        Err(err) => {
            tracing::error!(error = %err, "cannot enumerate local buckets, skipping reconciliation");
            core.finish_reconcile();
            return;
        }
    };

    tracing::info!(buckets = buckets.len(), "reconciling with remote");

    let limit = Arc::new(Semaphore::new(core.config.reconcile_concurrency.max(1)));
    let mut tasks = JoinSet::new();
    for bucket in buckets {
        let core = Arc::clone(&core);
        let limit = Arc::clone(&limit);
        tasks.spawn(async move {
            let _permit = limit.acquire_owned().await.ok();
            let result = reconcile_bucket(&core, &bucket).await;
            (bucket, result)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((bucket, Ok(outcome))) => match outcome.pull_error {
                None => {
                    core.stats.write().buckets_reconciled += 1;
                    tracing::debug!(
                        bucket = %bucket,
                        adopted = outcome.adopted,
                        pushed = outcome.pushed,
                        "bucket reconciled"
                    );
                }
                Some(SyncError::Unauthenticated) => {
                    let mut stats = core.stats.write();
                    stats.buckets_failed += 1;
                    stats.skipped_unauthenticated += 1;
                    tracing::debug!(bucket = %bucket, "no credential, bucket left local");
                }
                Some(err) => {
                    let mut stats = core.stats.write();
                    stats.buckets_failed += 1;
                    stats.last_error = Some(err.to_string());
                    tracing::warn!(
                        bucket = %bucket,
                        error = %err,
                        pushed = outcome.pushed,
                        "pull failed, reconciled against local data only"
                    );
                }
            },
            Ok((bucket, Err(err))) => {
                let mut stats = core.stats.write();
                stats.buckets_failed += 1;
                stats.last_error = Some(err.to_string());
                tracing::error!(bucket = %bucket, error = %err, "local store failed during reconciliation");
            }
            Err(err) => {
                let mut stats = core.stats.write();
                stats.buckets_failed += 1;
                stats.last_error = Some(err.to_string());
                tracing::warn!(error = %err, "reconciliation task aborted");
            }
        }
    }

    core.finish_reconcile();
}

async fn reconcile_bucket<S, G>(core: &Arc<Core<S, G>>, bucket: &Bucket) -> SyncResult<BucketOutcome>
where
    S: LocalStore + 'static,
    G: RemoteGateway + 'static,
{
    let gateway = Arc::clone(&core.gateway);
    let target = bucket.clone();
    let pulled = tokio::task::spawn_blocking(move || gateway.pull(&target))
        .await
        .unwrap_or_else(|err| Err(SyncError::Unreachable(format!("pull task failed: {err}"))));
    let (remote, pull_error) = match pulled {
        Ok(remote) => (remote, None),
        Err(err) => (BucketSnapshot::new(), Some(err)),
    };

    let (adopted, dirty) = {
        let mut store = core.store.lock();

        // A remote key may live in another local bucket; compare against it
        // wherever it is and let adoption move it here.
        let mut local = store.entries_for_bucket(bucket)?;
        for key in remote.keys() {
            if !local.contains_key(key) {
                if let Some(entry) = store.get(key)? {
                    local.insert(key.clone(), entry.to_remote());
                }
            }
        }

        let plan = plan_merge(&local, &remote);
        for (key, entry) in &plan.adopt {
            store.put(key, entry.value.clone(), bucket.clone(), Some(entry.timestamp))?;
        }

        let dirty = if plan.needs_push() {
            Some(store.entries_for_bucket(bucket)?)
        } else {
            None
        };
        (plan.adopt.len(), dirty)
    };

    core.stats.write().entries_adopted += adopted as u64;

    let mut outcome = BucketOutcome {
        pull_error,
        adopted,
        pushed: false,
    };
    if let Some(snapshot) = dirty {
        outcome.pushed = core.push_snapshot(bucket, snapshot).await.is_ok();
    }
    Ok(outcome)
}
