//! Reconciliation state and observable sync status.

use crate::error::SyncError;
use kvsync_protocol::Bucket;

/// Lifecycle of the one-time startup reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconcileState {
    /// The store exists but reconciliation has not been started.
    #[default]
    NotStarted,
    /// Buckets are being pulled and merged.
    Reconciling,
    /// The pass finished, successfully or not. Incremental pushes are live.
    Done,
}

impl ReconcileState {
    /// Returns true once incremental publishing is allowed.
    pub fn is_done(&self) -> bool {
        matches!(self, ReconcileState::Done)
    }
}

/// What collaborators observe: readiness plus a "syncing" indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncStatus {
    /// Reconciliation progress.
    pub reconcile: ReconcileState,
    /// Pushes currently in flight.
    pub pushes_in_flight: usize,
}

impl SyncStatus {
    /// Returns true once reconciliation has completed.
    pub fn is_reconciled(&self) -> bool {
        self.reconcile.is_done()
    }

    /// Returns true while anything is being exchanged with the remote.
    pub fn is_syncing(&self) -> bool {
        self.reconcile == ReconcileState::Reconciling || self.pushes_in_flight > 0
    }
}

/// Counters describing the remote side effects of a store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Buckets whose pull succeeded during reconciliation.
    pub buckets_reconciled: u64,
    /// Buckets whose pull failed during reconciliation.
    pub buckets_failed: u64,
    /// Remote entries written into the local store.
    pub entries_adopted: u64,
    /// Pushes accepted by the remote.
    pub pushes_succeeded: u64,
    /// Pushes that failed with a retryable or protocol error.
    pub pushes_failed: u64,
    /// Remote calls skipped for lack of a valid credential.
    pub skipped_unauthenticated: u64,
    /// Wall-clock milliseconds of the last accepted push.
    pub last_push_at: Option<i64>,
    /// Message of the last remote failure.
    pub last_error: Option<String>,
}

impl SyncStats {
    pub(crate) fn record_push(&mut self, result: &Result<(), SyncError>, now: i64) {
        match result {
            Ok(()) => {
                self.pushes_succeeded += 1;
                self.last_push_at = Some(now);
            }
            Err(SyncError::Unauthenticated) => self.skipped_unauthenticated += 1,
            Err(err) => {
                self.pushes_failed += 1;
                self.last_error = Some(err.to_string());
            }
        }
    }
}

/// Outcome of a manual flush.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Buckets the remote accepted.
    pub pushed: Vec<Bucket>,
    /// Buckets skipped for lack of a credential.
    pub skipped: Vec<Bucket>,
    /// Buckets that failed, with the error message.
    pub failed: Vec<(Bucket, String)>,
}

impl FlushReport {
    /// Returns true if no bucket failed.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub(crate) fn record(&mut self, bucket: Bucket, result: Result<(), SyncError>) {
        match result {
            Ok(()) => self.pushed.push(bucket),
            Err(SyncError::Unauthenticated) => self.skipped.push(bucket),
            Err(err) => self.failed.push((bucket, err.to_string())),
        }
    }
}
