//! Configuration for the sync engine.

use kvsync_protocol::Bucket;
use std::collections::BTreeSet;
use std::time::Duration;

/// Default quiescence window before a bucket is pushed.
pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

/// Default path of the bucket endpoint, appended to the base URL.
pub const DEFAULT_SYNC_PATH: &str = "/api/user/sync-data";

/// Default header carrying the bearer credential.
pub const DEFAULT_CREDENTIAL_HEADER: &str = "authorization-auth";

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the remote store.
    pub endpoint: String,
    /// Path of the bucket endpoint.
    pub sync_path: String,
    /// Header carrying the credential.
    pub credential_header: String,
    /// Quiescence window for debounced pushes.
    pub debounce_window: Duration,
    /// Maximum number of buckets with an armed debounce timer.
    pub max_pending_buckets: usize,
    /// Maximum number of buckets reconciled at once.
    pub reconcile_concurrency: usize,
    /// Request timeout handed to the HTTP client.
    pub request_timeout: Duration,
    /// Buckets reconciled even when no local entry uses them yet.
    pub buckets: BTreeSet<Bucket>,
}

impl SyncConfig {
    /// Creates a new sync configuration.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            sync_path: DEFAULT_SYNC_PATH.into(),
            credential_header: DEFAULT_CREDENTIAL_HEADER.into(),
            debounce_window: DEFAULT_DEBOUNCE_WINDOW,
            max_pending_buckets: 64,
            reconcile_concurrency: 4,
            request_timeout: Duration::from_secs(30),
            buckets: BTreeSet::new(),
        }
    }

    /// Sets the bucket endpoint path.
    pub fn with_sync_path(mut self, path: impl Into<String>) -> Self {
        self.sync_path = path.into();
        self
    }

    /// Sets the credential header name.
    pub fn with_credential_header(mut self, header: impl Into<String>) -> Self {
        self.credential_header = header.into();
        self
    }

    /// Sets the debounce window.
    pub fn with_debounce_window(mut self, window: Duration) -> Self {
        self.debounce_window = window;
        self
    }

    /// Sets the bound on armed debounce timers.
    pub fn with_max_pending_buckets(mut self, max: usize) -> Self {
        self.max_pending_buckets = max.max(1);
        self
    }

    /// Sets how many buckets are reconciled at once.
    pub fn with_reconcile_concurrency(mut self, concurrency: usize) -> Self {
        self.reconcile_concurrency = concurrency.max(1);
        self
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Declares a bucket that must be reconciled at startup.
    pub fn with_bucket(mut self, bucket: impl Into<Bucket>) -> Self {
        self.buckets.insert(bucket.into());
        self
    }

    /// Returns the full URL of the bucket endpoint.
    #[must_use]
    pub fn sync_url(&self) -> String {
        format!("{}{}", self.endpoint.trim_end_matches('/'), self.sync_path)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("")
    }
}
