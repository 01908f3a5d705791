//! Remote gateway abstraction.

use crate::config::DEFAULT_CREDENTIAL_HEADER;
use crate::credentials::CredentialProvider;
use crate::error::{SyncError, SyncResult};
use kvsync_protocol::{Bucket, BucketSnapshot};
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Access to the authoritative remote store.
///
/// Both operations exchange *whole buckets*. Calls block until the remote
/// answers; the engine runs them on Tokio's blocking pool so they never
/// stall callers of the store.
///
/// # Errors
///
/// Implementations report `Unauthenticated` when no credential is
/// available or it was rejected, `Unreachable` on transport failure and
/// `ServerError` on any other non-success answer.
pub trait RemoteGateway: Send + Sync {
    /// Fetches every entry of `bucket`. A bucket the remote has never seen is
    /// an empty snapshot, not an error.
    fn pull(&self, bucket: &Bucket) -> SyncResult<BucketSnapshot>;

    /// Replaces the remote content of `bucket` with `snapshot`.
    fn push(&self, bucket: &Bucket, snapshot: &BucketSnapshot) -> SyncResult<()>;
}

impl<G: RemoteGateway + ?Sized> RemoteGateway for Arc<G> {
    fn pull(&self, bucket: &Bucket) -> SyncResult<BucketSnapshot> {
        (**self).pull(bucket)
    }

    fn push(&self, bucket: &Bucket, snapshot: &BucketSnapshot) -> SyncResult<()> {
        (**self).push(bucket, snapshot)
    }
}

/// An in-memory remote store for testing.
///
/// Holds bucket snapshots the way the real endpoint does, checks an
/// optional required token, and can be switched offline, made to fail with
/// a status code, or paused to hold requests in flight. Devices talk to it
/// through [`MemoryRemote::connect`] or through
/// [`crate::LoopbackClient`].
#[derive(Debug)]
pub struct MemoryRemote {
    buckets: RwLock<HashMap<Bucket, BucketSnapshot>>,
    required_token: Option<String>,
    credential_header: String,
    online: AtomicBool,
    failure_status: RwLock<Option<u16>>,
    paused: Mutex<bool>,
    resumed: Condvar,
    pulls: AtomicU64,
    pushes: RwLock<Vec<(Bucket, BucketSnapshot)>>,
}

impl MemoryRemote {
    /// Creates a remote that accepts any credential.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Creates a remote that only accepts `token`.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self::build(Some(token.into()))
    }

    fn build(required_token: Option<String>) -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            required_token,
            credential_header: DEFAULT_CREDENTIAL_HEADER.into(),
            online: AtomicBool::new(true),
            failure_status: RwLock::new(None),
            paused: Mutex::new(false),
            resumed: Condvar::new(),
            pulls: AtomicU64::new(0),
            pushes: RwLock::new(Vec::new()),
        }
    }

    /// Reads the credential from `header` when served over HTTP.
    pub fn with_credential_header(mut self, header: impl Into<String>) -> Self {
        self.credential_header = header.into();
        self
    }

    /// Header carrying the credential on HTTP requests.
    pub fn credential_header(&self) -> &str {
        &self.credential_header
    }

    /// Returns a gateway presenting `credentials` to this remote.
    pub fn connect<P: CredentialProvider>(self: &Arc<Self>, credentials: P) -> MemoryGateway<P> {
        MemoryGateway {
            remote: Arc::clone(self),
            credentials,
        }
    }

    /// Replaces a bucket's content directly, bypassing auth and counters.
    pub fn seed(&self, bucket: impl Into<Bucket>, snapshot: BucketSnapshot) {
        self.buckets.write().insert(bucket.into(), snapshot);
    }

    /// Returns the current content of a bucket.
    pub fn bucket(&self, bucket: &Bucket) -> BucketSnapshot {
        self.buckets.read().get(bucket).cloned().unwrap_or_default()
    }

    /// Sets whether requests reach the remote at all.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Makes every request fail with `status` until cleared with `None`.
    pub fn fail_with(&self, status: Option<u16>) {
        *self.failure_status.write() = status;
    }

    /// Holds every incoming request until [`MemoryRemote::resume`].
    pub fn pause(&self) {
        *self.paused.lock() = true;
    }

    /// Releases held requests.
    pub fn resume(&self) {
        *self.paused.lock() = false;
        self.resumed.notify_all();
    }

    /// Number of pull requests received.
    pub fn pull_count(&self) -> u64 {
        self.pulls.load(Ordering::SeqCst)
    }

    /// Number of push requests accepted.
    pub fn push_count(&self) -> usize {
        self.pushes.read().len()
    }

    /// Every accepted push, in arrival order.
    pub fn pushes(&self) -> Vec<(Bucket, BucketSnapshot)> {
        self.pushes.read().clone()
    }

    /// Serves a pull as the remote endpoint would.
    pub fn handle_pull(&self, token: Option<&str>, bucket: &Bucket) -> SyncResult<BucketSnapshot> {
        self.admit(token)?;
        self.pulls.fetch_add(1, Ordering::SeqCst);
        Ok(self.bucket(bucket))
    }

    /// Serves a push as the remote endpoint would.
    pub fn handle_push(
        &self,
        token: Option<&str>,
        bucket: &Bucket,
        snapshot: &BucketSnapshot,
    ) -> SyncResult<()> {
        self.admit(token)?;
        self.buckets.write().insert(bucket.clone(), snapshot.clone());
        self.pushes.write().push((bucket.clone(), snapshot.clone()));
        Ok(())
    }

    fn admit(&self, token: Option<&str>) -> SyncResult<()> {
        {
            let mut paused = self.paused.lock();
            while *paused {
                self.resumed.wait(&mut paused);
            }
        }

        if !self.online.load(Ordering::SeqCst) {
            return Err(SyncError::Unreachable("remote is offline".into()));
        }
        if let Some(status) = *self.failure_status.read() {
            return Err(SyncError::server(status, "injected failure"));
        }
        match (&self.required_token, token) {
            (_, None) => Err(SyncError::Unauthenticated),
            (Some(required), Some(token)) if required != token => Err(SyncError::Unauthenticated),
            _ => Ok(()),
        }
    }
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

/// A device's connection to a [`MemoryRemote`].
pub struct MemoryGateway<P: CredentialProvider> {
    remote: Arc<MemoryRemote>,
    credentials: P,
}

impl<P: CredentialProvider> MemoryGateway<P> {
    /// Returns the remote this gateway talks to.
    pub fn remote(&self) -> &Arc<MemoryRemote> {
        &self.remote
    }
}

impl<P: CredentialProvider> RemoteGateway for MemoryGateway<P> {
    fn pull(&self, bucket: &Bucket) -> SyncResult<BucketSnapshot> {
        let token = self.credentials.credential().ok_or(SyncError::Unauthenticated)?;
        self.remote.handle_pull(Some(&token), bucket)
    }

    fn push(&self, bucket: &Bucket, snapshot: &BucketSnapshot) -> SyncResult<()> {
        let token = self.credentials.credential().ok_or(SyncError::Unauthenticated)?;
        self.remote.handle_push(Some(&token), bucket, snapshot)
    }
}
