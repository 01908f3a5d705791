//! Integration tests for the synchronized store.

use kvsync_engine::{
    Anonymous, HttpGateway, LoopbackClient, MemoryRemote, RemoteGateway, SharedCredential,
    StaticCredential, SyncConfig, SyncError, SyncedStore,
};
use kvsync_protocol::{Bucket, BucketSnapshot, RemoteEntry};
use kvsync_storage::{Entry, InMemoryStore, LocalStore, StorageError, StorageResult};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

const TOKEN: &str = "secret";
const WINDOW: Duration = Duration::from_millis(60);

fn config() -> SyncConfig {
    SyncConfig::default().with_debounce_window(WINDOW)
}

fn remote_snapshot(entries: &[(&str, Value, i64)]) -> BucketSnapshot {
    entries
        .iter()
        .map(|(key, value, ts)| (key.to_string(), RemoteEntry::new(value.clone(), *ts)))
        .collect()
}

fn local_store(entries: &[(&str, Value, i64, &str)]) -> InMemoryStore {
    InMemoryStore::with_entries(
        entries
            .iter()
            .map(|(key, value, ts, bucket)| Entry::new(*key, value.clone(), *ts, Bucket::named(*bucket))),
    )
}

async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        sleep(Duration::from_millis(5)).await;
    }
}

async fn open_synced<S: LocalStore + 'static, G: RemoteGateway + 'static>(
    config: SyncConfig,
    store: S,
    gateway: G,
) -> SyncedStore<S, G> {
    let synced = SyncedStore::open(config, store, gateway).unwrap();
    synced.wait_reconciled().await;
    synced
}

#[tokio::test]
async fn remote_newer_is_adopted_without_push() {
    let remote = Arc::new(MemoryRemote::with_token(TOKEN));
    remote.seed("settings", remote_snapshot(&[("notes", json!("B"), 9)]));

    let store = open_synced(
        config(),
        local_store(&[("notes", json!("A"), 5, "settings")]),
        remote.connect(StaticCredential::new(TOKEN)),
    )
    .await;

    let entry = store.get_entry("notes").unwrap().unwrap();
    assert_eq!(entry.value, json!("B"));
    assert_eq!(entry.timestamp, 9);
    assert_eq!(entry.bucket, Bucket::named("settings"));

    sleep(WINDOW * 3).await;
    assert_eq!(remote.push_count(), 0);
    assert_eq!(store.stats().entries_adopted, 1);
}

#[tokio::test]
async fn local_newer_is_pushed_once() {
    let remote = Arc::new(MemoryRemote::with_token(TOKEN));
    remote.seed("settings", remote_snapshot(&[("notes", json!("B"), 9)]));

    let store = open_synced(
        config(),
        local_store(&[("notes", json!("A"), 12, "settings")]),
        remote.connect(StaticCredential::new(TOKEN)),
    )
    .await;

    assert_eq!(store.get("notes").unwrap(), Some(json!("A")));
    eventually("reconciliation push", || remote.push_count() == 1).await;
    sleep(WINDOW * 3).await;

    let pushes = remote.pushes();
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0].0, Bucket::named("settings"));
    assert_eq!(
        pushes[0].1,
        remote_snapshot(&[("notes", json!("A"), 12)])
    );
}

#[tokio::test]
async fn equal_timestamps_keep_local_quietly() {
    let remote = Arc::new(MemoryRemote::with_token(TOKEN));
    remote.seed("s", remote_snapshot(&[("k", json!("remote"), 7)]));

    let store = open_synced(
        config(),
        local_store(&[("k", json!("local"), 7, "s")]),
        remote.connect(StaticCredential::new(TOKEN)),
    )
    .await;

    assert_eq!(store.get("k").unwrap(), Some(json!("local")));
    sleep(WINDOW * 3).await;
    assert_eq!(remote.push_count(), 0);
}

#[tokio::test]
async fn configured_bucket_is_pulled_into_empty_store() {
    let remote = Arc::new(MemoryRemote::with_token(TOKEN));
    remote.seed(
        "settings",
        remote_snapshot(&[("a", json!(1), 3), ("b", json!({"nested": true}), 4)]),
    );

    let store = open_synced(
        config().with_bucket("settings"),
        InMemoryStore::new(),
        remote.connect(StaticCredential::new(TOKEN)),
    )
    .await;

    let snapshot = store.entries_for_bucket(&Bucket::named("settings")).unwrap();
    assert_eq!(
        snapshot,
        remote_snapshot(&[("a", json!(1), 3), ("b", json!({"nested": true}), 4)])
    );
    assert_eq!(remote.push_count(), 0);
}

#[tokio::test]
async fn adopted_key_moves_between_buckets() {
    let remote = Arc::new(MemoryRemote::with_token(TOKEN));
    remote.seed("b", remote_snapshot(&[("k", json!("new"), 20)]));

    let store = open_synced(
        config().with_bucket("b"),
        local_store(&[("k", json!("old"), 10, "a")]),
        remote.connect(StaticCredential::new(TOKEN)),
    )
    .await;

    let entry = store.get_entry("k").unwrap().unwrap();
    assert_eq!(entry.bucket, Bucket::named("b"));
    assert_eq!(entry.value, json!("new"));
    assert!(store.entries_for_bucket(&Bucket::named("a")).unwrap().is_empty());
}

#[tokio::test]
async fn newer_remote_settings_are_adopted_and_republished_verbatim() {
    let remote = Arc::new(MemoryRemote::with_token(TOKEN));
    remote.seed(
        "settings",
        remote_snapshot(&[("a", json!(20), 200), ("b", json!(30), 50)]),
    );

    let store = open_synced(
        config().with_debounce_window(Duration::from_secs(60)),
        local_store(&[("a", json!(10), 100, "settings")]),
        remote.connect(StaticCredential::new(TOKEN)),
    )
    .await;

    assert_eq!(store.get("a").unwrap(), Some(json!(20)));
    assert_eq!(store.get("b").unwrap(), Some(json!(30)));
    assert_eq!(store.get_entry("a").unwrap().unwrap().timestamp, 200);
    assert_eq!(store.get_entry("b").unwrap().unwrap().timestamp, 50);
    assert_eq!(remote.push_count(), 0);

    let report = store.flush().await.unwrap();
    assert_eq!(report.pushed, vec![Bucket::named("settings")]);

    let pushes = remote.pushes();
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0].0, Bucket::named("settings"));
    assert_eq!(
        pushes[0].1,
        remote_snapshot(&[("a", json!(20), 200), ("b", json!(30), 50)])
    );
}

#[tokio::test]
async fn rewriting_key_into_other_bucket_flushes_both() {
    let remote = Arc::new(MemoryRemote::with_token(TOKEN));
    let store = open_synced(
        config().with_debounce_window(Duration::from_secs(60)),
        InMemoryStore::new(),
        remote.connect(StaticCredential::new(TOKEN)),
    )
    .await;

    store.set_in_bucket("k", json!(1), "a").unwrap();
    store.flush().await.unwrap();
    assert!(remote.bucket(&Bucket::named("a")).contains_key("k"));

    store.set_in_bucket("k", json!(2), "b").unwrap();
    let mut pending = store.pending_buckets();
    pending.sort();
    assert_eq!(pending, vec![Bucket::named("a"), Bucket::named("b")]);

    let report = store.flush().await.unwrap();
    assert!(report.pushed.contains(&Bucket::named("a")));
    assert!(report.pushed.contains(&Bucket::named("b")));
    assert!(remote.bucket(&Bucket::named("a")).is_empty());
    assert_eq!(
        remote.bucket(&Bucket::named("b")).get("k").map(|e| e.value.clone()),
        Some(json!(2))
    );
}

#[tokio::test]
async fn rewriting_key_into_other_bucket_debounces_old_bucket() {
    let remote = Arc::new(MemoryRemote::with_token(TOKEN));
    let store = open_synced(
        config(),
        InMemoryStore::new(),
        remote.connect(StaticCredential::new(TOKEN)),
    )
    .await;

    store.set_in_bucket("k", json!(1), "a").unwrap();
    eventually("first push", || remote.push_count() == 1).await;

    store.set_in_bucket("k", json!(2), "b").unwrap();
    eventually("old bucket emptied", || {
        remote.bucket(&Bucket::named("a")).is_empty()
            && remote.bucket(&Bucket::named("b")).contains_key("k")
    })
    .await;
    sleep(WINDOW * 3).await;
    assert_eq!(remote.push_count(), 3);
}

#[tokio::test]
async fn writes_during_reconciliation_are_not_pushed_early() {
    let remote = Arc::new(MemoryRemote::with_token(TOKEN));
    remote.pause();

    let store = SyncedStore::open(
        config(),
        InMemoryStore::new(),
        remote.connect(StaticCredential::new(TOKEN)),
    )
    .unwrap();

    store.set("early", json!(true)).unwrap();
    assert!(!store.is_reconciled());
    assert!(store.pending_buckets().is_empty());
    sleep(WINDOW * 3).await;
    assert_eq!(remote.push_count(), 0);

    remote.resume();
    store.wait_reconciled().await;

    // The early write is local-only at merge time, so reconciliation
    // publishes it.
    eventually("early write on remote", || {
        remote.bucket(&Bucket::global()).contains_key("early")
    })
    .await;
}

#[tokio::test]
async fn burst_of_writes_collapses_into_one_push() {
    let remote = Arc::new(MemoryRemote::with_token(TOKEN));
    let store = open_synced(
        config(),
        InMemoryStore::new(),
        remote.connect(StaticCredential::new(TOKEN)),
    )
    .await;

    for i in 0..10 {
        store.set_in_bucket("counter", json!(i), "s").unwrap();
    }
    assert_eq!(store.pending_buckets(), vec![Bucket::named("s")]);

    eventually("debounced push", || remote.push_count() == 1).await;
    sleep(WINDOW * 3).await;
    assert_eq!(remote.push_count(), 1);

    let pushed = remote.bucket(&Bucket::named("s"));
    assert_eq!(pushed.get("counter").map(|e| e.value.clone()), Some(json!(9)));
}

#[tokio::test]
async fn each_bucket_gets_its_own_push() {
    let remote = Arc::new(MemoryRemote::with_token(TOKEN));
    let store = open_synced(
        config(),
        InMemoryStore::new(),
        remote.connect(StaticCredential::new(TOKEN)),
    )
    .await;

    store.set_in_bucket("x", json!(1), "a").unwrap();
    store.set_in_bucket("y", json!(2), "b").unwrap();
    store.set_in_bucket("z", json!(3), "a").unwrap();

    eventually("two pushes", || remote.push_count() == 2).await;
    sleep(WINDOW * 3).await;

    let mut buckets: Vec<Bucket> = remote.pushes().into_iter().map(|(b, _)| b).collect();
    buckets.sort();
    assert_eq!(buckets, vec![Bucket::named("a"), Bucket::named("b")]);
    assert_eq!(remote.bucket(&Bucket::named("a")).len(), 2);
}

#[tokio::test]
async fn removal_is_published_by_omission() {
    let remote = Arc::new(MemoryRemote::with_token(TOKEN));
    let store = open_synced(
        config(),
        InMemoryStore::new(),
        remote.connect(StaticCredential::new(TOKEN)),
    )
    .await;

    store.set_in_bucket("keep", json!(1), "s").unwrap();
    store.set_in_bucket("drop", json!(2), "s").unwrap();
    store.flush().await.unwrap();
    assert_eq!(remote.bucket(&Bucket::named("s")).len(), 2);

    let removed = store.remove("drop").unwrap().unwrap();
    assert_eq!(removed.bucket, Bucket::named("s"));
    assert!(store.remove("drop").unwrap().is_none());

    eventually("deletion push", || remote.bucket(&Bucket::named("s")).len() == 1).await;
    assert!(remote.bucket(&Bucket::named("s")).contains_key("keep"));
}

#[tokio::test]
async fn removing_last_entry_empties_remote_bucket_on_flush() {
    let remote = Arc::new(MemoryRemote::with_token(TOKEN));
    let store = open_synced(
        config().with_debounce_window(Duration::from_secs(60)),
        InMemoryStore::new(),
        remote.connect(StaticCredential::new(TOKEN)),
    )
    .await;

    store.set_in_bucket("only", json!(1), "s").unwrap();
    store.flush().await.unwrap();
    store.remove("only").unwrap();

    let report = store.flush().await.unwrap();
    assert!(report.pushed.contains(&Bucket::named("s")));
    assert!(remote.bucket(&Bucket::named("s")).is_empty());
}

#[tokio::test]
async fn two_devices_converge() {
    let remote = Arc::new(MemoryRemote::with_token(TOKEN));

    let laptop = open_synced(
        config(),
        InMemoryStore::new(),
        remote.connect(StaticCredential::new(TOKEN)),
    )
    .await;
    laptop.set_in_bucket("theme", json!("dark"), "settings").unwrap();
    laptop.flush().await.unwrap();

    let phone = open_synced(
        config().with_bucket("settings"),
        InMemoryStore::new(),
        remote.connect(StaticCredential::new(TOKEN)),
    )
    .await;
    assert_eq!(phone.get("theme").unwrap(), Some(json!("dark")));

    phone.set_in_bucket("theme", json!("light"), "settings").unwrap();
    phone.flush().await.unwrap();

    // The laptop's next session sees the phone's newer write.
    let carried = InMemoryStore::with_entries(laptop.get_all().unwrap());
    laptop.shutdown().await.unwrap();
    let laptop = open_synced(
        config(),
        carried,
        remote.connect(StaticCredential::new(TOKEN)),
    )
    .await;
    assert_eq!(laptop.get("theme").unwrap(), Some(json!("light")));
}

#[tokio::test]
async fn anonymous_store_never_reaches_remote() {
    let remote = Arc::new(MemoryRemote::new());
    let store = open_synced(config(), InMemoryStore::new(), remote.connect(Anonymous)).await;

    store.set_in_bucket("k", json!(1), "s").unwrap();
    assert_eq!(store.get("k").unwrap(), Some(json!(1)));
    sleep(WINDOW * 3).await;

    let report = store.flush().await.unwrap();
    assert_eq!(report.skipped, vec![Bucket::named("s")]);
    assert!(report.is_clean());

    assert_eq!(remote.pull_count(), 0);
    assert_eq!(remote.push_count(), 0);
    let stats = store.stats();
    assert!(stats.skipped_unauthenticated >= 2);
    assert_eq!(stats.buckets_reconciled, 0);
}

#[tokio::test]
async fn login_later_enables_pushes() {
    let remote = Arc::new(MemoryRemote::with_token(TOKEN));
    let credential = SharedCredential::new();
    let store = open_synced(
        config(),
        InMemoryStore::new(),
        remote.connect(credential.clone()),
    )
    .await;

    store.set("k", json!(1)).unwrap();
    sleep(WINDOW * 3).await;
    assert_eq!(remote.push_count(), 0);

    credential.set(TOKEN);
    store.set("k", json!(2)).unwrap();
    eventually("push after login", || remote.push_count() == 1).await;
}

#[tokio::test]
async fn unreachable_remote_leaves_local_data_intact() {
    let remote = Arc::new(MemoryRemote::with_token(TOKEN));
    remote.seed("s", remote_snapshot(&[("a", json!("remote"), 1)]));
    remote.set_online(false);

    let store = open_synced(
        config(),
        local_store(&[("b", json!("local"), 2, "s")]),
        remote.connect(StaticCredential::new(TOKEN)),
    )
    .await;

    assert!(store.is_reconciled());
    assert_eq!(store.stats().buckets_failed, 2);
    assert_eq!(store.get("b").unwrap(), Some(json!("local")));
    assert!(store.get("a").unwrap().is_none());

    // One failed catch-up push during reconciliation, one debounced.
    store.set_in_bucket("c", json!(3), "s").unwrap();
    sleep(WINDOW * 3).await;
    assert_eq!(store.stats().pushes_failed, 2);

    remote.set_online(true);
    let report = store.flush().await.unwrap();
    assert_eq!(report.pushed, vec![Bucket::named("s")]);
}

#[tokio::test]
async fn failing_remote_keeps_its_data() {
    let remote = Arc::new(MemoryRemote::with_token(TOKEN));
    remote.seed("s", remote_snapshot(&[("theirs", json!(1), 1)]));
    remote.fail_with(Some(500));

    let store = open_synced(
        config(),
        local_store(&[("mine", json!(2), 2, "s")]),
        remote.connect(StaticCredential::new(TOKEN)),
    )
    .await;
    remote.fail_with(None);

    sleep(WINDOW * 3).await;
    assert_eq!(remote.push_count(), 0);
    assert!(remote.bucket(&Bucket::named("s")).contains_key("theirs"));

    let stats = store.stats();
    assert_eq!(stats.buckets_failed, 2);
    assert_eq!(stats.pushes_failed, 1);
    assert!(stats.last_error.is_some());
}

/// Serves pushes but fails every pull.
struct PullFails<G>(G);

impl<G: RemoteGateway> RemoteGateway for PullFails<G> {
    fn pull(&self, _bucket: &Bucket) -> kvsync_engine::SyncResult<BucketSnapshot> {
        Err(SyncError::server(503, "pull unavailable"))
    }

    fn push(&self, bucket: &Bucket, snapshot: &BucketSnapshot) -> kvsync_engine::SyncResult<()> {
        self.0.push(bucket, snapshot)
    }
}

#[tokio::test]
async fn failed_pull_reconciles_against_empty_remote() {
    let remote = Arc::new(MemoryRemote::with_token(TOKEN));
    let store = open_synced(
        config(),
        local_store(&[("mine", json!(2), 2, "s")]),
        PullFails(remote.connect(StaticCredential::new(TOKEN))),
    )
    .await;

    assert!(store.is_reconciled());
    assert_eq!(remote.push_count(), 1);
    assert_eq!(
        remote.bucket(&Bucket::named("s")),
        remote_snapshot(&[("mine", json!(2), 2)])
    );
    assert_eq!(store.stats().buckets_reconciled, 0);
}

#[tokio::test]
async fn force_push_overwrites_remote() {
    let remote = Arc::new(MemoryRemote::with_token(TOKEN));
    let store = open_synced(
        config(),
        local_store(&[("k", json!("mine"), 1, "s")]),
        remote.connect(StaticCredential::new(TOKEN)),
    )
    .await;
    eventually("reconciliation push", || remote.push_count() == 1).await;

    let before = kvsync_storage::clock::wall_millis();
    remote.seed("s", remote_snapshot(&[("k", json!("other"), before + 1)]));

    let report = store.force_push().await.unwrap();
    assert_eq!(report.pushed, vec![Bucket::named("s")]);

    let pushed = remote.bucket(&Bucket::named("s"));
    let entry = pushed.get("k").unwrap();
    assert_eq!(entry.value, json!("mine"));
    assert!(entry.timestamp >= before);
    assert_eq!(store.get_entry("k").unwrap().unwrap().timestamp, entry.timestamp);
}

#[tokio::test]
async fn status_reports_syncing_while_push_in_flight() {
    let remote = Arc::new(MemoryRemote::with_token(TOKEN));
    let store = open_synced(
        config(),
        InMemoryStore::new(),
        remote.connect(StaticCredential::new(TOKEN)),
    )
    .await;
    let mut status = store.subscribe();
    assert!(status.borrow().is_reconciled());

    remote.pause();
    store.set("k", json!(1)).unwrap();
    tokio::time::timeout(Duration::from_secs(5), status.wait_for(|s| s.pushes_in_flight == 1))
        .await
        .unwrap()
        .unwrap();
    assert!(store.status().is_syncing());

    remote.resume();
    tokio::time::timeout(Duration::from_secs(5), status.wait_for(|s| !s.is_syncing()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(store.stats().pushes_succeeded, 1);
}

#[tokio::test]
async fn http_gateway_end_to_end() {
    let remote = Arc::new(MemoryRemote::with_token(TOKEN));
    remote.seed("settings", remote_snapshot(&[("lang", json!("en"), 4)]));

    let config = SyncConfig::new("http://kv.test")
        .with_debounce_window(WINDOW)
        .with_bucket("settings");
    let gateway = HttpGateway::new(
        &config,
        LoopbackClient::new(Arc::clone(&remote)),
        StaticCredential::new(TOKEN),
    );
    let store = open_synced(config, InMemoryStore::new(), gateway).await;

    assert_eq!(store.get("lang").unwrap(), Some(json!("en")));

    store.set_in_bucket("lang", json!("fr"), "settings").unwrap();
    store.set("global-key", json!([1, 2])).unwrap();
    let report = store.flush().await.unwrap();
    assert!(report.is_clean());

    let settings = remote.bucket(&Bucket::named("settings"));
    assert_eq!(settings.get("lang").map(|e| e.value.clone()), Some(json!("fr")));
    assert!(remote.bucket(&Bucket::global()).contains_key("global-key"));
}

/// A store whose writes can be made to fail.
struct FlakyStore {
    inner: InMemoryStore,
    failing: Arc<AtomicBool>,
}

impl FlakyStore {
    fn check(&self) -> StorageResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StorageError::Corrupted("disk full".into()))
        } else {
            Ok(())
        }
    }
}

impl LocalStore for FlakyStore {
    fn put(
        &mut self,
        key: &str,
        value: Value,
        bucket: Bucket,
        timestamp: Option<i64>,
    ) -> StorageResult<Entry> {
        self.check()?;
        self.inner.put(key, value, bucket, timestamp)
    }

    fn get(&self, key: &str) -> StorageResult<Option<Entry>> {
        self.inner.get(key)
    }

    fn remove(&mut self, key: &str) -> StorageResult<Option<Entry>> {
        self.check()?;
        self.inner.remove(key)
    }

    fn all_entries(&self) -> StorageResult<Vec<Entry>> {
        self.inner.all_entries()
    }

    fn clear(&mut self) -> StorageResult<()> {
        self.check()?;
        self.inner.clear()
    }
}

#[tokio::test]
async fn local_failure_surfaces_and_schedules_nothing() {
    let remote = Arc::new(MemoryRemote::with_token(TOKEN));
    let failing = Arc::new(AtomicBool::new(false));
    let store = open_synced(
        config(),
        FlakyStore {
            inner: InMemoryStore::new(),
            failing: Arc::clone(&failing),
        },
        remote.connect(StaticCredential::new(TOKEN)),
    )
    .await;

    failing.store(true, Ordering::SeqCst);
    let err = store.set("k", json!(1)).unwrap_err();
    assert!(matches!(err, SyncError::LocalStorage(_)));
    assert!(err.is_local());
    assert!(store.pending_buckets().is_empty());
    assert!(store.get("k").unwrap().is_none());

    failing.store(false, Ordering::SeqCst);
    store.set("k", json!(1)).unwrap();
    eventually("push after recovery", || remote.push_count() == 1).await;
}
