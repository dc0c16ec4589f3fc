//! Coordinator scenarios: explicit refresh, live views, staleness and
//! failure isolation.

use crossbeam_channel::{bounded, Receiver};
use repo_cache::table::TABLE_FILE_NAME;
use repo_cache::{
    BusConfig, CoordinatorConfig, FetchError, NeverStale, Record, RecordSet, RecordStore,
    RefreshOutcome, RemoteFetcher, StoreConfig, SyncCoordinator, SyncError,
};
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const WAIT: Duration = Duration::from_secs(5);

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn test_store(dir: &TempDir) -> Arc<RecordStore> {
    Arc::new(
        RecordStore::create(StoreConfig {
            path: dir.path().join("store"),
            create_if_missing: true,
            sync_writes: false,
        })
        .unwrap(),
    )
}

fn repo(id: &str) -> Record {
    Record::new(id, format!("r{}", id), format!("alice/r{}", id), "alice")
}

/// Fetcher returning a fixed answer and counting calls.
struct ScriptedFetcher {
    answer: Result<RecordSet, FetchError>,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    fn ok(records: RecordSet) -> Arc<Self> {
        Arc::new(Self {
            answer: Ok(records),
            calls: AtomicUsize::new(0),
        })
    }

    fn failing(error: FetchError) -> Arc<Self> {
        Arc::new(Self {
            answer: Err(error),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RemoteFetcher for ScriptedFetcher {
    fn fetch(&self, _owner: &str) -> Result<RecordSet, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer.clone()
    }
}

/// Fetcher that blocks until released through the returned sender.
fn gated_fetcher(records: RecordSet) -> (Arc<dyn RemoteFetcher>, crossbeam_channel::Sender<()>) {
    let (release, gate): (_, Receiver<()>) = bounded(1);
    let fetcher = move |_owner: &str| -> Result<RecordSet, FetchError> {
        gate.recv_timeout(WAIT)
            .map_err(|_| FetchError::Network("gate never opened".into()))?;
        Ok(records.clone())
    };
    let fetcher: Arc<dyn RemoteFetcher> = Arc::new(fetcher);
    (fetcher, release)
}

fn coordinator(store: Arc<RecordStore>, fetcher: Arc<dyn RemoteFetcher>) -> SyncCoordinator {
    SyncCoordinator::new(store, fetcher, CoordinatorConfig::default()).unwrap()
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

// --- Explicit Refresh ---

#[test]
fn test_refresh_fills_empty_store() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let fetcher = ScriptedFetcher::ok(vec![repo("1")]);
    let coordinator = coordinator(Arc::clone(&store), fetcher.clone());

    let outcome = coordinator.refresh_now("alice").wait();

    assert_eq!(outcome, RefreshOutcome::Completed("alice".to_string()));
    assert_eq!(store.scan_all().unwrap(), vec![repo("1")]);
    assert_eq!(fetcher.calls(), 1);
}

#[test]
fn test_refresh_replaces_previous_contents() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    store.replace_all(vec![repo("1"), repo("2")]).unwrap();
    let coordinator = coordinator(Arc::clone(&store), ScriptedFetcher::ok(vec![repo("3")]));

    assert!(coordinator.refresh_now("alice").wait().is_completed());
    assert_eq!(store.scan_all().unwrap(), vec![repo("3")]);
}

#[test]
fn test_refresh_network_failure_leaves_store() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    store.replace_all(vec![repo("1")]).unwrap();
    let handle = store.subscribe(BusConfig::default());
    let coordinator = coordinator(
        Arc::clone(&store),
        ScriptedFetcher::failing(FetchError::Network("timed out".into())),
    );

    let outcome = coordinator.refresh_now("alice").wait();

    assert_eq!(
        outcome,
        RefreshOutcome::Failed(SyncError::Network("timed out".into()))
    );
    assert_eq!(store.scan_all().unwrap(), vec![repo("1")]);
    assert!(handle.recv_timeout(Duration::from_millis(50)).is_err());
}

#[test]
fn test_refresh_parse_failure_is_reported() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let fetcher = move |_owner: &str| repo_cache::parse_records(br#"{"message": "Not Found"}"#);
    let coordinator = coordinator(Arc::clone(&store), Arc::new(fetcher));

    let outcome = coordinator.refresh_now("alice").wait();

    assert!(outcome.error().map(SyncError::is_parse).unwrap_or(false));
    assert!(store.scan_all().unwrap().is_empty());
}

#[test]
fn test_refresh_storage_failure_is_reported() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    store.replace_all(vec![repo("1")]).unwrap();
    fs::create_dir(store.path().join(format!("{}.tmp", TABLE_FILE_NAME))).unwrap();
    let coordinator = coordinator(Arc::clone(&store), ScriptedFetcher::ok(vec![repo("2")]));

    let outcome = coordinator.refresh_now("alice").wait();

    assert!(outcome.error().map(SyncError::is_storage).unwrap_or(false));
    // The store error reaches the caller as its rendered message.
    assert!(matches!(
        outcome,
        RefreshOutcome::Failed(SyncError::Storage(ref msg)) if msg.starts_with("IO error")
    ));
    assert_eq!(store.scan_all().unwrap(), vec![repo("1")]);
}

#[test]
fn test_refresh_handle_polling() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let (fetcher, release) = gated_fetcher(vec![repo("1")]);
    let coordinator = coordinator(Arc::clone(&store), fetcher);

    let handle = coordinator.refresh_now("alice");
    assert_eq!(handle.owner(), "alice");
    assert!(handle.try_outcome().is_none());
    assert!(handle.wait_timeout(Duration::from_millis(20)).is_none());

    release.send(()).unwrap();
    let outcome = handle.wait_timeout(WAIT).unwrap();
    assert!(outcome.is_completed());
}

#[test]
fn test_refresh_if_stale_respects_policy() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let fetcher = ScriptedFetcher::ok(vec![repo("1")]);
    let coordinator = coordinator(Arc::clone(&store), fetcher.clone())
        .with_staleness(|owner: &str| owner == "alice");

    assert!(coordinator.refresh_if_stale("bob").is_none());
    let handle = coordinator.refresh_if_stale("alice").unwrap();
    assert!(handle.wait().is_completed());
    assert_eq!(fetcher.calls(), 1);
}

// --- Live Views ---

#[test]
fn test_live_view_starts_with_current_contents_when_fresh() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    store.replace_all(vec![repo("1")]).unwrap();
    let fetcher = ScriptedFetcher::ok(vec![repo("9")]);
    let coordinator =
        coordinator(Arc::clone(&store), fetcher.clone()).with_staleness(NeverStale);

    let mut view = coordinator.subscribe_live_view("alice");

    assert_eq!(view.owner(), "alice");
    assert_eq!(view.recv_timeout(WAIT).unwrap(), vec![repo("1")]);
    assert!(view.recv_timeout(Duration::from_millis(50)).is_err());
    assert_eq!(fetcher.calls(), 0);
}

#[test]
fn test_live_view_on_unreadable_store_starts_empty() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    store.replace_all(vec![repo("1")]).unwrap();
    fs::write(store.path().join(TABLE_FILE_NAME), b"garbage").unwrap();
    assert!(store.scan_all().is_err());
    let coordinator =
        coordinator(Arc::clone(&store), ScriptedFetcher::ok(vec![])).with_staleness(NeverStale);

    let mut view = coordinator.subscribe_live_view("alice");
    assert_eq!(view.recv_timeout(WAIT).unwrap(), RecordSet::new());

    // The view keeps following the store once it is writable again.
    store.clear().unwrap();
    assert_eq!(view.recv_timeout(WAIT).unwrap(), RecordSet::new());
    assert!(!view.is_cancelled());
}

#[test]
fn test_live_view_hides_refresh_failure() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    store.replace_all(vec![repo("1")]).unwrap();
    let fetcher = ScriptedFetcher::failing(FetchError::Network("unreachable".into()));
    let coordinator = coordinator(Arc::clone(&store), fetcher.clone());

    let mut view = coordinator.subscribe_live_view("alice");
    let direct = coordinator.refresh_now("alice");

    assert_eq!(view.recv_timeout(WAIT).unwrap(), vec![repo("1")]);
    assert_eq!(
        direct.wait(),
        RefreshOutcome::Failed(SyncError::Network("unreachable".into()))
    );
    assert!(wait_until(|| fetcher.calls() == 2));

    // Nothing but store snapshots ever reaches the view.
    assert!(view.recv_timeout(Duration::from_millis(50)).is_err());
    assert!(!view.is_cancelled());
}

#[test]
fn test_stale_live_view_delivers_refreshed_contents() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    store.replace_all(vec![repo("1")]).unwrap();
    let (fetcher, release) = gated_fetcher(vec![repo("1"), repo("2")]);
    let coordinator = coordinator(Arc::clone(&store), fetcher);

    let mut view = coordinator.subscribe_live_view("alice");
    assert_eq!(view.recv_timeout(WAIT).unwrap(), vec![repo("1")]);

    release.send(()).unwrap();
    assert_eq!(view.recv_timeout(WAIT).unwrap(), vec![repo("1"), repo("2")]);
}

#[test]
fn test_live_view_forwards_every_mutation() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let coordinator =
        coordinator(Arc::clone(&store), ScriptedFetcher::ok(vec![])).with_staleness(NeverStale);

    let mut view = coordinator.subscribe_live_view("alice");
    assert!(view.recv_timeout(WAIT).unwrap().is_empty());

    store.replace_all(vec![repo("1")]).unwrap();
    store.insert_one(repo("2")).unwrap();
    store.clear().unwrap();

    assert_eq!(view.recv_timeout(WAIT).unwrap(), vec![repo("1")]);
    assert_eq!(view.recv_timeout(WAIT).unwrap(), vec![repo("1"), repo("2")]);
    assert!(view.recv_timeout(WAIT).unwrap().is_empty());
}

#[test]
fn test_many_live_views_see_same_updates() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let coordinator =
        coordinator(Arc::clone(&store), ScriptedFetcher::ok(vec![])).with_staleness(NeverStale);

    let mut views: Vec<_> = (0..5)
        .map(|_| coordinator.subscribe_live_view("alice"))
        .collect();
    store.insert_one(repo("1")).unwrap();

    for view in views.iter_mut() {
        assert!(view.recv_timeout(WAIT).unwrap().is_empty());
        assert_eq!(view.recv_timeout(WAIT).unwrap(), vec![repo("1")]);
    }
}

#[test]
fn test_cancel_is_idempotent_and_releases_slot() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let coordinator =
        coordinator(Arc::clone(&store), ScriptedFetcher::ok(vec![])).with_staleness(NeverStale);

    let mut view = coordinator.subscribe_live_view("alice");
    let other = coordinator.subscribe_live_view("alice");
    assert_eq!(store.bus().subscriber_count(), 2);

    view.cancel();
    view.cancel();
    view.canceller().cancel();

    assert!(view.is_cancelled());
    assert_eq!(store.bus().subscriber_count(), 1);
    assert!(view.recv().is_none());
    assert!(view.next().is_none());

    drop(other);
    assert_eq!(store.bus().subscriber_count(), 0);
}

#[test]
fn test_cancel_wakes_blocked_consumer() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let coordinator =
        coordinator(Arc::clone(&store), ScriptedFetcher::ok(vec![])).with_staleness(NeverStale);

    let mut view = coordinator.subscribe_live_view("alice");
    let canceller = view.canceller();
    let (got_first, first) = bounded(1);

    let consumer = std::thread::spawn(move || {
        got_first.send(view.recv().is_some()).unwrap();
        let mut later = 0;
        while view.recv().is_some() {
            later += 1;
        }
        later
    });

    assert!(first.recv_timeout(WAIT).unwrap());
    std::thread::sleep(Duration::from_millis(20));
    canceller.cancel();

    // Nothing after the initial snapshot; the blocked recv returned.
    assert_eq!(consumer.join().unwrap(), 0);
}

#[test]
fn test_cancel_does_not_abort_started_refresh() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let (fetcher, release) = gated_fetcher(vec![repo("7")]);
    let coordinator = coordinator(Arc::clone(&store), fetcher);

    let watcher = store.subscribe(BusConfig::default());
    let view = coordinator.subscribe_live_view("alice");
    view.cancel();
    drop(view);

    release.send(()).unwrap();

    assert_eq!(watcher.recv_timeout(WAIT).unwrap(), vec![repo("7")]);
    assert_eq!(store.scan_all().unwrap(), vec![repo("7")]);
}

#[test]
fn test_live_view_as_iterator() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    store.replace_all(vec![repo("1")]).unwrap();
    let coordinator =
        coordinator(Arc::clone(&store), ScriptedFetcher::ok(vec![])).with_staleness(NeverStale);

    let view = coordinator.subscribe_live_view("alice");
    store.insert_one(repo("2")).unwrap();

    let seen: Vec<RecordSet> = view.take(2).collect();
    assert_eq!(seen, vec![vec![repo("1")], vec![repo("1"), repo("2")]]);
}

#[test]
fn test_coordinator_drop_finishes_queued_refresh() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let (fetcher, release) = gated_fetcher(vec![repo("5")]);

    let handle = {
        let coordinator = coordinator(Arc::clone(&store), fetcher);
        let handle = coordinator.refresh_now("alice");
        release.send(()).unwrap();
        handle
    };

    assert!(handle.wait().is_completed());
    assert_eq!(store.scan_all().unwrap(), vec![repo("5")]);
}
