//! End-to-end behaviour of the query cache under a paused clock.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::{join_all, FutureExt};
use gympulse_cache::{
    CacheConfig, CacheError, CacheStore, FetchInterceptor, FetchOptions, LoadOutcome, QueryKey,
    RefetchPolicy, Resource, RetryPolicy,
};
use gympulse_test_utils::{EntityIdType, GymId, ScriptedLoader};

fn options() -> FetchOptions {
    FetchOptions::default()
        .with_stale_window(Duration::from_secs(10))
        .with_gc_window(Duration::from_secs(60))
        .with_retry(RetryPolicy::none())
}

fn members_key() -> QueryKey {
    QueryKey::scoped(GymId::now_v7(), Resource::Members)
}

#[tokio::test(start_paused = true)]
async fn concurrent_fetches_share_one_load() {
    let store = CacheStore::new(CacheConfig::default());
    let key = members_key();
    let loader = ScriptedLoader::returning(vec!["ana".to_string(), "bo".to_string()])
        .with_delay(Duration::from_millis(100));

    let reads = join_all((0..5).map(|_| store.fetch(&key, loader.loader(), options()))).await;

    assert_eq!(loader.calls(), 1);
    for read in &reads {
        let read = read.as_ref().unwrap();
        assert_eq!(read.value().len(), 2);
        assert!(read.was_cache_miss());
    }
    let stats = store.stats();
    assert_eq!(stats.loads, 1);
    assert_eq!(stats.coalesced, 4);
}

#[tokio::test(start_paused = true)]
async fn stale_entry_is_returned_immediately_and_revalidated() {
    let store = CacheStore::new(CacheConfig::default());
    let key = members_key();
    let loader = ScriptedLoader::returning("v2".to_string()).then_ok("v1".to_string());

    store.fetch(&key, loader.loader(), options()).await.unwrap();
    tokio::time::advance(Duration::from_secs(11)).await;

    // No await point: the stale value is available on the first poll.
    let read = store
        .fetch(&key, loader.loader(), options())
        .now_or_never()
        .expect("stale read must not wait for the loader")
        .unwrap();
    assert_eq!(read.value(), "v1");
    assert!(read.is_stale());
    assert!(read.is_fetching());

    tokio::time::sleep(Duration::from_millis(1)).await;
    let read = store.get::<String>(&key).unwrap().unwrap();
    assert_eq!(read.value(), "v2");
    assert!(!read.is_stale());
    assert_eq!(loader.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn failed_refetch_keeps_previous_value() {
    let store = CacheStore::new(CacheConfig::default());
    let key = members_key();
    let loader = ScriptedLoader::failing("backend down").then_ok(42u32);
    let retrying = options().with_retry(RetryPolicy::immediate(1));

    store.fetch(&key, loader.loader(), retrying.clone()).await.unwrap();
    let err = store.refetch::<u32, _, _, _>(&key, loader.loader(), retrying).await.unwrap_err();

    assert_eq!(
        err,
        CacheError::LoadFailed {
            key: key.to_string(),
            attempts: 2,
            message: "backend down".to_string(),
        }
    );
    assert_eq!(loader.calls(), 3);

    let read = store.get::<u32>(&key).unwrap().unwrap();
    assert_eq!(*read.value(), 42);
    assert!(read.last_error().is_some());
    let status = store.status(&key).unwrap();
    assert!(status.has_value);
    assert_eq!(status.error_count, 1);
    assert!(!status.is_failed_without_data());
}

#[tokio::test(start_paused = true)]
async fn failed_first_load_reports_error_and_allows_retry() {
    let store = CacheStore::new(CacheConfig::default());
    let key = members_key();
    let loader = ScriptedLoader::returning(7u32).then_err("timeout");

    let err = store.fetch(&key, loader.loader(), options()).await.unwrap_err();
    assert!(matches!(err, CacheError::LoadFailed { attempts: 1, .. }));
    assert!(store.status(&key).unwrap().is_failed_without_data());
    assert!(store.get::<u32>(&key).unwrap().is_none());

    let read = store.fetch(&key, loader.loader(), options()).await.unwrap();
    assert_eq!(*read.value(), 7);
    assert_eq!(store.stats().failures, 1);
}

#[tokio::test(start_paused = true)]
async fn abandoned_fetch_still_commits() {
    let store = CacheStore::new(CacheConfig::default());
    let key = members_key();
    let loader = ScriptedLoader::returning(5u8).with_delay(Duration::from_millis(100));

    let abandoned = tokio::time::timeout(
        Duration::from_millis(10),
        store.fetch(&key, loader.loader(), options()),
    )
    .await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(*store.get::<u8>(&key).unwrap().unwrap().value(), 5);
    assert_eq!(loader.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn removing_entry_cancels_waiters() {
    let store = CacheStore::new(CacheConfig::default());
    let key = members_key();
    let loader = ScriptedLoader::returning(1u8).with_delay(Duration::from_secs(1));

    let waiter = {
        let store = store.clone();
        let key = key.clone();
        let load = loader.loader();
        tokio::spawn(async move { store.fetch(&key, load, options()).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(store.remove(&key));
    let result = waiter.await.unwrap();
    assert!(matches!(result, Err(CacheError::LoadCancelled { .. })));
    assert!(store.get::<u8>(&key).unwrap().is_none());
}

#[derive(Default)]
struct RecordingInterceptor {
    finished: Mutex<Vec<(u32, LoadOutcome)>>,
}

impl FetchInterceptor for RecordingInterceptor {
    fn on_load_finish(&self, _key: &QueryKey, attempt: u32, _elapsed: Duration, outcome: LoadOutcome) {
        self.finished.lock().unwrap().push((attempt, outcome));
    }
}

#[tokio::test(start_paused = true)]
async fn interceptors_see_every_attempt() {
    let recorder = Arc::new(RecordingInterceptor::default());
    let store = CacheStore::with_interceptors(
        CacheConfig::default(),
        vec![recorder.clone() as Arc<dyn FetchInterceptor>],
    );
    let key = members_key();
    let loader = ScriptedLoader::returning(3u16).then_err("a").then_err("b");

    let read = store
        .fetch(&key, loader.loader(), options().with_retry(RetryPolicy::immediate(2)))
        .await
        .unwrap();

    assert_eq!(*read.value(), 3);
    assert_eq!(
        *recorder.finished.lock().unwrap(),
        vec![
            (1, LoadOutcome::Failure),
            (2, LoadOutcome::Failure),
            (3, LoadOutcome::Success),
        ]
    );
    assert_eq!(store.stats().retries, 2);
}

#[tokio::test(start_paused = true)]
async fn backoff_delays_the_retry() {
    let store = CacheStore::new(CacheConfig::default());
    let key = members_key();
    let loader = ScriptedLoader::returning(9u32).then_err("flaky");
    let started = tokio::time::Instant::now();

    let read = store
        .fetch(&key, loader.loader(), options().with_retry(RetryPolicy::default()))
        .await
        .unwrap();

    assert_eq!(*read.value(), 9);
    assert!(started.elapsed() >= Duration::from_secs(1));
    assert_eq!(loader.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn clear_drops_every_gym() {
    let store = CacheStore::new(CacheConfig::default());
    let first = QueryKey::scoped(GymId::now_v7(), Resource::Expenses).with_param("year", 2024);
    let second = QueryKey::scoped(GymId::now_v7(), Resource::Payments);
    store.seed(&first, 1u8, &options());
    store.seed(&second, 2u8, &options());

    assert_eq!(store.clear(), 2);
    assert!(store.is_empty());
    assert_eq!(store.stats().entry_count, 0);
}

#[tokio::test(start_paused = true)]
async fn stale_observer_does_not_release_a_recreated_entry() {
    let store = CacheStore::new(CacheConfig::default());
    let key = members_key();
    store.seed(&key, 1u8, &options());
    let first = store.observe(&key);

    assert!(store.remove(&key));
    store.seed(&key, 2u8, &options());
    let second = store.observe(&key);

    // Dropping the guard of the removed entry leaves the new one observed.
    drop(first);
    assert_eq!(store.status(&key).unwrap().observers, 1);
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(store.evict_expired(), 0);
    assert_eq!(*store.get::<u8>(&key).unwrap().unwrap().value(), 2);

    drop(second);
    assert_eq!(store.status(&key).unwrap().observers, 0);
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(store.evict_expired(), 1);
}

#[tokio::test(start_paused = true)]
async fn observers_from_before_clear_are_ignored() {
    let store = CacheStore::new(CacheConfig::default());
    let key = members_key();
    store.seed(&key, 1u8, &options());
    let before_clear = store.observe(&key);

    store.clear();
    store.seed(&key, 2u8, &options());
    let _after_clear = store.observe(&key);
    drop(before_clear);

    assert_eq!(store.status(&key).unwrap().observers, 1);
}

#[tokio::test(start_paused = true)]
async fn mount_refetches_stale_entry_when_enabled() {
    let policy = RefetchPolicy {
        on_mount: true,
        ..RefetchPolicy::default()
    };
    let store = CacheStore::new(CacheConfig::default().with_policy(policy));
    let key = members_key();
    let loader = ScriptedLoader::returning(3u32);
    store.fetch(&key, loader.loader(), options()).await.unwrap();

    // Fresh entries are not reloaded on mount.
    let _fresh = store.observe(&key);
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(loader.calls(), 1);

    tokio::time::sleep(Duration::from_secs(11)).await;
    let _stale = store.observe(&key);
    assert!(store.status(&key).unwrap().is_fetching);
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(loader.calls(), 2);
    assert!(!store.status(&key).unwrap().is_stale);
}

#[tokio::test(start_paused = true)]
async fn mount_leaves_stale_entry_alone_by_default() {
    let store = CacheStore::new(CacheConfig::default());
    let key = members_key();
    let loader = ScriptedLoader::returning(3u32);
    store.fetch(&key, loader.loader(), options()).await.unwrap();

    tokio::time::sleep(Duration::from_secs(11)).await;
    let _observer = store.observe(&key);
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(loader.calls(), 1);
    assert!(store.status(&key).unwrap().is_stale);
}

#[tokio::test(start_paused = true)]
async fn focus_refetches_only_observed_stale_entries_when_enabled() {
    let policy = RefetchPolicy {
        on_window_focus: true,
        ..RefetchPolicy::default()
    };
    let store = CacheStore::new(CacheConfig::default().with_policy(policy));
    let gym_id = GymId::now_v7();
    let watched = QueryKey::scoped(gym_id, Resource::Members);
    let unwatched = QueryKey::scoped(gym_id, Resource::Payments);
    let watched_loader = ScriptedLoader::returning(1u32);
    let unwatched_loader = ScriptedLoader::returning(2u32);
    store.fetch(&watched, watched_loader.loader(), options()).await.unwrap();
    store.fetch(&unwatched, unwatched_loader.loader(), options()).await.unwrap();
    let _observer = store.observe(&watched);

    assert_eq!(store.on_window_focus(), 0);

    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(store.on_window_focus(), 1);
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(watched_loader.calls(), 2);
    assert_eq!(unwatched_loader.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn invalidating_one_key_leaves_its_neighbours_fresh() {
    let store = CacheStore::new(CacheConfig::default());
    let gym_id = GymId::now_v7();
    let members = QueryKey::scoped(gym_id, Resource::Members);
    let payments = QueryKey::scoped(gym_id, Resource::Payments);
    let loader = ScriptedLoader::returning(vec!["bo".to_string()]).then_ok(vec!["ana".to_string()]);
    store.fetch(&members, loader.loader(), options()).await.unwrap();
    store.seed(&payments, 5u32, &options());

    assert!(store.invalidate(&members));
    assert!(store.status(&members).unwrap().is_stale);
    assert!(!store.status(&payments).unwrap().is_stale);
    assert!(!store.invalidate(&QueryKey::scoped(gym_id, Resource::Expenses)));

    // The next read serves the old rows and revalidates once.
    let read = store.fetch(&members, loader.loader(), options()).await.unwrap();
    assert_eq!(read.value(), &vec!["ana".to_string()]);
    assert!(read.is_stale());
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(loader.calls(), 2);
    let read = store.get::<Vec<String>>(&members).unwrap().unwrap();
    assert_eq!(read.value(), &vec!["bo".to_string()]);
}
