//! Integration tests for live-cache
//!
//! These tests drive the public API end to end: loading and committing,
//! subscriptions, timer-driven eviction and refresh, retries and touch.
//! Timer tests run on a paused clock so they finish instantly.

use live_cache::key;
use live_cache::{
    BatchFnLoader, Cache, CacheMetrics, CacheStats, Error, FnLoader, Patch, Subscriber,
};
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn counting_subscriber() -> (Arc<AtomicUsize>, Subscriber) {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let sub = Subscriber::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    (hits, sub)
}

/// Loader that counts its calls and returns `key * 10`.
fn counting_loader(
    calls: Arc<AtomicUsize>,
) -> FnLoader<impl Fn(u64) -> futures::future::Ready<live_cache::Result<u64>> + Send + Sync> {
    FnLoader::new(move |num: u64| {
        calls.fetch_add(1, Ordering::SeqCst);
        futures::future::ready(Ok::<_, Error>(num * 10))
    })
}

/// Test 1: Divisor Scenario
///
/// The loader divides by a divisor that changes between touches:
/// - load(4) with divisor 2 → 2
/// - divisor 0, touch → error, no data
/// - divisor 4, touch → 1, error cleared
#[tokio::test]
async fn test_divisor_scenario() {
    init_logging();

    let divisor = Arc::new(AtomicU64::new(2));
    let source = divisor.clone();
    let cache: Cache<u64, u64> = Cache::builder(FnLoader::new(move |num: u64| {
        let by = source.load(Ordering::SeqCst);
        async move {
            if by == 0 {
                Err(Error::load("division by zero"))
            } else {
                Ok(num / by)
            }
        }
    }))
    .retry_count(0)
    .build()
    .expect("build");

    cache.load(4).await.apply();
    assert_eq!(cache.get(&4).and_then(|e| e.into_data()), Some(2));

    let (hits, sub) = counting_subscriber();
    cache.subscribe(&4, &sub).expect("subscribe");

    divisor.store(0, Ordering::SeqCst);
    cache.touch(|_| true).await;
    let entry = cache.get(&4).expect("entry survives a failed reload");
    assert!(entry.data().is_none());
    assert_eq!(
        entry.error(),
        Some(&Error::LoadFailure("division by zero".to_string()))
    );
    assert!(!entry.is_loading());

    divisor.store(4, Ordering::SeqCst);
    cache.touch(|_| true).await;
    let entry = cache.get(&4).expect("entry");
    assert_eq!(entry.data(), Some(&1));
    assert!(entry.error().is_none());

    // Each touch notifies twice: once when loading starts, once on commit.
    assert_eq!(hits.load(Ordering::SeqCst), 4);
}

/// Test 2: Eviction After Removal Timeout
#[tokio::test(start_paused = true)]
async fn test_unreferenced_entry_is_evicted() {
    init_logging();

    let calls = Arc::new(AtomicUsize::new(0));
    let cache = Cache::builder(counting_loader(calls.clone()))
        .removal_timeout(Duration::from_millis(100))
        .build()
        .expect("build");

    cache.refresh(1).await;
    assert!(cache.contains_key(&1));

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(cache.get(&1).is_none());
    assert_eq!(cache.stats(), CacheStats::default());
}

/// Test 3: Subscription Keeps Entry Alive
///
/// A subscriber arriving before the timeout cancels eviction; the timeout
/// restarts when the last subscriber leaves.
#[tokio::test(start_paused = true)]
async fn test_subscription_cancels_eviction() {
    init_logging();

    let calls = Arc::new(AtomicUsize::new(0));
    let cache = Cache::builder(counting_loader(calls.clone()))
        .removal_timeout(Duration::from_millis(100))
        .build()
        .expect("build");
    let (_, sub) = counting_subscriber();

    cache.refresh(1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    cache.subscribe(&1, &sub).expect("subscribe");
    assert_eq!(cache.stats().pending_evictions, 0);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(cache.contains_key(&1));

    cache.unsubscribe(&1, &sub).expect("unsubscribe");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(cache.contains_key(&1));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!cache.contains_key(&1));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// Test 4: Duplicate Subscribe
///
/// Subscribers are a set: subscribing twice notifies once and one
/// unsubscribe removes it.
#[tokio::test]
async fn test_duplicate_subscribe_notifies_once() {
    let cache: Cache<&'static str, u64> =
        Cache::new(FnLoader::new(|_: &'static str| async { Ok::<u64, Error>(0) })).expect("build");
    let (hits, sub) = counting_subscriber();

    cache.set("k", Patch::new().with_data(1));
    cache.subscribe(&"k", &sub).expect("subscribe");
    cache.subscribe(&"k", &sub.clone()).expect("subscribe again");
    assert_eq!(cache.get(&"k").map(|e| e.subscriber_count()), Some(1));

    cache.set("k", Patch::new().with_data(2));
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    cache.unsubscribe(&"k", &sub).expect("unsubscribe");
    assert_eq!(cache.get(&"k").map(|e| e.subscriber_count()), Some(0));
    assert_eq!(cache.stats().pending_evictions, 1);
}

/// Test 5: Subscribe On Missing Key
#[tokio::test]
async fn test_subscribe_missing_key_fails() {
    let cache: Cache<&'static str, u64> =
        Cache::new(FnLoader::new(|_: &'static str| async { Ok::<u64, Error>(0) })).expect("build");
    let (_, sub) = counting_subscriber();

    assert!(matches!(
        cache.subscribe(&"nope", &sub),
        Err(Error::MissingEntry(_))
    ));
    assert!(matches!(
        cache.unsubscribe(&"nope", &sub),
        Err(Error::MissingEntry(_))
    ));
    assert!(cache.is_empty());
}

/// Test 6: Retry Count And Delay
///
/// - retry_count 0: one attempt, delay never consulted
/// - retry_count 2: three attempts, delay consulted with attempts 0 and 1
#[tokio::test(start_paused = true)]
async fn test_retry_count_and_delay() {
    init_logging();

    for (retries, expected_calls, expected_delays) in [(0u32, 1usize, vec![]), (2, 3, vec![0u32, 1])] {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let delays: Arc<Mutex<Vec<u32>>> = Arc::default();
        let seen = delays.clone();

        let cache: Cache<u64, u64> = Cache::builder(FnLoader::new(move |_: u64| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<u64, _>(Error::load("unavailable")) }
        }))
        .retry_count(retries)
        .delay(move |attempt: u32, _error: &Error| {
            seen.lock().expect("poisoned").push(attempt);
            Duration::from_millis(10)
        })
        .build()
        .expect("build");

        cache.refresh(1).await;

        assert_eq!(calls.load(Ordering::SeqCst), expected_calls);
        assert_eq!(*delays.lock().expect("poisoned"), expected_delays);
        assert!(cache.get(&1).and_then(|e| e.error().cloned()).is_some());
    }
}

/// Test 7: In-Flight Marker Survives Retries
#[tokio::test(start_paused = true)]
async fn test_in_flight_visible_during_retries() {
    init_logging();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let cache: Cache<u64, u64> = Cache::builder(FnLoader::new(move |num: u64| {
        let call = counter.fetch_add(1, Ordering::SeqCst);
        async move {
            if call < 2 {
                Err(Error::load("flaky"))
            } else {
                Ok(num)
            }
        }
    }))
    .retry_count(2)
    .delay(|_: u32, _: &Error| Duration::from_millis(100))
    .build()
    .expect("build");

    let loading = {
        let cache = cache.clone();
        tokio::spawn(async move { cache.load(7).await })
    };

    tokio::time::sleep(Duration::from_millis(150)).await;
    let entry = cache.get(&7).expect("marked in flight");
    assert!(entry.is_loading());
    assert!(entry.data().is_none());
    assert!(entry.error().is_none());

    let settle = loading.await.expect("task");
    assert!(settle.is_ok());
    // Not visible until applied.
    assert!(cache.get(&7).expect("entry").is_loading());

    settle.apply();
    let entry = cache.get(&7).expect("entry");
    assert_eq!(entry.data(), Some(&7));
    assert!(!entry.is_loading());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

/// Test 8: Cache Life Refresh After Set
///
/// A plain `set` with a cache life configured triggers exactly one silent
/// reload per window, subscribers or not.
#[tokio::test(start_paused = true)]
async fn test_cache_life_refreshes_once_per_window() {
    init_logging();

    let calls = Arc::new(AtomicUsize::new(0));
    let cache = Cache::builder(counting_loader(calls.clone()))
        .cache_life(Duration::from_millis(1000))
        .removal_timeout(Duration::from_millis(10_500))
        .build()
        .expect("build");

    cache.set(7, Patch::new().with_data(7));

    tokio::time::sleep(Duration::from_millis(999)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    tokio::time::sleep(Duration::from_millis(2)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.get(&7).and_then(|e| e.into_data()), Some(70));

    // The reload's own commit re-armed the timer for the next window only.
    tokio::time::sleep(Duration::from_millis(997)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(3)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    // Refreshes do not extend the removal window of an unreferenced entry.
    tokio::time::sleep(Duration::from_millis(8_600)).await;
    assert!(!cache.contains_key(&7));
    assert_eq!(calls.load(Ordering::SeqCst), 10);
    assert_eq!(cache.stats(), CacheStats::default());

    tokio::time::sleep(Duration::from_millis(2_000)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 10);
}

/// Test 8b: Cache Life With Subscribers
///
/// A referenced entry keeps reloading and notifying; once released it is
/// still evicted after the removal timeout and the reloads stop.
#[tokio::test(start_paused = true)]
async fn test_cache_life_refreshes_referenced_entries() {
    init_logging();

    let calls = Arc::new(AtomicUsize::new(0));
    let cache = Cache::builder(counting_loader(calls.clone()))
        .cache_life(Duration::from_millis(100))
        .removal_timeout(Duration::from_millis(1_000))
        .build()
        .expect("build");
    let (hits, sub) = counting_subscriber();

    cache.refresh(1).await;
    cache.subscribe(&1, &sub).expect("subscribe");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(cache.get(&1).and_then(|e| e.into_data()), Some(10));
    // Two notifications per reload: loading started, then committed.
    assert_eq!(hits.load(Ordering::SeqCst), 4);

    cache.unsubscribe(&1, &sub).expect("unsubscribe");
    tokio::time::sleep(Duration::from_millis(1_100)).await;
    assert!(!cache.contains_key(&1));
    let settled = calls.load(Ordering::SeqCst);
    assert!(settled > 3);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(calls.load(Ordering::SeqCst), settled);
    assert_eq!(cache.stats(), CacheStats::default());
}

/// Test 9: Delete Leaves No Timers Behind
#[tokio::test(start_paused = true)]
async fn test_delete_twice_leaves_no_timers() {
    let calls = Arc::new(AtomicUsize::new(0));
    let cache = Cache::builder(counting_loader(calls.clone()))
        .cache_life(Duration::from_millis(100))
        .removal_timeout(Duration::from_millis(100))
        .build()
        .expect("build");

    cache.refresh(1).await;
    let stats = cache.stats();
    assert_eq!((stats.pending_evictions, stats.pending_refreshes), (1, 1));

    cache.delete(&1);
    cache.delete(&1);
    assert_eq!(cache.stats(), CacheStats::default());

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(cache.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// Test 10: Batch Loader Resolves Related Keys
///
/// Every pair of a batch result is committed and notified, including keys
/// nobody asked for.
#[tokio::test]
async fn test_batch_loader_commits_related_keys() {
    init_logging();

    let cache: Cache<String, String> = Cache::new(BatchFnLoader::new(|user: String| async move {
        Ok::<_, Error>(vec![
            (user.clone(), format!("profile of {user}")),
            ("org:7".to_string(), "acme".to_string()),
        ])
    }))
    .expect("build");
    let org = "org:7".to_string();
    let (hits, sub) = counting_subscriber();

    cache.set(org.clone(), Patch::new().with_data("stale".to_string()));
    cache.subscribe(&org, &sub).expect("subscribe");

    cache.refresh("user:1".to_string()).await;

    assert_eq!(
        cache.get(&"user:1".to_string()).and_then(|e| e.into_data()),
        Some("profile of user:1".to_string())
    );
    assert_eq!(
        cache.get(&org).and_then(|e| e.into_data()),
        Some("acme".to_string())
    );
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

/// Test 11: Batch Missing The Requested Key
#[tokio::test]
async fn test_batch_without_requested_key_fails() {
    let cache: Cache<String, String> = Cache::builder(BatchFnLoader::new(|_: String| async {
        Ok::<_, Error>(vec![("org:7".to_string(), "acme".to_string())])
    }))
    .retry_count(0)
    .build()
    .expect("build");

    let key = "user:1".to_string();
    cache.refresh(key.clone()).await;

    let entry = cache.get(&key).expect("entry");
    assert!(entry.error().map(|e| e.is_load_failure()).unwrap_or(false));
    assert!(!entry.is_loading());
    assert!(!cache.contains_key(&"org:7".to_string()));
}

struct FailureCount(Arc<AtomicUsize>);

impl CacheMetrics for FailureCount {
    fn record_notify_failure(&self, _key: &dyn Debug, _error: &Error) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Test 12: Panicking Subscriber
///
/// A callback that panics is reported and does not stop the others.
#[tokio::test]
async fn test_panicking_subscriber_does_not_block_others() {
    let failures = Arc::new(AtomicUsize::new(0));
    let cache: Cache<u64, u64> = Cache::builder(FnLoader::new(|n: u64| async move { Ok::<_, Error>(n) }))
        .metrics(Box::new(FailureCount(failures.clone())))
        .build()
        .expect("build");
    let broken = Subscriber::new(|| panic!("subscriber exploded"));
    let (hits, sub) = counting_subscriber();

    cache.set(1, Patch::new());
    cache.subscribe(&1, &broken).expect("subscribe");
    cache.subscribe(&1, &sub).expect("subscribe");

    cache.set(1, Patch::new().with_data(5));

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(failures.load(Ordering::SeqCst), 1);
    assert_eq!(cache.get(&1).and_then(|e| e.into_data()), Some(5));
}

/// Test 13: Touch By Key Substring
#[tokio::test]
async fn test_touch_by_key_substring() {
    init_logging();

    let loads: Arc<Mutex<Vec<String>>> = Arc::default();
    let seen = loads.clone();
    let cache: Cache<String, usize> = Cache::new(FnLoader::new(move |key: String| {
        seen.lock().expect("poisoned").push(key.clone());
        async move { Ok::<_, Error>(key.len()) }
    }))
    .expect("build");
    let (_, sub) = counting_subscriber();

    for name in ["user:1", "user:2", "org:1", "user:3"] {
        cache.refresh(name.to_string()).await;
    }
    for name in ["user:1", "user:2", "org:1"] {
        cache.subscribe(&name.to_string(), &sub).expect("subscribe");
    }
    loads.lock().expect("poisoned").clear();

    let report = cache.touch(key::contains::<String>("user")).await;

    assert_eq!(report.reloaded, 2);
    assert_eq!(report.evicted, 1);
    let mut reloaded = loads.lock().expect("poisoned").clone();
    reloaded.sort();
    assert_eq!(reloaded, vec!["user:1".to_string(), "user:2".to_string()]);
    assert!(!cache.contains_key(&"user:3".to_string()));
    assert!(cache.contains_key(&"org:1".to_string()));
}

/// Test 14: Concurrent Fetch Shares One Load
#[tokio::test(start_paused = true)]
async fn test_concurrent_fetch_shares_one_load() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let cache: Cache<u64, u64> = Cache::new(FnLoader::new(move |num: u64| {
        counter.fetch_add(1, Ordering::SeqCst);
        async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<_, Error>(num + 1)
        }
    }))
    .expect("build");

    let (first, second) = tokio::join!(cache.fetch(1), cache.fetch(1));

    assert_eq!(first, Ok(2));
    assert_eq!(second, Ok(2));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// Test 15: Configuration From JSON
#[tokio::test]
async fn test_builder_accepts_json_config() {
    let config = live_cache::CacheConfig::from_json(
        r#"{ "removal_timeout_ms": 250, "retry_count": 3, "cache_life_ms": 1000 }"#,
    )
    .expect("config");
    let cache: Cache<u64, u64> = Cache::builder(FnLoader::new(|n: u64| async move { Ok::<_, Error>(n) }))
        .config(config)
        .build()
        .expect("build");

    assert_eq!(cache.config().removal_timeout(), Duration::from_millis(250));
    assert_eq!(cache.config().retry_count, 3);
    assert_eq!(cache.config().cache_life(), Some(Duration::from_secs(1)));
}
