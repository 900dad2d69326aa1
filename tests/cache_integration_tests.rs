//! Integration Tests for the Cache
//!
//! Exercises concurrent loading through the public API.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use loadcache::cache::FakeClock;
use loadcache::{Cache, CacheBuilder, CacheError, EvictionPolicy};

// == Helper Functions ==

fn counting_cache(
    policy: EvictionPolicy,
    latency: Duration,
) -> (Cache<String, String>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let cache = CacheBuilder::new(64)
        .policy(policy)
        .loader(move |key: &String| {
            counter.fetch_add(1, Ordering::SeqCst);
            thread::sleep(latency);
            Ok(format!("loaded-{key}"))
        })
        .build();
    (cache, calls)
}

fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met within 5s");
        thread::sleep(Duration::from_millis(5));
    }
}

// == Load Deduplication ==

#[test]
fn test_concurrent_gets_load_once() {
    for policy in [EvictionPolicy::Lru, EvictionPolicy::Simple] {
        let (cache, calls) = counting_cache(policy, Duration::from_millis(150));
        let readers = 16;
        let start = Arc::new(Barrier::new(readers));

        let handles: Vec<_> = (0..readers)
            .map(|_| {
                let cache = cache.clone();
                let start = Arc::clone(&start);
                thread::spawn(move || {
                    start.wait();
                    cache.get(&"shared".to_string())
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap(), "loaded-shared");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1, "{policy}: loader ran more than once");
        assert!(cache.contains(&"shared".to_string()));
    }
}

#[test]
fn test_distinct_keys_load_independently() {
    let (cache, calls) = counting_cache(EvictionPolicy::Lru, Duration::from_millis(20));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let cache = cache.clone();
            thread::spawn(move || cache.get(&format!("key-{i}")))
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(cache.len(), 4);
}

#[test]
fn test_waiters_share_the_same_error() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let cache: Cache<String, String> = CacheBuilder::new(8)
        .loader(move |_: &String| {
            counter.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(150));
            Err("upstream unavailable".into())
        })
        .build();

    let readers = 6;
    let start = Arc::new(Barrier::new(readers));
    let handles: Vec<_> = (0..readers)
        .map(|_| {
            let cache = cache.clone();
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                cache.get(&"k".to_string())
            })
        })
        .collect();

    let sources: Vec<_> = handles
        .into_iter()
        .map(|handle| match handle.join().unwrap() {
            Err(CacheError::LoadFailed(source)) => source,
            other => panic!("expected a load failure, got {other:?}"),
        })
        .collect();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    for source in &sources[1..] {
        assert!(Arc::ptr_eq(&sources[0], source), "waiters saw different errors");
    }
    assert!(cache.is_empty());

    // No retry inside the cache; the next read starts a new load.
    assert!(cache.get(&"k".to_string()).is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_panicking_loader_releases_waiters() {
    let entered = Arc::new(Barrier::new(2));
    let release = Arc::new(AtomicBool::new(false));
    let first_call = Arc::new(AtomicBool::new(true));
    let cache: Cache<String, String> = CacheBuilder::new(8)
        .loader({
            let (entered, release) = (Arc::clone(&entered), Arc::clone(&release));
            move |key: &String| {
                if first_call.swap(false, Ordering::SeqCst) {
                    entered.wait();
                    wait_until(|| release.load(Ordering::SeqCst));
                    panic!("loader exploded");
                }
                Ok(key.clone())
            }
        })
        .build();
    let key = "boom".to_string();

    let leader = {
        let (cache, key) = (cache.clone(), key.clone());
        thread::spawn(move || cache.get(&key))
    };
    entered.wait();

    let waiter = {
        let (cache, key) = (cache.clone(), key.clone());
        thread::spawn(move || cache.get(&key))
    };
    wait_until(|| cache.load_waiters(&key) == 1);
    release.store(true, Ordering::SeqCst);

    assert!(leader.join().is_err(), "leader should have panicked");
    assert!(matches!(waiter.join().unwrap(), Err(CacheError::LoadAborted)));
    assert_eq!(cache.loads_in_flight(), 0);

    // The aborted record is gone; the next read loads normally.
    assert_eq!(cache.get(&key).unwrap(), "boom");
}

// == Non-blocking Reads ==

#[test]
fn test_get_if_present_never_blocks() {
    let (cache, calls) = counting_cache(EvictionPolicy::Lru, Duration::from_millis(500));
    let key = "slow".to_string();

    let started = Instant::now();
    let result = cache.get_if_present(&key);
    assert!(matches!(result, Err(CacheError::KeyNotFound)));
    assert!(started.elapsed() < Duration::from_millis(250), "non-blocking read blocked");

    // A second probe while the load is running also returns at once.
    let started = Instant::now();
    assert!(matches!(cache.get_if_present(&key), Err(CacheError::KeyNotFound)));
    assert!(started.elapsed() < Duration::from_millis(250));

    wait_until(|| cache.contains(&key));
    assert_eq!(cache.get_if_present(&key).unwrap(), "loaded-slow");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_blocking_get_joins_background_load() {
    let (cache, calls) = counting_cache(EvictionPolicy::Simple, Duration::from_millis(200));
    let key = "refresh".to_string();

    assert!(cache.get_if_present(&key).is_err());
    assert_eq!(cache.get(&key).unwrap(), "loaded-refresh");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_background_loads_are_bounded() {
    let clock = Arc::new(FakeClock::at(0));
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let calls = Arc::new(AtomicUsize::new(0));
    let cache: Cache<String, String> = CacheBuilder::new(0)
        .clock(clock.clone())
        .background_loaders(3)
        .loader({
            let (active, peak, calls) = (Arc::clone(&active), Arc::clone(&peak), Arc::clone(&calls));
            move |key: &String| {
                let running = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(running, Ordering::SeqCst);
                calls.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(20));
                active.fetch_sub(1, Ordering::SeqCst);
                Ok(format!("reloaded-{key}"))
            }
        })
        .build();

    let keys: Vec<String> = (0..60).map(|i| format!("key-{i}")).collect();
    for key in &keys {
        cache
            .set_with_expire(key.clone(), "stale".to_string(), Duration::from_millis(1))
            .unwrap();
    }
    clock.advance(Duration::from_millis(1));

    let started = Instant::now();
    assert!(cache.get_all().is_empty());
    assert!(started.elapsed() < Duration::from_millis(250), "get_all waited on loads");

    wait_until(|| keys.iter().all(|key| cache.contains(key)));
    assert_eq!(calls.load(Ordering::SeqCst), keys.len());
    assert!(
        peak.load(Ordering::SeqCst) <= 3,
        "peak of {} concurrent background loads",
        peak.load(Ordering::SeqCst)
    );
    assert_eq!(cache.get(&keys[0]).unwrap(), "reloaded-key-0");
}

#[test]
fn test_get_without_loader_is_terminal() {
    let cache: Cache<String, String> = CacheBuilder::new(8).build();

    assert!(matches!(cache.get(&"x".to_string()), Err(CacheError::KeyNotFound)));
    assert!(matches!(
        cache.get_if_present(&"x".to_string()),
        Err(CacheError::KeyNotFound)
    ));
}

// == Expiration and Loading ==

#[test]
fn test_expired_entry_is_reloaded() {
    let clock = Arc::new(FakeClock::at(0));
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let cache: Cache<String, usize> = CacheBuilder::new(8)
        .clock(clock.clone())
        .expiration(Duration::from_secs(30))
        .loader(move |_: &String| Ok(counter.fetch_add(1, Ordering::SeqCst) + 1))
        .build();
    let key = "k".to_string();

    assert_eq!(cache.get(&key).unwrap(), 1);
    clock.advance(Duration::from_secs(29));
    assert_eq!(cache.get(&key).unwrap(), 1);
    clock.advance(Duration::from_secs(1));
    assert_eq!(cache.get(&key).unwrap(), 2);
}

// == Async Callers ==

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_async_callers_share_one_load() {
    let (cache, calls) = counting_cache(EvictionPolicy::Lru, Duration::from_millis(100));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let cache = cache.clone();
            tokio::task::spawn_blocking(move || cache.get(&"async".to_string()))
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), "loaded-async");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
