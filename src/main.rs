//! loadcache demo
//!
//! Shows concurrent misses collapsing into a single load, capacity eviction
//! and the resulting statistics.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use loadcache::{Cache, CacheBuilder, Config};

/// Demo sequence:
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Build a cache whose loader simulates a slow upstream
/// 4. Fire concurrent reads for one missing key
/// 5. Overfill the cache to trigger eviction
/// 6. Print statistics as JSON
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "loadcache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    info!(
        "Configuration loaded: capacity={}, default_ttl={}s, policy={}, readers={}",
        config.capacity, config.default_ttl, config.policy, config.demo_readers
    );

    let loader_calls = Arc::new(AtomicUsize::new(0));
    let latency = Duration::from_millis(config.demo_loader_latency_ms);

    let cache: Cache<String, String> = CacheBuilder::from_config(&config)
        .loader({
            let loader_calls = Arc::clone(&loader_calls);
            move |key: &String| {
                loader_calls.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(latency);
                Ok(format!("value-for-{key}"))
            }
        })
        .on_evicted(|key: &String, _: &String| debug!(%key, "evicted"))
        .build();

    let key = "hot-key".to_string();
    let readers: Vec<_> = (0..config.demo_readers)
        .map(|_| {
            let cache = cache.clone();
            let key = key.clone();
            tokio::task::spawn_blocking(move || cache.get(&key))
        })
        .collect();

    for reader in readers {
        let value = reader.await.context("reader task panicked")??;
        debug!(%value, "reader finished");
    }
    info!(
        readers = config.demo_readers,
        loader_calls = loader_calls.load(Ordering::SeqCst),
        "concurrent misses served"
    );

    let overflow = config.capacity.max(1) + 10;
    for i in 0..overflow {
        cache.set(format!("filler-{i}"), i.to_string())?;
    }
    info!(
        inserted = overflow,
        len = cache.len(),
        still_cached = cache.contains(&key),
        "capacity pressure applied"
    );

    println!("{}", serde_json::to_string_pretty(&cache.stats())?);
    Ok(())
}
