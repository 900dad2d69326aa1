//! Load Group
//!
//! One in-flight record per key being fetched. The first caller for a key
//! becomes the executor and runs the fetch; later callers either wait for
//! its result or, in non-blocking mode, return immediately. Loads started
//! by non-blocking callers run on the group's bounded [`LoaderPool`].

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::error::{CacheError, Result};
use crate::load::pool::{LoaderPool, DEFAULT_BACKGROUND_LOADERS, DEFAULT_BACKGROUND_QUEUE};

type Calls<K, V> = Arc<Mutex<HashMap<K, Arc<InFlight<V>>>>>;

/// Value produced by [`LoadGroup::load`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOutcome<V> {
    pub value: V,
    /// True only for the caller that ran the fetch
    pub fresh: bool,
}

struct CallState<V> {
    /// Callers parked in `wait`; non-blocking callers never attach
    blocked: usize,
    result: Option<Result<V>>,
}

struct InFlight<V> {
    state: Mutex<CallState<V>>,
    done: Condvar,
}

impl<V: Clone> InFlight<V> {
    fn new() -> Self {
        Self {
            state: Mutex::new(CallState {
                blocked: 0,
                result: None,
            }),
            done: Condvar::new(),
        }
    }

    fn wait(&self) -> Result<V> {
        let mut state = self.state.lock();
        state.blocked += 1;
        loop {
            if let Some(result) = state.result.clone() {
                state.blocked -= 1;
                return result;
            }
            self.done.wait(&mut state);
        }
    }

    fn publish(&self, result: Result<V>) {
        self.state.lock().result = Some(result);
        self.done.notify_all();
    }
}

// == Completion Guard ==
/// Owned by the executor. Publishing the result, or dropping the guard
/// without one, removes the record and releases every waiter.
struct Completion<K: Eq + Hash, V: Clone> {
    calls: Calls<K, V>,
    key: K,
    call: Arc<InFlight<V>>,
    published: bool,
}

impl<K: Eq + Hash, V: Clone> Completion<K, V> {
    fn run<F>(mut self, fetch: F) -> Result<V>
    where
        F: FnOnce(&K) -> Result<V>,
    {
        debug!("load started");
        let result = fetch(&self.key);
        if let Err(err) = &result {
            warn!(error = %err, "load failed");
        }
        self.finish(result.clone());
        result
    }

    fn finish(&mut self, result: Result<V>) {
        {
            let mut calls = self.calls.lock();
            if calls
                .get(&self.key)
                .is_some_and(|current| Arc::ptr_eq(current, &self.call))
            {
                calls.remove(&self.key);
            }
        }
        self.call.publish(result);
        self.published = true;
    }
}

impl<K: Eq + Hash, V: Clone> Drop for Completion<K, V> {
    fn drop(&mut self) {
        if !self.published {
            warn!("load aborted; releasing waiters");
            self.finish(Err(CacheError::LoadAborted));
        }
    }
}

// == Load Group ==
/// Deduplicates concurrent loads per key.
pub struct LoadGroup<K, V> {
    calls: Calls<K, V>,
    pool: LoaderPool,
}

impl<K, V> LoadGroup<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self::with_background(DEFAULT_BACKGROUND_LOADERS, DEFAULT_BACKGROUND_QUEUE)
    }

    /// Runs non-blocking loads on at most `workers` threads, with up to
    /// `queue` loads waiting for a free worker.
    pub fn with_background(workers: usize, queue: usize) -> Self {
        Self {
            calls: Arc::new(Mutex::new(HashMap::new())),
            pool: LoaderPool::new(workers, queue),
        }
    }

    /// Loads `key`, running `fetch` at most once across concurrent callers.
    ///
    /// `recheck` runs first while the record table is locked; a `Some` value
    /// is returned as is without fetching. If another caller already owns
    /// the load, `wait = true` blocks for its result and `wait = false`
    /// returns `KeyNotFound` immediately. Otherwise this caller starts the
    /// fetch: inline when waiting, queued on the loader pool when not (the
    /// caller then gets `KeyNotFound`). A load the pool turns away is
    /// dropped, which releases its record.
    pub fn load<P, F>(&self, key: K, recheck: P, fetch: F, wait: bool) -> Result<LoadOutcome<V>>
    where
        P: FnOnce(&K) -> Option<V>,
        F: FnOnce(&K) -> Result<V> + Send + 'static,
    {
        let mut calls = self.calls.lock();

        if let Some(value) = recheck(&key) {
            return Ok(LoadOutcome {
                value,
                fresh: false,
            });
        }

        if let Some(call) = calls.get(&key).cloned() {
            drop(calls);
            if !wait {
                return Err(CacheError::KeyNotFound);
            }
            return call.wait().map(|value| LoadOutcome {
                value,
                fresh: false,
            });
        }

        let call = Arc::new(InFlight::new());
        calls.insert(key.clone(), Arc::clone(&call));
        drop(calls);

        let completion = Completion {
            calls: Arc::clone(&self.calls),
            key,
            call,
            published: false,
        };

        if wait {
            return completion.run(fetch).map(|value| LoadOutcome { value, fresh: true });
        }

        if let Err(err) = self.pool.submit(move || {
            let _ = completion.run(fetch);
        }) {
            warn!(error = %err, "background load not started");
        }
        Err(CacheError::KeyNotFound)
    }

    /// Number of keys currently being fetched.
    pub fn in_flight(&self) -> usize {
        self.calls.lock().len()
    }

    /// Callers blocked on the in-flight load for `key`.
    pub fn blocked(&self, key: &K) -> usize {
        self.calls
            .lock()
            .get(key)
            .map_or(0, |call| call.state.lock().blocked)
    }

    /// Upper bound on loads running in the background at once.
    pub fn background_loaders(&self) -> usize {
        self.pool.workers()
    }
}

impl<K, V> Drop for LoadGroup<K, V> {
    fn drop(&mut self) {
        self.pool.close();
    }
}

impl<K, V> Default for LoadGroup<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
