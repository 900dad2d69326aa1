//! Loader Pool
//!
//! Bounded FIFO of background loads drained by a fixed set of
//! `loadcache-loader` threads. Workers start on the first submission, so a
//! cache that never loads in the background never spawns a thread.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use parking_lot::{Condvar, Mutex};
use thiserror::Error;
use tracing::{debug, warn};

/// Worker threads per cache unless configured otherwise.
pub const DEFAULT_BACKGROUND_LOADERS: usize = 4;

/// Queued background loads per cache before new ones are turned away.
pub const DEFAULT_BACKGROUND_QUEUE: usize = 1024;

const THREAD_NAME: &str = "loadcache-loader";

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Reasons a background load was not queued. The rejected job is dropped.
#[derive(Debug, Error)]
pub(crate) enum PoolError {
    #[error("background load queue is full")]
    Full,

    #[error("loader pool is closed")]
    Closed,

    #[error("failed to start loader thread: {0}")]
    Spawn(#[from] std::io::Error),
}

struct Queue {
    jobs: VecDeque<Job>,
    closed: bool,
}

struct Shared {
    queue: Mutex<Queue>,
    available: Condvar,
}

pub(crate) struct LoaderPool {
    shared: Arc<Shared>,
    workers: usize,
    queue_capacity: usize,
    started: Mutex<usize>,
}

impl LoaderPool {
    /// Zero workers or a zero-length queue are raised to one.
    pub fn new(workers: usize, queue_capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(Queue {
                    jobs: VecDeque::new(),
                    closed: false,
                }),
                available: Condvar::new(),
            }),
            workers: workers.max(1),
            queue_capacity: queue_capacity.max(1),
            started: Mutex::new(0),
        }
    }

    /// Queues `job` without blocking.
    pub fn submit<F>(&self, job: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.start_workers()?;

        {
            let mut queue = self.shared.queue.lock();
            if queue.closed {
                return Err(PoolError::Closed);
            }
            if queue.jobs.len() >= self.queue_capacity {
                return Err(PoolError::Full);
            }
            queue.jobs.push_back(Box::new(job));
        }
        self.shared.available.notify_one();
        Ok(())
    }

    /// Stops accepting jobs. Workers finish what is queued, then exit.
    pub fn close(&self) {
        self.shared.queue.lock().closed = true;
        self.shared.available.notify_all();
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    fn start_workers(&self) -> Result<(), PoolError> {
        let mut started = self.started.lock();
        while *started < self.workers {
            let shared = Arc::clone(&self.shared);
            let spawned = thread::Builder::new()
                .name(THREAD_NAME.to_string())
                .spawn(move || work(&shared));
            match spawned {
                Ok(_) => *started += 1,
                // One live worker is enough to make progress.
                Err(err) if *started > 0 => {
                    warn!(error = %err, started = *started, "loader pool running short");
                    break;
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }
}

fn work(shared: &Shared) {
    loop {
        let job = {
            let mut queue = shared.queue.lock();
            loop {
                if let Some(job) = queue.jobs.pop_front() {
                    break job;
                }
                if queue.closed {
                    debug!("loader worker exiting");
                    return;
                }
                shared.available.wait(&mut queue);
            }
        };

        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            warn!("background load panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not met within 5s");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_jobs_run_on_named_workers() {
        let pool = LoaderPool::new(2, 8);
        let (tx, rx) = mpsc::channel();

        pool.submit(move || {
            let name = thread::current().name().map(str::to_string);
            tx.send(name).unwrap();
        })
        .unwrap();

        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(name.as_deref(), Some(THREAD_NAME));
    }

    #[test]
    fn test_concurrency_is_capped_by_workers() {
        let pool = LoaderPool::new(2, 64);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..20 {
            let (active, peak, done) = (Arc::clone(&active), Arc::clone(&peak), Arc::clone(&done));
            pool.submit(move || {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(10));
                active.fetch_sub(1, Ordering::SeqCst);
                done.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        wait_until(|| done.load(Ordering::SeqCst) == 20);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn test_full_queue_rejects() {
        let pool = LoaderPool::new(1, 1);
        let running = Arc::new(AtomicBool::new(false));
        let release = Arc::new(AtomicBool::new(false));

        {
            let (running, release) = (Arc::clone(&running), Arc::clone(&release));
            pool.submit(move || {
                running.store(true, Ordering::SeqCst);
                while !release.load(Ordering::SeqCst) {
                    thread::sleep(Duration::from_millis(1));
                }
            })
            .unwrap();
        }
        wait_until(|| running.load(Ordering::SeqCst));

        pool.submit(|| {}).unwrap();
        assert!(matches!(pool.submit(|| {}), Err(PoolError::Full)));

        release.store(true, Ordering::SeqCst);
    }

    #[test]
    fn test_panicking_job_keeps_worker() {
        let pool = LoaderPool::new(1, 4);
        let (tx, rx) = mpsc::channel();

        pool.submit(|| panic!("job exploded")).unwrap();
        pool.submit(move || tx.send(()).unwrap()).unwrap();

        assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn test_closed_pool_rejects() {
        let pool = LoaderPool::new(1, 4);
        pool.close();

        assert!(matches!(pool.submit(|| {}), Err(PoolError::Closed)));
    }

    #[test]
    fn test_zero_sizes_are_raised() {
        let pool = LoaderPool::new(0, 0);
        assert_eq!(pool.workers(), 1);
        assert_eq!(pool.queue_capacity, 1);
    }
}
