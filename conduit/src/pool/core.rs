use super::worker::Worker;
use super::{Job, PoolConfig};

use std::collections::VecDeque;
use std::mem;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, error, warn};

/// Snapshot of a pool's counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Tasks dropped to make room for newer ones.
    pub discarded: u64,

    /// Live worker threads.
    pub workers: usize,

    /// Tasks waiting for a worker.
    pub queued: usize,
}

/// State protected by the pool lock.
pub(super) struct State {
    pub(super) queue: VecDeque<Job>,
    pub(super) workers: usize,
    pub(super) shutdown: bool,
}

/// State shared between the pool handle and its workers.
pub(super) struct Shared {
    pub(super) config: PoolConfig,
    state: Mutex<State>,

    /// Signalled when a task is queued or shutdown begins.
    pub(super) available: Condvar,

    /// Signalled whenever a worker exits.
    pub(super) finished: Condvar,

    discarded: AtomicU64,
    next_id: AtomicUsize,
}

impl Shared {
    pub(super) fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A bounded pool of worker threads.
///
/// Tasks submitted with [`execute`](Self::execute) run on one of the
/// pool's threads, in no particular order relative to each other. When
/// every worker is busy and the queue is full, the oldest queued task is
/// dropped so the newest can be admitted.
pub struct WorkerPool {
    shared: Arc<Shared>,
}

impl WorkerPool {
    /// Creates an empty pool; workers are spawned on demand.
    pub fn new(config: PoolConfig) -> Self {
        let shared = Arc::new(Shared {
            config,
            state: Mutex::new(State {
                queue: VecDeque::with_capacity(config.queue_capacity().min(1024)),
                workers: 0,
                shutdown: false,
            }),
            available: Condvar::new(),
            finished: Condvar::new(),
            discarded: AtomicU64::new(0),
            next_id: AtomicUsize::new(0),
        });

        Self { shared }
    }

    pub fn config(&self) -> PoolConfig {
        self.shared.config
    }

    /// Submits a task.
    ///
    /// Tasks submitted after [`shutdown`](Self::shutdown) are dropped.
    pub fn execute<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit(Box::new(task));
    }

    fn submit(&self, job: Job) {
        let config = self.shared.config;
        let mut state = self.shared.lock();

        if state.shutdown {
            drop(state);
            debug!("pool is shut down, dropping task");
            return;
        }

        if state.workers < config.core_size() {
            state.workers += 1;
            drop(state);
            self.spawn(job);
            return;
        }

        if state.queue.len() < config.queue_capacity() {
            state.queue.push_back(job);
            drop(state);
            self.shared.available.notify_one();
            return;
        }

        if state.workers < config.max_size() {
            state.workers += 1;
            drop(state);
            self.spawn(job);
            return;
        }

        let oldest = state.queue.pop_front();
        state.queue.push_back(job);
        drop(state);

        self.shared.available.notify_one();
        self.shared.discarded.fetch_add(1, Ordering::Relaxed);
        debug!(
            capacity = config.queue_capacity(),
            "task queue saturated, discarding oldest task"
        );

        drop(oldest);
    }

    /// Starts a worker whose slot has already been counted.
    fn spawn(&self, first: Job) {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let worker = Worker::new(id, self.shared.clone());

        let spawned = std::thread::Builder::new()
            .name(format!("conduit-worker-{id}"))
            .spawn(move || worker.run(first));

        if let Err(e) = spawned {
            error!(error = %e, "failed to spawn worker thread");

            let mut state = self.shared.lock();
            state.workers -= 1;
            drop(state);
            self.shared.finished.notify_all();
        }
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.shared.lock();

        PoolStats {
            discarded: self.shared.discarded.load(Ordering::Relaxed),
            workers: state.workers,
            queued: state.queue.len(),
        }
    }

    /// Stops accepting tasks and waits for the workers to finish.
    ///
    /// Queued tasks still run while the wait lasts. Once `timeout`
    /// elapses, the remaining queue is dropped and the workers still busy
    /// are left to finish on their own.
    ///
    /// Returns `true` if every worker exited in time.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.lock();

        state.shutdown = true;
        self.shared.available.notify_all();

        while state.workers > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());

            if remaining.is_zero() {
                let dropped = mem::take(&mut state.queue);
                let busy = state.workers;
                drop(state);

                warn!(
                    dropped = dropped.len(),
                    busy, "pool did not drain in time, forcing shutdown"
                );
                return false;
            }

            state = self
                .shared
                .finished
                .wait_timeout(state, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }

        true
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        state.shutdown = true;
        drop(state);

        self.shared.available.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn runs_submitted_tasks() {
        let pool = WorkerPool::new(PoolConfig::new(2, 2));
        let (tx, rx) = mpsc::channel();

        for i in 0..10 {
            let tx = tx.clone();
            pool.execute(move || tx.send(i).unwrap());
        }

        let mut seen: Vec<i32> = (0..10)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        seen.sort();

        assert_eq!(seen, (0..10).collect::<Vec<_>>());
        assert!(pool.shutdown(Duration::from_secs(5)));
        assert_eq!(pool.stats().workers, 0);
    }

    #[test]
    fn survives_panicking_task() {
        let pool = WorkerPool::new(PoolConfig::new(1, 1));
        let (tx, rx) = mpsc::channel();

        pool.execute(|| panic!("boom"));
        pool.execute(move || tx.send(()).unwrap());

        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(pool.stats().workers, 1);
        assert!(pool.shutdown(Duration::from_secs(5)));
    }

    #[test]
    fn extra_workers_expire() {
        let config = PoolConfig::new(1, 3)
            .with_queue_capacity(1)
            .with_keep_alive(Duration::from_millis(50));
        let pool = WorkerPool::new(config);
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Arc::new(Mutex::new(release_rx));

        for _ in 0..4 {
            let release = release_rx.clone();
            pool.execute(move || {
                let _ = release.lock().unwrap().recv_timeout(Duration::from_secs(5));
            });
        }
        assert_eq!(pool.stats().workers, 3);

        for _ in 0..4 {
            release_tx.send(()).unwrap();
        }

        let deadline = Instant::now() + Duration::from_secs(5);
        while pool.stats().workers > 1 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }

        assert_eq!(pool.stats().workers, 1);
        assert!(pool.shutdown(Duration::from_secs(5)));
    }

    #[test]
    fn rejects_after_shutdown() {
        let pool = WorkerPool::new(PoolConfig::new(1, 1));
        assert!(pool.shutdown(Duration::from_secs(1)));

        pool.execute(|| unreachable!());
        assert_eq!(pool.stats().workers, 0);
        assert_eq!(pool.stats().queued, 0);
    }
}
