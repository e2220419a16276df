use super::Job;
use super::core::Shared;

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError};

use tracing::warn;

/// A thread of the worker pool.
///
/// A worker runs the task it was spawned for, then keeps taking tasks
/// from the shared queue. It exits when:
/// - the pool shuts down and the queue is empty, or
/// - it is above the core size and found no work for `keep_alive`.
pub(super) struct Worker {
    id: usize,
    shared: Arc<Shared>,
}

impl Worker {
    pub(super) fn new(id: usize, shared: Arc<Shared>) -> Self {
        Self { id, shared }
    }

    pub(super) fn run(self, first: Job) {
        self.execute(first);

        while let Some(job) = self.next_job() {
            self.execute(job);
        }

        self.shared.finished.notify_all();
    }

    /// Runs one task. A panicking task is logged and does not take the
    /// worker down.
    fn execute(&self, job: Job) {
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            warn!(worker = self.id, "task panicked");
        }
    }

    /// Waits for the next task.
    ///
    /// Returns `None` once this worker should exit; the worker count has
    /// then already been decremented.
    fn next_job(&self) -> Option<Job> {
        let config = self.shared.config;
        let mut state = self.shared.lock();

        loop {
            if let Some(job) = state.queue.pop_front() {
                return Some(job);
            }

            if state.shutdown {
                state.workers -= 1;
                return None;
            }

            if state.workers > config.core_size() {
                let (guard, wait) = self
                    .shared
                    .available
                    .wait_timeout(state, config.keep_alive())
                    .unwrap_or_else(PoisonError::into_inner);
                state = guard;

                if wait.timed_out() && state.queue.is_empty() && state.workers > config.core_size()
                {
                    state.workers -= 1;
                    return None;
                }
            } else {
                state = self
                    .shared
                    .available
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        }
    }
}
