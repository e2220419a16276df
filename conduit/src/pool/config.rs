use crate::reactor::platform::{sys_cpu_count, sys_physical_memory};

use std::time::Duration;

/// Smallest queue capacity picked by [`PoolConfig::auto`].
const MIN_AUTO_QUEUE: usize = 256;

/// Largest queue capacity picked by [`PoolConfig::auto`].
const MAX_AUTO_QUEUE: usize = 65536;

const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(60);

/// Sizing of a [`WorkerPool`](super::WorkerPool).
///
/// # Examples
///
/// ```rust,ignore
/// let config = PoolConfig::new(2, 8)
///     .with_queue_capacity(1024)
///     .with_keep_alive(Duration::from_secs(10));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    core_size: usize,
    max_size: usize,
    keep_alive: Duration,
    queue_capacity: usize,
}

impl PoolConfig {
    /// Creates a configuration with the given core and maximum worker counts.
    ///
    /// Keep-alive defaults to 60 seconds and the queue to
    /// 256 slots.
    ///
    /// # Panics
    ///
    /// Panics if `core_size == 0` or `max_size < core_size`.
    pub fn new(core_size: usize, max_size: usize) -> Self {
        assert!(core_size > 0, "core_size must be > 0");
        assert!(max_size >= core_size, "max_size must be >= core_size");

        Self {
            core_size,
            max_size,
            keep_alive: DEFAULT_KEEP_ALIVE,
            queue_capacity: MIN_AUTO_QUEUE,
        }
    }

    /// Derives a configuration from the host.
    ///
    /// - `core_size` is the number of online CPUs,
    /// - `max_size` is four times that,
    /// - the queue holds one task per MiB of physical memory, clamped to
    ///   `256..=65536`.
    pub fn auto() -> Self {
        let cpus = sys_cpu_count().unwrap_or(1).max(1);

        let queue_capacity = sys_physical_memory()
            .map(|bytes| (bytes / (1024 * 1024)) as usize)
            .unwrap_or(MIN_AUTO_QUEUE)
            .clamp(MIN_AUTO_QUEUE, MAX_AUTO_QUEUE);

        Self::new(cpus, cpus * 4).with_queue_capacity(queue_capacity)
    }

    /// Sets how long a worker above `core_size` waits for work before
    /// exiting.
    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Sets the number of tasks that may wait for a worker.
    ///
    /// # Panics
    ///
    /// Panics if `capacity == 0`.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        assert!(capacity > 0, "queue_capacity must be > 0");

        self.queue_capacity = capacity;
        self
    }

    pub fn core_size(&self) -> usize {
        self.core_size
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn keep_alive(&self) -> Duration {
        self.keep_alive
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::auto()
    }
}
