//! Bounded worker pool running per-connection tasks.
//!
//! The pool follows the usual core/max executor rules:
//! - below `core_size` workers, a new worker is spawned for the task,
//! - otherwise the task is queued,
//! - when the queue is full and fewer than `max_size` workers exist, an
//!   extra worker is spawned for the task,
//! - otherwise the oldest queued task is discarded to admit the new one.
//!
//! Workers above `core_size` exit after `keep_alive` without work.

mod config;
mod core;
mod worker;

pub use config::PoolConfig;
pub use self::core::{PoolStats, WorkerPool};

/// A unit of work submitted to the pool.
pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;
