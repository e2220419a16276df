//! The readiness-driven backend.
//!
//! A single thread polls every socket and hands connection work to the
//! pool:
//! - accept readiness opens and registers connections,
//! - read readiness claims the read side and submits a read task,
//! - write readiness claims the write side and submits a write task.
//!
//! Tasks report back through a command channel and wake the poller, after
//! which the reactor re-derives the interest of the affected connection.

mod channel;
mod command;
mod core;
mod task;

pub(crate) mod event;
pub(crate) mod poller;

pub(crate) use self::core::ReactorService;
pub(crate) use poller::platform;
