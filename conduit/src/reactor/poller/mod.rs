//! Platform-specific readiness poller.
//!
//! The poller is used by the reactor and by the blocking service to:
//! - wait for readiness on registered sockets,
//! - be woken from another thread when commands arrive or on shutdown.
//!
//! The concrete implementation is selected at compile time: `epoll` on
//! Linux, `poll(2)` on every other Unix.

pub(crate) mod common;

pub(crate) use common::{Interest, Waker};

#[cfg(target_os = "linux")]
mod epoll;

#[cfg(all(unix, not(target_os = "linux")))]
mod poll;

#[cfg(target_os = "linux")]
pub(crate) type Poller = epoll::EpollPoller;

#[cfg(all(unix, not(target_os = "linux")))]
pub(crate) type Poller = poll::PollPoller;

#[cfg(unix)]
pub(crate) mod unix;

#[cfg(unix)]
pub(crate) use unix as platform;
