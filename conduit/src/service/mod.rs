//! Pluggable socket I/O backends.
//!
//! A [`Backend`] picks how a server talks to its sockets:
//! - [`Backend::Reactor`] multiplexes every connection on one polling
//!   thread and runs reads, handlers and writes on the pool,
//! - [`Backend::Blocking`] dedicates one pool task per connection, which
//!   reads and writes the socket in blocking mode.

mod blocking;

pub(crate) use blocking::BlockingService;

use crate::error::Result;
use crate::net::Connection;
use crate::pool::WorkerPool;
use crate::server::{Handler, Listeners};
use crate::stream::Charset;

use std::fmt;
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

/// Socket I/O strategy of a server.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Readiness polling on a single thread; the default.
    #[default]
    Reactor,

    /// One blocking pool task per connection.
    Blocking,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Backend::Reactor => "reactor",
            Backend::Blocking => "blocking",
        })
    }
}

/// Error returned when parsing an unknown backend name.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown backend `{0}`, expected `reactor` or `blocking`")]
pub struct UnknownBackend(pub String);

impl FromStr for Backend {
    type Err = UnknownBackend;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reactor" | "nio" => Ok(Backend::Reactor),
            "blocking" | "bio" => Ok(Backend::Blocking),
            _ => Err(UnknownBackend(s.to_string())),
        }
    }
}

/// Everything a running service needs from the server.
pub(crate) struct ServiceContext {
    pub(crate) pool: Arc<WorkerPool>,
    pub(crate) handler: Arc<dyn Handler>,
    pub(crate) listeners: Arc<Listeners>,
    pub(crate) running: Arc<AtomicBool>,
    pub(crate) charset: Charset,
    pub(crate) poll_interval: Duration,
    pub(crate) idle_timeout: Duration,
}

impl ServiceContext {
    /// Checked by the service loop on every iteration.
    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// A bound socket I/O backend.
pub(crate) trait Service: Send {
    /// Address of the listening socket, if the service is bound.
    fn local_addr(&self) -> Option<SocketAddr>;

    /// Handle used to stop the service from another thread.
    fn control(&self) -> Arc<dyn Control>;

    /// Runs the service loop until the context stops running.
    fn run(&mut self, context: &ServiceContext) -> Result<()>;
}

/// Thread-safe side of a running service.
pub(crate) trait Control: Send + Sync {
    /// Makes the service loop notice shutdown promptly and releases
    /// anything blocked on its sockets.
    fn close(&self);
}

/// Binds the service for `backend`.
pub(crate) fn bind(
    backend: Backend,
    address: Option<SocketAddr>,
    backlog: u32,
) -> std::io::Result<Box<dyn Service>> {
    Ok(match backend {
        Backend::Reactor => Box::new(crate::reactor::ReactorService::bind(address, backlog)?),
        Backend::Blocking => Box::new(BlockingService::bind(address, backlog)?),
    })
}

/// Runs the handler once, logging and swallowing failures.
///
/// Returns `false` when the connection should be closed.
pub(crate) fn serve(connection: &Connection, handler: &dyn Handler) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(|| handler.service(connection))) {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!(key = %connection.key(), error = %e, "handler failed, closing connection");
            false
        }
        Err(_) => {
            warn!(key = %connection.key(), "handler panicked, closing connection");
            false
        }
    }
}
