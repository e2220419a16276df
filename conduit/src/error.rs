//! Error type shared by every conduit operation.
//!
//! Transient socket failures never reach this type from inside a backend:
//! they are logged and close only the affected connection. What surfaces
//! here are failures the immediate caller can act on: timeouts, buffer
//! contract violations and lifecycle misuse.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// A reader operation was given a timeout and no data arrived in time.
    #[error("timed out after {0:?} waiting for data")]
    Timeout(Duration),

    /// Pushed-back bytes plus the unread tail do not fit the input buffer.
    #[error("cannot push back {pushed} bytes: {unread} unread bytes already fill a {capacity}-byte buffer")]
    Overflow {
        pushed: usize,
        unread: usize,
        capacity: usize,
    },

    /// The destination buffer of a delimited read is shorter than the delimiter.
    #[error("a {len}-byte buffer cannot be scanned for a {delimiter}-byte delimiter")]
    BufferTooSmall { len: usize, delimiter: usize },

    /// A delimited read was asked to match the empty sequence.
    #[error("delimiter must not be empty")]
    EmptyDelimiter,

    /// The peer closed the connection while the caller waited for data.
    #[error("connection closed")]
    Closed,

    /// `start()` was called on a server that is already running.
    #[error("server is already running")]
    AlreadyRunning,

    /// Work was submitted to a server that is not running.
    #[error("server is not running")]
    NotRunning,

    /// The listening socket could not be created.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Returns `true` for [`Error::Timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }
}
