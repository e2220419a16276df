use super::command::Notifier;
use super::poller::platform::sys_shutdown;
use crate::net::Connection;

use std::net::Shutdown;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::sync::Arc;

/// A connection registered with the reactor.
///
/// Pool tasks hold a clone of the `Arc<Channel>` while they run, so the
/// socket stays open until both the reactor entry and every in-flight task
/// are gone.
pub(crate) struct Channel {
    id: u64,
    socket: OwnedFd,
    connection: Arc<Connection>,
    notifier: Notifier,
}

impl Channel {
    pub(crate) fn new(
        id: u64,
        socket: OwnedFd,
        connection: Arc<Connection>,
        notifier: Notifier,
    ) -> Self {
        Self {
            id,
            socket,
            connection,
            notifier,
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }

    pub(crate) fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    pub(crate) fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Shuts both directions down and marks the connection closed.
    ///
    /// The descriptor itself is released when the last reference drops.
    pub(crate) fn shutdown(&self) {
        let _ = sys_shutdown(self.fd(), Shutdown::Both);
        self.connection.close();
    }
}
