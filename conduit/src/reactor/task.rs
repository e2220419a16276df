//! Work the reactor hands to the pool for a ready connection.

use super::channel::Channel;
use super::poller::platform::{sys_read, sys_send};
use crate::net::{Connection, DispatchGuard};
use crate::server::Handler;
use crate::service;

use std::io;
use std::sync::Arc;

use tracing::debug;

/// Size of the scratch region a read task receives into.
const READ_CHUNK: usize = 8 * 1024;

/// What the reactor should do with a connection once a task is over.
enum Next {
    Rearm,
    Close,
}

/// Reads once from the socket and runs the handler over what arrived.
///
/// The guard is released before the reactor is notified, so the interest
/// it recomputes already allows the next read.
pub(crate) fn read(guard: DispatchGuard, channel: Arc<Channel>, handler: Arc<dyn Handler>) {
    let connection = guard.connection().clone();
    let mut scratch = [0u8; READ_CHUNK];

    let next = match sys_read(channel.fd(), &mut scratch) {
        Ok(0) => {
            debug!(key = %connection.key(), "peer finished sending");
            connection.close_input();

            if connection.has_sending_data() {
                Next::Rearm
            } else {
                Next::Close
            }
        }
        Ok(n) => {
            connection.receive_data(&scratch[..n]);
            serve(&connection, handler.as_ref())
        }
        Err(e) if is_transient(&e) => Next::Rearm,
        Err(e) => {
            debug!(key = %connection.key(), error = %e, "read failed");
            Next::Close
        }
    };

    drop(guard);
    notify(&channel, next);
}

/// Sends as much pending output as the socket accepts.
pub(crate) fn write(guard: DispatchGuard, channel: Arc<Channel>) {
    let connection = guard.connection().clone();

    let next = {
        let mut writer = connection.writer();

        let sent = loop {
            let len = writer.pending().len();
            if len == 0 {
                break Ok(());
            }

            match sys_send(channel.fd(), writer.pending()) {
                Ok(n) => writer.retain(len - n),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break Ok(()),
                Err(e) => break Err(e),
            }
        };

        match sent {
            Err(e) => {
                debug!(key = %connection.key(), error = %e, "write failed");
                Next::Close
            }
            Ok(()) if writer.has_pending() => Next::Rearm,
            Ok(()) if !connection.keep_alive() || connection.is_input_closed() => Next::Close,
            Ok(()) => Next::Rearm,
        }
    };

    drop(guard);
    notify(&channel, next);
}

/// Runs the handler over the newly delivered bytes.
fn serve(connection: &Connection, handler: &dyn Handler) -> Next {
    if !service::serve(connection, handler) {
        return Next::Close;
    }

    if !connection.keep_alive() && !connection.has_sending_data() {
        Next::Close
    } else {
        Next::Rearm
    }
}

fn notify(channel: &Channel, next: Next) {
    match next {
        Next::Rearm => channel.notifier().rearm(),
        Next::Close => channel.notifier().close(),
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}
