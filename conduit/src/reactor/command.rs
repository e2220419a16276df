use super::poller::Waker;
use crate::stream::FlushHook;

use std::sync::Arc;
use std::sync::mpsc::Sender;

/// Requests sent from pool tasks to the reactor thread.
///
/// Both variants name the connection by its slab token and by the id it
/// was opened with. Tokens are reused after a close, so a command whose id
/// no longer matches the occupant of the token is ignored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Command {
    /// Recompute the connection's interest and re-register it.
    Rearm { token: usize, id: u64 },

    /// Deregister and close the connection.
    Close { token: usize, id: u64 },
}

/// Sends commands about one connection and wakes the reactor.
#[derive(Clone)]
pub(crate) struct Notifier {
    token: usize,
    id: u64,
    commands: Sender<Command>,
    waker: Arc<Waker>,
}

impl Notifier {
    pub(crate) fn new(token: usize, id: u64, commands: Sender<Command>, waker: Arc<Waker>) -> Self {
        Self {
            token,
            id,
            commands,
            waker,
        }
    }

    pub(crate) fn rearm(&self) {
        self.send(Command::Rearm {
            token: self.token,
            id: self.id,
        });
    }

    pub(crate) fn close(&self) {
        self.send(Command::Close {
            token: self.token,
            id: self.id,
        });
    }

    /// Hook installed in the connection's writer so a `flush` outside a
    /// write task still gets the pending bytes sent.
    pub(crate) fn flush_hook(&self) -> FlushHook {
        let notifier = self.clone();
        Arc::new(move || notifier.rearm())
    }

    fn send(&self, command: Command) {
        // The reactor is gone once the receiver is dropped; nothing to do.
        if self.commands.send(command).is_ok() {
            self.waker.wake();
        }
    }
}
