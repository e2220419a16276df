use super::channel::Channel;
use super::command::{Command, Notifier};
use super::event::Event;
use super::poller::platform::{sys_accept, sys_listen_on, sys_sockname};
use super::poller::{Interest, Poller, Waker};
use super::task;
use crate::error::Result;
use crate::net::{Connection, ConnectionKey};
use crate::service::{Control, Service, ServiceContext};
use crate::utils::Slab;

use std::io;
use std::mem;
use std::net::SocketAddr;
use std::os::fd::{AsRawFd, OwnedFd};
use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender, channel};

use tracing::{debug, error, info, warn};

/// A descriptor known to the reactor.
enum Entry {
    Listener(OwnedFd),
    Connection(Registration),
}

/// A connection together with the interest currently registered for it.
///
/// An empty interest means the descriptor is not in the poller at all.
struct Registration {
    channel: Arc<Channel>,
    interest: Interest,
}

/// The readiness-driven backend.
///
/// One thread, the caller of [`run`](Service::run), owns the poller and
/// every registration. It never performs connection work itself: reads,
/// handler calls and writes run on the pool, and report back through
/// [`Command`]s plus a wake-up of the poller.
///
/// Per connection, the registered interest is always derived from the
/// connection state:
/// - read while no read task is claimed and the peer may still send,
/// - write while no write task is claimed and output is pending.
pub(crate) struct ReactorService {
    poller: Poller,
    events: Vec<Event>,

    entries: Slab<Entry>,

    receiver: Receiver<Command>,
    sender: Sender<Command>,

    local_addr: Option<SocketAddr>,
    next_id: u64,
}

impl ReactorService {
    /// Creates the poller and, when `address` is given, a listening socket
    /// registered for accept readiness.
    pub(crate) fn bind(address: Option<SocketAddr>, backlog: u32) -> io::Result<Self> {
        let mut poller = Poller::new()?;
        let mut entries = Slab::new(64);

        let local_addr = match address {
            Some(address) => {
                let listener = sys_listen_on(address, backlog)?;
                let local = sys_sockname(listener.as_raw_fd())?;
                let fd = listener.as_raw_fd();

                let token = entries.insert(Entry::Listener(listener));
                poller.register(fd, token, Interest::READ)?;

                Some(local)
            }
            None => None,
        };

        let (sender, receiver) = channel();

        Ok(Self {
            poller,
            events: Vec::with_capacity(64),
            entries,
            receiver,
            sender,
            local_addr,
            next_id: 0,
        })
    }

    /// Handles one readiness event.
    fn dispatch(&mut self, event: Event, context: &ServiceContext) {
        let channel = match self.entries.get(event.token) {
            Some(Entry::Listener(_)) => {
                self.accept(event.token, context);
                return;
            }
            Some(Entry::Connection(registration)) => registration.channel.clone(),
            None => return,
        };

        let connection = channel.connection();

        if event.readable {
            if let Some(guard) = connection.try_claim_read() {
                let channel = channel.clone();
                let handler = context.handler.clone();
                context
                    .pool
                    .execute(move || task::read(guard, channel, handler));
            }
        }

        if event.writable && connection.has_sending_data() {
            if let Some(guard) = connection.try_claim_write() {
                let channel = channel.clone();
                context.pool.execute(move || task::write(guard, channel));
            }
        }

        self.update_interest(event.token, channel.id());
    }

    /// Accepts until the listener would block.
    fn accept(&mut self, token: usize, context: &ServiceContext) {
        loop {
            let fd = match self.entries.get(token) {
                Some(Entry::Listener(listener)) => listener.as_raw_fd(),
                _ => return,
            };

            match sys_accept(fd) {
                Ok((socket, peer)) => self.open(socket, peer, context),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    return;
                }
            }
        }
    }

    /// Registers an accepted socket and runs the connect listeners.
    fn open(&mut self, socket: OwnedFd, peer: SocketAddr, context: &ServiceContext) {
        let local = match sys_sockname(socket.as_raw_fd()) {
            Ok(local) => local,
            Err(e) => {
                debug!(%peer, error = %e, "dropping accepted socket");
                return;
            }
        };

        let key = ConnectionKey::new(peer, local);
        let connection = Arc::new(Connection::fed(key, context.charset));

        let id = self.next_id;
        self.next_id += 1;

        let token = self.entries.vacant_key();
        let notifier = Notifier::new(token, id, self.sender.clone(), self.poller.waker());
        connection.writer().attach(notifier.flush_hook());

        let channel = Arc::new(Channel::new(id, socket, connection.clone(), notifier));
        let inserted = self.entries.insert(Entry::Connection(Registration {
            channel,
            interest: Interest::default(),
        }));
        debug_assert_eq!(inserted, token);

        debug!(%key, token, "connection opened");

        context.listeners.fire_connect(&connection);
        self.update_interest(token, id);
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Rearm { token, id } => self.update_interest(token, id),
            Command::Close { token, id } => self.close(token, id),
        }
    }

    /// Applies the interest the connection's current state calls for.
    fn update_interest(&mut self, token: usize, id: u64) {
        let Some(Entry::Connection(registration)) = self.entries.get_mut(token) else {
            return;
        };
        if registration.channel.id() != id {
            return;
        }

        let connection = registration.channel.connection();
        let wanted = Interest {
            read: !connection.is_reading() && !connection.is_input_closed(),
            write: !connection.is_writing() && connection.has_sending_data(),
        };

        if wanted == registration.interest {
            return;
        }

        let fd = registration.channel.fd();
        let applied = match (registration.interest.is_empty(), wanted.is_empty()) {
            (true, true) => Ok(()),
            (true, false) => self.poller.register(fd, token, wanted),
            (false, true) => self.poller.deregister(fd),
            (false, false) => self.poller.reregister(fd, token, wanted),
        };

        match applied {
            Ok(()) => registration.interest = wanted,
            Err(e) => {
                warn!(
                    key = %connection.key(),
                    error = %e,
                    "failed to update registration, closing connection"
                );
                self.close(token, id);
            }
        }
    }

    /// Deregisters and shuts down a connection.
    fn close(&mut self, token: usize, id: u64) {
        match self.entries.get(token) {
            Some(Entry::Connection(registration)) if registration.channel.id() == id => {}
            _ => return,
        }

        if let Some(Entry::Connection(registration)) = self.entries.remove(token) {
            self.release(registration);
        }
    }

    fn release(&mut self, registration: Registration) {
        let channel = registration.channel;

        if !registration.interest.is_empty() {
            let _ = self.poller.deregister(channel.fd());
        }

        channel.shutdown();
        debug!(key = %channel.connection().key(), "connection closed");
    }

    /// Closes every connection and the listener.
    fn clear(&mut self) {
        let entries: Vec<Entry> = self.entries.drain().collect();

        for entry in entries {
            match entry {
                Entry::Connection(registration) => self.release(registration),
                Entry::Listener(listener) => {
                    let _ = self.poller.deregister(listener.as_raw_fd());
                }
            }
        }

        while self.receiver.try_recv().is_ok() {}
    }
}

impl Service for ReactorService {
    fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    fn control(&self) -> Arc<dyn Control> {
        self.poller.waker()
    }

    fn run(&mut self, context: &ServiceContext) -> Result<()> {
        info!(address = ?self.local_addr, "reactor running");

        while context.is_running() {
            while let Ok(command) = self.receiver.try_recv() {
                self.handle(command);
            }

            if let Err(e) = self.poller.poll(&mut self.events, Some(context.poll_interval)) {
                error!(error = %e, "poller failed, stopping reactor");
                self.clear();
                return Err(e.into());
            }

            let events = mem::take(&mut self.events);
            for event in &events {
                self.dispatch(*event, context);
            }
            self.events = events;
        }

        let open = self.entries.len();
        self.clear();
        info!(open, "reactor stopped");

        Ok(())
    }
}

impl Control for Waker {
    fn close(&self) {
        self.wake();
    }
}
