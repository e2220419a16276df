use super::{Control, Service, ServiceContext, serve};
use crate::error::{Error, Result};
use crate::net::{Connection, ConnectionKey};
use crate::reactor::platform::{sys_accept, sys_listen_on, sys_set_nonblocking, sys_sockname};
use crate::reactor::event::Event;
use crate::reactor::poller::{Interest, Poller, Waker};
use crate::server::Handler;

use std::collections::HashMap;
use std::io;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::os::fd::{AsRawFd, OwnedFd};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, error, info, warn};

/// Poller token of the listening socket.
const LISTENER_TOKEN: usize = 0;

/// Sockets currently driven by a pool task, kept so `close()` can shut
/// them down and release workers blocked in a read.
struct LiveSockets {
    waker: Arc<Waker>,
    sockets: Mutex<HashMap<u64, TcpStream>>,
    next_id: AtomicU64,
}

impl LiveSockets {
    fn lock(&self) -> MutexGuard<'_, HashMap<u64, TcpStream>> {
        self.sockets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn track(self: &Arc<Self>, stream: TcpStream) -> Tracked {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(id, stream);

        Tracked {
            live: self.clone(),
            id,
        }
    }
}

impl Control for LiveSockets {
    fn close(&self) {
        for stream in self.lock().values() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.waker.wake();
    }
}

/// Membership of one socket in [`LiveSockets`].
///
/// Dropping it, including when the pool discards the task that owns it,
/// shuts the socket down and forgets it.
struct Tracked {
    live: Arc<LiveSockets>,
    id: u64,
}

impl Drop for Tracked {
    fn drop(&mut self) {
        if let Some(stream) = self.live.lock().remove(&self.id) {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

/// The thread-per-connection backend.
///
/// The listening socket is non-blocking and watched by a poller, so the
/// accept loop wakes up for shutdown. Accepted sockets are switched back
/// to blocking mode and each is driven by a single pool task:
/// wait for input, run the handler, flush, and repeat while keep-alive is
/// on. A connection idle for longer than `idle_timeout` is closed.
pub(crate) struct BlockingService {
    poller: Poller,
    events: Vec<Event>,
    listener: Option<OwnedFd>,
    local_addr: Option<SocketAddr>,
    live: Arc<LiveSockets>,
}

impl BlockingService {
    pub(crate) fn bind(address: Option<SocketAddr>, backlog: u32) -> io::Result<Self> {
        let mut poller = Poller::new()?;

        let (listener, local_addr) = match address {
            Some(address) => {
                let listener = sys_listen_on(address, backlog)?;
                let local = sys_sockname(listener.as_raw_fd())?;
                poller.register(listener.as_raw_fd(), LISTENER_TOKEN, Interest::READ)?;

                (Some(listener), Some(local))
            }
            None => (None, None),
        };

        let live = Arc::new(LiveSockets {
            waker: poller.waker(),
            sockets: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        });

        Ok(Self {
            poller,
            events: Vec::with_capacity(8),
            listener,
            local_addr,
            live,
        })
    }

    fn accept(&self, context: &ServiceContext) {
        let Some(listener) = self.listener.as_ref() else {
            return;
        };

        loop {
            match sys_accept(listener.as_raw_fd()) {
                Ok((socket, peer)) => {
                    if let Err(e) = self.open(socket, peer, context) {
                        debug!(%peer, error = %e, "dropping accepted socket");
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    return;
                }
            }
        }
    }

    fn open(&self, socket: OwnedFd, peer: SocketAddr, context: &ServiceContext) -> io::Result<()> {
        sys_set_nonblocking(socket.as_raw_fd(), false)?;

        let stream = TcpStream::from(socket);
        let key = ConnectionKey::new(peer, stream.local_addr()?);

        let tracked = self.live.track(stream.try_clone()?);
        let connection = Arc::new(Connection::over_socket(key, stream, context.charset)?);

        debug!(%key, "connection opened");
        context.listeners.fire_connect(&connection);

        let handler = context.handler.clone();
        let idle_timeout = context.idle_timeout;

        context.pool.execute(move || {
            drive(&connection, handler.as_ref(), idle_timeout);
            connection.close();
            drop(tracked);

            debug!(%key, "connection closed");
        });

        Ok(())
    }
}

/// Serves one connection until it closes, goes idle, or stops keep-alive.
fn drive(connection: &Connection, handler: &dyn Handler, idle_timeout: Duration) {
    loop {
        match connection.reader().wait_for_data(idle_timeout) {
            Ok(()) => {}
            Err(Error::Timeout(_)) => {
                debug!(key = %connection.key(), "connection idle, closing");
                return;
            }
            Err(Error::Closed) => return,
            Err(e) => {
                debug!(key = %connection.key(), error = %e, "read failed");
                return;
            }
        }

        if !serve(connection, handler) {
            return;
        }

        if let Err(e) = connection.writer().flush() {
            debug!(key = %connection.key(), error = %e, "write failed");
            return;
        }

        if !connection.keep_alive() || connection.is_input_closed() {
            return;
        }
    }
}

impl Service for BlockingService {
    fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    fn control(&self) -> Arc<dyn Control> {
        self.live.clone()
    }

    fn run(&mut self, context: &ServiceContext) -> Result<()> {
        info!(address = ?self.local_addr, "blocking service running");

        while context.is_running() {
            if let Err(e) = self.poller.poll(&mut self.events, Some(context.poll_interval)) {
                error!(error = %e, "poller failed, stopping service");
                self.live.close();
                return Err(e.into());
            }

            if self.events.iter().any(|e| e.token == LISTENER_TOKEN) {
                self.accept(context);
            }
        }

        self.live.close();
        info!("blocking service stopped");

        Ok(())
    }
}
