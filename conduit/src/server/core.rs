use super::Handler;
use super::builder::ServerConfig;
use super::listener::Listeners;
use crate::error::{Error, Result};
use crate::pool::{PoolConfig, PoolStats, WorkerPool};
use crate::service::{self, Control, ServiceContext};

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{error, info};

/// Resources of a started server.
struct Active {
    pool: Arc<WorkerPool>,
    control: Arc<dyn Control>,
    local_addr: Option<SocketAddr>,
}

struct Inner {
    config: ServerConfig,
    handler: Arc<dyn Handler>,
    listeners: Arc<Listeners>,
    running: Arc<AtomicBool>,
    active: Mutex<Option<Active>>,
}

impl Inner {
    fn active(&self) -> MutexGuard<'_, Option<Active>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A TCP server.
///
/// A `Server` owns a worker pool and an I/O backend. [`start`](Self::start)
/// binds, fires the start listeners and then blocks running the backend
/// loop; [`stop`](Self::stop), called from another thread or from a
/// listener, makes it return.
///
/// `Server` is a cheap handle: clones control the same server.
///
/// # Examples
///
/// ```rust,ignore
/// let server = ServerBuilder::new().ephemeral().build(handler);
///
/// let handle = server.clone();
/// std::thread::spawn(move || handle.start());
///
/// // ...
/// server.stop();
/// ```
#[derive(Clone)]
pub struct Server {
    inner: Arc<Inner>,
}

impl Server {
    pub(crate) fn new<H>(config: ServerConfig, listeners: Listeners, handler: H) -> Self
    where
        H: Handler,
    {
        Self {
            inner: Arc::new(Inner {
                config,
                handler: Arc::new(handler),
                listeners: Arc::new(listeners),
                running: Arc::new(AtomicBool::new(false)),
                active: Mutex::new(None),
            }),
        }
    }

    /// Starts the server and blocks until it is stopped.
    ///
    /// The sequence is:
    /// 1. build the worker pool,
    /// 2. bind the backend (when a port is configured),
    /// 3. call the start listeners with the bound address,
    /// 4. run the backend loop until [`stop`](Self::stop).
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyRunning`] if the server is running,
    /// - [`Error::Bind`] if the listening socket cannot be set up,
    /// - [`Error::Io`] if the poller fails.
    pub fn start(&self) -> Result<()> {
        let inner = &self.inner;

        if inner
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::AlreadyRunning);
        }

        let config = &inner.config;
        let pool = Arc::new(WorkerPool::new(config.pool.unwrap_or_else(PoolConfig::auto)));
        let address = config.address();

        let mut bound = match service::bind(config.backend, address, config.backlog) {
            Ok(bound) => bound,
            Err(e) => {
                inner.running.store(false, Ordering::Release);
                pool.shutdown(Duration::ZERO);

                error!(address = ?address, error = %e, "failed to bind");
                return Err(match address {
                    Some(addr) => Error::Bind { addr, source: e },
                    None => Error::Io(e),
                });
            }
        };

        let local_addr = bound.local_addr();
        *inner.active() = Some(Active {
            pool: pool.clone(),
            control: bound.control(),
            local_addr,
        });

        info!(
            address = ?local_addr,
            backend = %config.backend,
            pool = ?pool.config(),
            "server started"
        );
        inner.listeners.fire_start(local_addr);

        let context = ServiceContext {
            pool,
            handler: inner.handler.clone(),
            listeners: inner.listeners.clone(),
            running: inner.running.clone(),
            charset: config.charset,
            poll_interval: config.poll_interval,
            idle_timeout: config.idle_timeout,
        };

        let result = bound.run(&context);

        let leftover = inner.active().take();
        if let Some(active) = leftover {
            inner.running.store(false, Ordering::Release);
            active.pool.shutdown(config.shutdown_timeout);
        }

        result
    }

    /// Stops a running server.
    ///
    /// The backend loop is told to exit and every connection is closed.
    /// The pool then gets up to the configured shutdown timeout to finish
    /// queued and running tasks before the rest is dropped.
    ///
    /// Calling `stop` from a handler makes the pool wait on its own
    /// worker, so the full shutdown timeout elapses.
    pub fn stop(&self) {
        let inner = &self.inner;

        let active = inner.active().take();
        inner.running.store(false, Ordering::Release);

        let Some(active) = active else {
            return;
        };

        active.control.close();

        let drained = active.pool.shutdown(inner.config.shutdown_timeout);
        info!(address = ?active.local_addr, drained, "server stopped");
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Address the server listens on, once started and bound.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.active().as_ref().and_then(|a| a.local_addr)
    }

    /// Counters of the running server's pool.
    pub fn pool_stats(&self) -> Option<PoolStats> {
        self.inner.active().as_ref().map(|a| a.pool.stats())
    }

    /// Runs `task` on the server's worker pool.
    ///
    /// # Errors
    ///
    /// [`Error::NotRunning`] if the server has not been started.
    pub fn execute<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let pool = match self.inner.active().as_ref() {
            Some(active) => active.pool.clone(),
            None => return Err(Error::NotRunning),
        };

        pool.execute(task);
        Ok(())
    }
}
