use super::listener::Listeners;
use super::{Handler, Server};
use crate::net::Connection;
use crate::pool::PoolConfig;
use crate::service::Backend;
use crate::stream::Charset;
use crate::utils::env::{env_get, env_get_opt};

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use tracing::warn;

const DEFAULT_BACKLOG: u32 = 128;
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Settings a [`Server`] was built with.
#[derive(Clone, Debug)]
pub(crate) struct ServerConfig {
    pub(crate) host: IpAddr,
    pub(crate) port: u16,
    pub(crate) ephemeral: bool,
    pub(crate) backend: Backend,
    pub(crate) pool: Option<PoolConfig>,
    pub(crate) charset: Charset,
    pub(crate) backlog: u32,
    pub(crate) poll_interval: Duration,
    pub(crate) idle_timeout: Duration,
    pub(crate) shutdown_timeout: Duration,
}

impl ServerConfig {
    /// Address to listen on, or `None` for an unbound server.
    pub(crate) fn address(&self) -> Option<SocketAddr> {
        (self.port != 0 || self.ephemeral).then(|| SocketAddr::new(self.host, self.port))
    }
}

/// Builder for configuring and creating a [`Server`].
///
/// By default the server:
/// - is unbound (port `0`), which still runs the pool and the service
///   loop for library use,
/// - listens on `0.0.0.0` once a port is set,
/// - uses the reactor backend and an auto-sized pool,
/// - polls every 50 ms, closes blocking connections idle for 30 s, and
///   waits up to 5 s for the pool on stop.
///
/// # Examples
///
/// ```rust,ignore
/// let server = ServerBuilder::new()
///     .port(7000)
///     .backend(Backend::Blocking)
///     .on_start(|address| println!("listening on {address:?}"))
///     .build(|connection: &Connection| Ok(()));
/// ```
pub struct ServerBuilder {
    config: ServerConfig,
    listeners: Listeners,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            config: ServerConfig {
                host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                port: 0,
                ephemeral: false,
                backend: Backend::default(),
                pool: None,
                charset: Charset::default(),
                backlog: DEFAULT_BACKLOG,
                poll_interval: DEFAULT_POLL_INTERVAL,
                idle_timeout: DEFAULT_IDLE_TIMEOUT,
                shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            },
            listeners: Listeners::default(),
        }
    }

    /// Creates a builder from the defaults overlaid with the environment.
    ///
    /// Recognized variables:
    /// - `CONDUIT_HOST`, `CONDUIT_PORT`, `CONDUIT_BACKEND`,
    /// - `CONDUIT_POOL_CORE`, `CONDUIT_POOL_MAX`, `CONDUIT_POOL_QUEUE`,
    ///   `CONDUIT_POOL_KEEPALIVE_SECS`,
    /// - `CONDUIT_POLL_INTERVAL_MS`, `CONDUIT_IDLE_TIMEOUT_MS`.
    ///
    /// Unset variables keep the default; unparsable ones are ignored with
    /// a warning.
    pub fn from_env() -> Self {
        let mut builder = Self::new();
        let config = &mut builder.config;

        if let Some(host) = parsed::<IpAddr>("CONDUIT_HOST") {
            config.host = host;
        }
        if let Some(port) = parsed::<u16>("CONDUIT_PORT") {
            config.port = port;
        }
        if let Some(backend) = parsed::<Backend>("CONDUIT_BACKEND") {
            config.backend = backend;
        }

        let pool_vars = [
            "CONDUIT_POOL_CORE",
            "CONDUIT_POOL_MAX",
            "CONDUIT_POOL_QUEUE",
            "CONDUIT_POOL_KEEPALIVE_SECS",
        ];
        if pool_vars.iter().any(|key| std::env::var_os(key).is_some()) {
            let base = PoolConfig::auto();

            let core = env_get("CONDUIT_POOL_CORE", base.core_size()).max(1);
            let max = env_get("CONDUIT_POOL_MAX", base.max_size()).max(core);
            let queue = env_get("CONDUIT_POOL_QUEUE", base.queue_capacity()).max(1);
            let keep_alive = env_get("CONDUIT_POOL_KEEPALIVE_SECS", base.keep_alive().as_secs());

            config.pool = Some(
                PoolConfig::new(core, max)
                    .with_queue_capacity(queue)
                    .with_keep_alive(Duration::from_secs(keep_alive)),
            );
        }

        if let Some(ms) = parsed::<u64>("CONDUIT_POLL_INTERVAL_MS").filter(|ms| *ms > 0) {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = parsed::<u64>("CONDUIT_IDLE_TIMEOUT_MS").filter(|ms| *ms > 0) {
            config.idle_timeout = Duration::from_millis(ms);
        }

        builder
    }

    /// Sets the port to listen on. `0` leaves the server unbound.
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self.config.ephemeral = false;
        self
    }

    /// Listens on a port picked by the operating system.
    ///
    /// The chosen address is passed to start listeners and returned by
    /// [`Server::local_addr`].
    pub fn ephemeral(mut self) -> Self {
        self.config.port = 0;
        self.config.ephemeral = true;
        self
    }

    pub fn host(mut self, host: IpAddr) -> Self {
        self.config.host = host;
        self
    }

    /// Sets the worker pool sizing. Without it, [`PoolConfig::auto`] is used.
    pub fn pool(mut self, pool: PoolConfig) -> Self {
        self.config.pool = Some(pool);
        self
    }

    pub fn backend(mut self, backend: Backend) -> Self {
        self.config.backend = backend;
        self
    }

    /// Sets the charset of every connection's reader and writer.
    pub fn charset(mut self, charset: Charset) -> Self {
        self.config.charset = charset;
        self
    }

    /// Sets the listen backlog.
    ///
    /// # Panics
    ///
    /// Panics if `backlog == 0`.
    pub fn backlog(mut self, backlog: u32) -> Self {
        assert!(backlog > 0, "backlog must be > 0");

        self.config.backlog = backlog;
        self
    }

    /// Sets the longest the service loop blocks before re-checking
    /// whether the server was stopped.
    ///
    /// # Panics
    ///
    /// Panics if `interval` is zero.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        assert!(!interval.is_zero(), "poll_interval must be > 0");

        self.config.poll_interval = interval;
        self
    }

    /// Sets how long a blocking-backend connection may wait for input
    /// before it is closed.
    ///
    /// # Panics
    ///
    /// Panics if `timeout` is zero.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        assert!(!timeout.is_zero(), "idle_timeout must be > 0");

        self.config.idle_timeout = timeout;
        self
    }

    /// Sets how long `stop()` waits for pool workers before forcing.
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.shutdown_timeout = timeout;
        self
    }

    /// Adds a listener called once after binding, before the loop runs.
    ///
    /// It receives the bound address, or `None` for an unbound server.
    pub fn on_start<F>(mut self, listener: F) -> Self
    where
        F: Fn(Option<SocketAddr>) + Send + Sync + 'static,
    {
        self.listeners.start.push(Box::new(listener));
        self
    }

    /// Adds a listener called for every accepted connection.
    ///
    /// Connect listeners run on the loop thread, so they should be quick;
    /// one taking more than 10 ms is reported.
    pub fn on_connect<F>(mut self, listener: F) -> Self
    where
        F: Fn(&Connection) + Send + Sync + 'static,
    {
        self.listeners.connect.push(Box::new(listener));
        self
    }

    pub fn build<H>(self, handler: H) -> Server
    where
        H: Handler,
    {
        Server::new(self.config, self.listeners, handler)
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads and parses `key`, warning when it is set but malformed.
fn parsed<T>(key: &str) -> Option<T>
where
    T: std::str::FromStr,
{
    let value = env_get_opt::<T>(key);

    if value.is_none() && std::env::var_os(key).is_some() {
        warn!(key, "ignoring malformed environment variable");
    }

    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbound_by_default() {
        let builder = ServerBuilder::new();
        assert_eq!(builder.config.address(), None);
        assert_eq!(builder.config.backend, Backend::Reactor);

        let builder = builder.ephemeral();
        let address = builder.config.address().unwrap();
        assert_eq!(address.port(), 0);
        assert!(address.ip().is_unspecified());

        let builder = builder.host(IpAddr::V4(Ipv4Addr::LOCALHOST)).port(9000);
        assert_eq!(
            builder.config.address(),
            Some("127.0.0.1:9000".parse().unwrap())
        );
    }

    #[test]
    fn environment_overlay() {
        unsafe {
            std::env::set_var("CONDUIT_PORT", "7123");
            std::env::set_var("CONDUIT_BACKEND", "blocking");
            std::env::set_var("CONDUIT_POOL_CORE", "3");
            std::env::set_var("CONDUIT_POOL_MAX", "2");
            std::env::set_var("CONDUIT_POLL_INTERVAL_MS", "not-a-number");
        }

        let config = ServerBuilder::from_env().config;

        unsafe {
            for key in [
                "CONDUIT_PORT",
                "CONDUIT_BACKEND",
                "CONDUIT_POOL_CORE",
                "CONDUIT_POOL_MAX",
                "CONDUIT_POLL_INTERVAL_MS",
            ] {
                std::env::remove_var(key);
            }
        }

        assert_eq!(config.port, 7123);
        assert_eq!(config.backend, Backend::Blocking);
        assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL);

        let pool = config.pool.unwrap();
        assert_eq!(pool.core_size(), 3);
        assert_eq!(pool.max_size(), 3);
    }

    #[test]
    #[should_panic(expected = "poll_interval must be > 0")]
    fn rejects_zero_poll_interval() {
        let _ = ServerBuilder::new().poll_interval(Duration::ZERO);
    }
}
