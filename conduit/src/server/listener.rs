use crate::net::Connection;

use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use tracing::warn;

/// Listener run once the server is bound, before the service loop starts.
pub(crate) type StartListener = Box<dyn Fn(Option<SocketAddr>) + Send + Sync>;

/// Listener run for every accepted connection, on the loop thread.
pub(crate) type ConnectListener = Box<dyn Fn(&Connection) + Send + Sync>;

/// A listener taking longer than this delays every other connection.
const SLOW_LISTENER: Duration = Duration::from_millis(10);

/// Start and connect listeners of a server, in registration order.
#[derive(Default)]
pub(crate) struct Listeners {
    pub(crate) start: Vec<StartListener>,
    pub(crate) connect: Vec<ConnectListener>,
}

impl Listeners {
    pub(crate) fn fire_start(&self, address: Option<SocketAddr>) {
        for (index, listener) in self.start.iter().enumerate() {
            timed("start", index, || listener(address));
        }
    }

    pub(crate) fn fire_connect(&self, connection: &Connection) {
        for (index, listener) in self.connect.iter().enumerate() {
            timed("connect", index, || listener(connection));
        }
    }
}

/// Runs a listener, containing panics and reporting slow calls.
fn timed(kind: &'static str, index: usize, call: impl FnOnce()) {
    let started = Instant::now();

    if panic::catch_unwind(AssertUnwindSafe(call)).is_err() {
        warn!(kind, index, "listener panicked");
    }

    let elapsed = started.elapsed();
    if elapsed > SLOW_LISTENER {
        warn!(kind, index, ?elapsed, "slow listener is stalling the loop thread");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::Mutex;

    #[test]
    fn fires_in_registration_order_and_survives_panics() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut listeners = Listeners::default();

        for i in 0..3 {
            let calls = calls.clone();
            listeners.start.push(Box::new(move |address| {
                assert!(address.is_none());
                calls.lock().unwrap().push(i);
                if i == 1 {
                    panic!("listener failure");
                }
            }));
        }

        listeners.fire_start(None);
        assert_eq!(*calls.lock().unwrap(), vec![0, 1, 2]);
    }
}
