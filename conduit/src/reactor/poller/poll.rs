//! `poll(2)`-based poller for Unix targets without `epoll`.
//!
//! Mirrors the `epoll` poller's interface. Registrations live in a map
//! that is turned into a `pollfd` array on every call, and wake-ups go
//! through a non-blocking pipe.

use super::common::{Interest, Waker};
use super::platform::sys_set_nonblocking;
use crate::reactor::event::Event;

use libc::{POLLERR, POLLHUP, POLLIN, POLLNVAL, POLLOUT, nfds_t, pollfd};
use std::collections::HashMap;
use std::io;
use std::os::fd::RawFd;
use std::sync::Arc;
use std::time::Duration;

/// Portable readiness poller.
///
/// This poller owns:
/// - a registry of monitored sockets,
/// - the read end of the wake-up pipe (the [`Waker`] owns the write end),
/// - a reusable `pollfd` buffer.
pub(crate) struct PollPoller {
    /// Registered sockets: `fd -> (token, interest)`.
    registry: HashMap<RawFd, (usize, Interest)>,

    wake_recv: RawFd,
    waker: Arc<Waker>,
    fds: Vec<pollfd>,
}

unsafe impl Send for PollPoller {}

impl Waker {
    /// Wakes the poller by writing one byte into the pipe.
    pub(crate) fn wake(&self) {
        let buf = [1u8; 1];
        unsafe {
            libc::write(self.0, buf.as_ptr() as *const _, 1);
        }
    }
}

impl PollPoller {
    pub(crate) fn new() -> io::Result<Self> {
        let mut pipe = [0 as RawFd; 2];
        if unsafe { libc::pipe(pipe.as_mut_ptr()) } < 0 {
            return Err(io::Error::last_os_error());
        }

        let [wake_recv, wake_send] = pipe;
        let waker = Arc::new(Waker(wake_send));

        for fd in pipe {
            if let Err(e) = sys_set_nonblocking(fd, true) {
                unsafe { libc::close(wake_recv) };
                return Err(e);
            }
        }

        Ok(Self {
            registry: HashMap::new(),
            wake_recv,
            waker,
            fds: Vec::new(),
        })
    }

    pub(crate) fn waker(&self) -> Arc<Waker> {
        self.waker.clone()
    }

    pub(crate) fn register(&mut self, fd: RawFd, token: usize, interest: Interest) -> io::Result<()> {
        if self.registry.insert(fd, (token, interest)).is_some() {
            return Err(io::Error::from(io::ErrorKind::AlreadyExists));
        }
        Ok(())
    }

    pub(crate) fn reregister(
        &mut self,
        fd: RawFd,
        token: usize,
        interest: Interest,
    ) -> io::Result<()> {
        match self.registry.get_mut(&fd) {
            Some(entry) => {
                *entry = (token, interest);
                Ok(())
            }
            None => Err(io::Error::from(io::ErrorKind::NotFound)),
        }
    }

    pub(crate) fn deregister(&mut self, fd: RawFd) -> io::Result<()> {
        match self.registry.remove(&fd) {
            Some(_) => Ok(()),
            None => Err(io::Error::from(io::ErrorKind::NotFound)),
        }
    }

    /// Waits for readiness events.
    ///
    /// Returns when a registered socket is ready, the waker fires, or the
    /// timeout expires.
    pub(crate) fn poll(
        &mut self,
        events: &mut Vec<Event>,
        timeout: Option<Duration>,
    ) -> io::Result<()> {
        events.clear();
        self.fds.clear();

        self.fds.push(pollfd {
            fd: self.wake_recv,
            events: POLLIN,
            revents: 0,
        });

        for (&fd, &(_, interest)) in &self.registry {
            let mut ev = 0;
            if interest.read {
                ev |= POLLIN;
            }
            if interest.write {
                ev |= POLLOUT;
            }

            self.fds.push(pollfd {
                fd,
                events: ev,
                revents: 0,
            });
        }

        let timeout_ms = timeout
            .map(|t| t.as_millis().min(i32::MAX as u128) as i32)
            .unwrap_or(-1);

        let rc = unsafe { libc::poll(self.fds.as_mut_ptr(), self.fds.len() as nfds_t, timeout_ms) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(err);
        }

        if self.fds[0].revents & POLLIN != 0 {
            let mut buf = [0u8; 64];
            while unsafe { libc::read(self.wake_recv, buf.as_mut_ptr() as *mut _, buf.len()) } > 0
            {}
        }

        for pfd in self.fds.iter().skip(1) {
            let re = pfd.revents;
            if re == 0 {
                continue;
            }

            if let Some(&(token, _)) = self.registry.get(&pfd.fd) {
                events.push(Event {
                    token,
                    readable: re & (POLLIN | POLLERR | POLLHUP | POLLNVAL) != 0,
                    writable: re & (POLLOUT | POLLERR | POLLHUP) != 0,
                });
            }
        }

        Ok(())
    }
}

impl Drop for PollPoller {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.wake_recv);
        }
    }
}
