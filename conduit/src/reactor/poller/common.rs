use std::os::fd::RawFd;

/// Readiness a registration asks the poller to report.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Interest {
    pub(crate) read: bool,
    pub(crate) write: bool,
}

impl Interest {
    pub(crate) const READ: Interest = Interest {
        read: true,
        write: false,
    };

    pub(crate) fn is_empty(&self) -> bool {
        !self.read && !self.write
    }
}

/// Wakes a poller blocked in `poll()` from another thread.
///
/// Owns the descriptor written to (an `eventfd` on Linux, the write end of
/// a pipe elsewhere) and closes it on drop.
pub(crate) struct Waker(pub(crate) RawFd);

unsafe impl Send for Waker {}
unsafe impl Sync for Waker {}

impl Drop for Waker {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.0);
        }
    }
}
