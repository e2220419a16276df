/// A readiness event reported by the poller.
///
/// Errors and hang-ups are folded into `readable`, so the next read
/// observes them.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Event {
    /// Token the descriptor was registered with.
    pub(crate) token: usize,

    pub(crate) readable: bool,

    pub(crate) writable: bool,
}
