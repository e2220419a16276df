use super::ConnectionKey;
use crate::error::Result;
use crate::stream::{Charset, Intake, StreamReader, StreamWriter};

use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// A TCP connection as seen by application code.
///
/// A `Connection` binds a [`ConnectionKey`] to one [`StreamReader`] and one
/// [`StreamWriter`]. It also carries the keep-alive policy and the two
/// dispatch guards backends use to keep at most one read task and at most
/// one write task in flight per connection.
///
/// The reader and writer sit behind independent locks, so a read task and
/// a write task for the same connection can run at the same time.
pub struct Connection {
    key: ConnectionKey,
    intake: Arc<Intake>,
    queued: Arc<AtomicUsize>,
    reader: Mutex<StreamReader>,
    writer: Mutex<StreamWriter>,
    keep_alive: AtomicBool,
    reading: AtomicBool,
    writing: AtomicBool,
    closed: AtomicBool,
}

impl Connection {
    /// Assembles a connection from an existing reader and writer.
    pub fn from_parts(key: ConnectionKey, reader: StreamReader, writer: StreamWriter) -> Self {
        Self {
            key,
            intake: reader.intake(),
            queued: writer.queued(),
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            keep_alive: AtomicBool::new(true),
            reading: AtomicBool::new(false),
            writing: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// A connection whose input is delivered by the reactor.
    pub(crate) fn fed(key: ConnectionKey, charset: Charset) -> Self {
        let intake = Arc::new(Intake::new());
        let reader = StreamReader::fed(intake, charset);
        let writer = StreamWriter::for_reactor(charset);

        Self::from_parts(key, reader, writer)
    }

    /// A connection reading and writing a blocking socket directly.
    pub(crate) fn over_socket(
        key: ConnectionKey,
        stream: TcpStream,
        charset: Charset,
    ) -> io::Result<Self> {
        let reader = StreamReader::from_source(stream.try_clone()?).with_charset(charset);
        let writer = StreamWriter::from_sink(stream).with_charset(charset);

        Ok(Self::from_parts(key, reader, writer))
    }

    /// Opens an outbound connection.
    ///
    /// Every address `address` resolves to is tried in turn, each bounded by
    /// `timeout` when given. The resulting
    /// connection's reader blocks on the socket when its buffer is empty and
    /// its writer sends on [`StreamWriter::flush`].
    pub fn connect<A>(address: A, timeout: Option<Duration>, charset: Charset) -> Result<Self>
    where
        A: ToSocketAddrs,
    {
        let mut last_error = None;

        for addr in address.to_socket_addrs()? {
            let attempt = match timeout {
                Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
                None => TcpStream::connect(addr),
            };

            match attempt {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    let key = ConnectionKey::new(stream.local_addr()?, stream.peer_addr()?);
                    return Ok(Self::over_socket(key, stream, charset)?);
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(last_error
            .unwrap_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, "address resolved to nothing")
            })
            .into())
    }

    pub fn key(&self) -> ConnectionKey {
        self.key
    }

    /// Locks and returns the reader.
    pub fn reader(&self) -> MutexGuard<'_, StreamReader> {
        self.reader.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Locks and returns the writer.
    pub fn writer(&self) -> MutexGuard<'_, StreamWriter> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive.load(Ordering::Acquire)
    }

    /// With keep-alive off, the backend closes the socket once the pending
    /// response has been sent.
    pub fn set_keep_alive(&self, keep_alive: bool) {
        self.keep_alive.store(keep_alive, Ordering::Release);
    }

    /// Whether output is waiting to be sent. Never blocks on the writer.
    pub fn has_sending_data(&self) -> bool {
        self.queued.load(Ordering::Acquire) > 0
    }

    pub fn is_reading(&self) -> bool {
        self.reading.load(Ordering::Acquire)
    }

    pub fn is_writing(&self) -> bool {
        self.writing.load(Ordering::Acquire)
    }

    /// Claims the right to run a read task.
    ///
    /// Returns `None` if a read task already holds the claim. The claim is
    /// released when the returned guard is dropped.
    pub fn try_claim_read(self: &Arc<Self>) -> Option<DispatchGuard> {
        DispatchGuard::claim(self, Dispatch::Read)
    }

    /// Claims the right to run a write task. See [`try_claim_read`](Self::try_claim_read).
    pub fn try_claim_write(self: &Arc<Self>) -> Option<DispatchGuard> {
        DispatchGuard::claim(self, Dispatch::Write)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Whether the peer has finished sending.
    pub(crate) fn is_input_closed(&self) -> bool {
        self.intake.is_closed()
    }

    /// Appends inbound bytes to the input buffer. Backend use only.
    pub(crate) fn receive_data(&self, bytes: &[u8]) {
        self.intake.deliver(bytes);
    }

    /// Records that the peer stopped sending.
    pub(crate) fn close_input(&self) {
        self.intake.close();
    }

    /// Marks the connection closed and releases readers waiting on it.
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.intake.close();
    }

    fn flag(&self, dispatch: Dispatch) -> &AtomicBool {
        match dispatch {
            Dispatch::Read => &self.reading,
            Dispatch::Write => &self.writing,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Dispatch {
    Read,
    Write,
}

/// Exclusive claim on a connection's read or write side.
///
/// Obtained from [`Connection::try_claim_read`] or
/// [`Connection::try_claim_write`]. Dropping the guard, whether the task
/// finished, panicked or was discarded by the pool, clears the claim.
pub struct DispatchGuard {
    connection: Arc<Connection>,
    dispatch: Dispatch,
}

impl DispatchGuard {
    fn claim(connection: &Arc<Connection>, dispatch: Dispatch) -> Option<Self> {
        connection
            .flag(dispatch)
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                connection: connection.clone(),
                dispatch,
            })
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }
}

impl Drop for DispatchGuard {
    fn drop(&mut self) {
        self.connection
            .flag(self.dispatch)
            .store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> Arc<Connection> {
        let key = ConnectionKey::new(
            "127.0.0.1:40000".parse().unwrap(),
            "127.0.0.1:80".parse().unwrap(),
        );
        Arc::new(Connection::fed(key, Charset::Utf8))
    }

    #[test]
    fn claims_are_exclusive_per_side() {
        let connection = connection();

        let read = connection.try_claim_read().expect("first read claim");
        assert!(connection.try_claim_read().is_none());
        assert!(connection.is_reading());

        let write = connection.try_claim_write().expect("write is independent");
        assert!(connection.is_writing());

        drop(read);
        assert!(!connection.is_reading());
        assert!(connection.try_claim_read().is_some());

        drop(write);
        assert!(!connection.is_writing());
    }

    #[test]
    fn keep_alive_defaults_on() {
        let connection = connection();
        assert!(connection.keep_alive());

        connection.set_keep_alive(false);
        assert!(!connection.keep_alive());
    }

    #[test]
    fn received_data_reaches_reader() {
        let connection = connection();
        connection.receive_data(b"hi\r\n");

        let line = connection.reader().read_line(None).unwrap();
        assert_eq!(line.as_deref(), Some("hi"));
        assert!(!connection.has_sending_data());

        connection.writer().print("ok");
        assert!(connection.has_sending_data());
    }

    #[test]
    fn pending_output_visible_while_writer_is_held() {
        let connection = connection();

        let mut writer = connection.writer();
        writer.println("streaming");

        assert!(connection.has_sending_data());

        writer.retain(0);
        assert!(!connection.has_sending_data());
    }
}
