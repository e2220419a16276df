use std::io::{self, Cursor, Read};
use std::net::TcpStream;
use std::time::Duration;

/// Where a source-backed [`StreamReader`](super::StreamReader) pulls bytes from.
///
/// `Ok(0)` means the source is exhausted. A source that cannot produce data
/// within `timeout` reports `WouldBlock` or `TimedOut`. A zero timeout asks
/// for a non-blocking attempt, `None` for an unbounded wait.
pub trait Source: Send {
    fn read_timeout(&mut self, buffer: &mut [u8], timeout: Option<Duration>) -> io::Result<usize>;
}

impl Source for TcpStream {
    fn read_timeout(&mut self, buffer: &mut [u8], timeout: Option<Duration>) -> io::Result<usize> {
        match timeout {
            Some(timeout) if timeout.is_zero() => {
                self.set_nonblocking(true)?;
                let result = self.read(buffer);
                self.set_nonblocking(false)?;
                result
            }
            timeout => {
                self.set_read_timeout(timeout)?;
                self.read(buffer)
            }
        }
    }
}

/// In-memory source, mostly useful for protocol tests.
impl<T> Source for Cursor<T>
where
    T: AsRef<[u8]> + Send,
{
    fn read_timeout(&mut self, buffer: &mut [u8], _: Option<Duration>) -> io::Result<usize> {
        self.read(buffer)
    }
}
