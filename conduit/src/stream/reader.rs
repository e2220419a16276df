use super::{Charset, Source};
use crate::buffer::InputBuffer;
use crate::error::{Error, Result};

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Bytes pulled from a [`Source`] per refill.
const FILL_CHUNK: usize = 4096;

/// Input buffer shared between the delivering backend and the reader.
///
/// The backend appends through [`deliver`](Self::deliver); the reader
/// drains under the same lock and parks on `arrived` when it was asked to
/// wait for more.
pub(crate) struct Intake {
    buffer: Mutex<InputBuffer>,
    arrived: Condvar,
    closed: AtomicBool,
}

impl Intake {
    pub(crate) fn new() -> Self {
        Self {
            buffer: Mutex::new(InputBuffer::new()),
            arrived: Condvar::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, InputBuffer> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn deliver(&self, data: &[u8]) {
        self.lock().append(data);
        self.arrived.notify_all();
    }

    /// Marks the input as exhausted and wakes every waiting reader.
    pub(crate) fn close(&self) {
        let _buffer = self.lock();
        self.closed.store(true, Ordering::Release);
        self.arrived.notify_all();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Outcome of one attempt to obtain more input.
enum Fill {
    Data,
    Eof,
    TimedOut,
    /// A fed reader ran dry without a deadline while input is still open.
    Pending,
}

/// Outcome of reading or peeking a single byte.
enum Next {
    Byte(u8),
    Eof,
    TimedOut,
    Pending,
}

/// The read half of a connection's duplex stream.
///
/// A reader is either *source-backed*, refilling itself from a [`Source`]
/// whenever its buffer runs dry, or *fed*, in which case only the backend
/// adds bytes. A fed reader called without a timeout never waits: when it
/// runs dry while the peer may still send, byte reads report `None` and
/// line and delimiter reads leave the incomplete input in the buffer for the
/// next delivery. With a timeout it waits for the backend to deliver more or
/// for the connection to close.
///
/// All text operations decode with the reader's [`Charset`].
pub struct StreamReader {
    intake: Arc<Intake>,
    source: Option<Box<dyn Source>>,
    charset: Charset,
}

impl StreamReader {
    /// Creates a reader that pulls its bytes from `source`.
    pub fn from_source<S>(source: S) -> Self
    where
        S: Source + 'static,
    {
        Self {
            intake: Arc::new(Intake::new()),
            source: Some(Box::new(source)),
            charset: Charset::default(),
        }
    }

    pub(crate) fn fed(intake: Arc<Intake>, charset: Charset) -> Self {
        Self {
            intake,
            source: None,
            charset,
        }
    }

    pub(crate) fn intake(&self) -> Arc<Intake> {
        self.intake.clone()
    }

    /// Sets the charset used by [`read_line`](Self::read_line).
    pub fn with_charset(mut self, charset: Charset) -> Self {
        self.charset = charset;
        self
    }

    pub fn charset(&self) -> Charset {
        self.charset
    }

    /// Number of bytes buffered and not yet consumed.
    pub fn available(&self) -> usize {
        self.intake.lock().available()
    }

    /// Consumes one byte. `None` means end of input.
    pub fn read_byte(&mut self) -> Result<Option<u8>> {
        match self.next(None)? {
            Next::Byte(byte) => Ok(Some(byte)),
            Next::Eof | Next::TimedOut | Next::Pending => Ok(None),
        }
    }

    /// Returns the next byte without consuming it.
    pub fn peek(&mut self) -> Result<Option<u8>> {
        match self.look(None)? {
            Next::Byte(byte) => Ok(Some(byte)),
            Next::Eof | Next::TimedOut | Next::Pending => Ok(None),
        }
    }

    /// Un-consumes the byte returned by the previous read, if any.
    pub fn unread_byte(&mut self) {
        self.intake.lock().unread_byte();
    }

    /// Pushes `bytes` back in front of the current read position.
    ///
    /// # Errors
    ///
    /// [`Error::Overflow`] if the pushed bytes plus the unread tail exceed
    /// the buffer capacity.
    pub fn unread(&mut self, bytes: &[u8]) -> Result<()> {
        self.intake.lock().unread(bytes)
    }

    /// Copies buffered bytes into `buffer`, refilling once if none are
    /// buffered. Returns `0` at end of input.
    pub fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        if buffer.is_empty() {
            return Ok(0);
        }

        loop {
            {
                let mut input = self.intake.lock();
                let available = input.unread_bytes();

                if !available.is_empty() {
                    let n = available.len().min(buffer.len());
                    buffer[..n].copy_from_slice(&available[..n]);

                    for _ in 0..n {
                        input.take();
                    }
                    return Ok(n);
                }
            }

            match self.fill(None)? {
                Fill::Data => continue,
                Fill::Eof | Fill::TimedOut | Fill::Pending => return Ok(0),
            }
        }
    }

    /// Reads one line of text.
    ///
    /// `CRLF` and a bare `LF` terminate a line and are not returned. A `CR`
    /// followed by any other byte ends the line at the `CR`; the other byte
    /// stays in the stream.
    ///
    /// Returns `Ok(None)` at end of input with nothing accumulated. If
    /// `timeout` elapses after some bytes were accumulated, those bytes are
    /// returned as the line; if it elapses with nothing accumulated the
    /// result is [`Error::Timeout`].
    ///
    /// A fed reader called without a timeout that runs out of bytes before
    /// a terminator, including right after a `CR`, pushes what it consumed
    /// back and returns `Ok(None)`. The line is completed by a later call
    /// once more input was delivered.
    pub fn read_line(&mut self, timeout: Option<Duration>) -> Result<Option<String>> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut line = Vec::new();

        loop {
            match self.next(deadline)? {
                Next::Byte(b'\n') => break,
                Next::Byte(b'\r') => match self.look(deadline)? {
                    Next::Byte(b'\n') => {
                        self.intake.lock().take();
                        break;
                    }
                    Next::Pending => {
                        line.push(b'\r');
                        self.unread(&line)?;
                        return Ok(None);
                    }
                    _ => break,
                },
                Next::Byte(byte) => line.push(byte),
                Next::Pending => {
                    self.unread(&line)?;
                    return Ok(None);
                }
                Next::Eof if line.is_empty() => return Ok(None),
                Next::TimedOut if line.is_empty() => {
                    return match timeout {
                        Some(timeout) => Err(Error::Timeout(timeout)),
                        None => Ok(None),
                    };
                }
                Next::Eof | Next::TimedOut => break,
            }
        }

        Ok(Some(self.charset.decode(&line)))
    }

    /// Copies bytes into `buffer` until `delimiter` is matched, `buffer` is
    /// full, or input ends. A full buffer returns at once unless a partial
    /// match is pending, which is completed or abandoned first.
    ///
    /// The sign of the result tells which: `-n` means the delimiter was
    /// found after `n` bytes were written (the stream is positioned just
    /// after the delimiter); `n >= 0` means the buffer filled or input ended
    /// first. The delimiter itself is never written to `buffer`.
    ///
    /// A partial match that fails is not lost: its first byte is written to
    /// `buffer` and the rest is pushed back and scanned again. At end of
    /// input a pending partial match is written out as room permits. When the
    /// timeout elapses, or a fed reader runs dry without one, a pending
    /// partial match is pushed back so a later call can complete it.
    ///
    /// # Errors
    ///
    /// - [`Error::EmptyDelimiter`] for an empty delimiter,
    /// - [`Error::BufferTooSmall`] when `buffer` is shorter than `delimiter`,
    /// - [`Error::Timeout`] when the timeout elapses before any progress.
    pub fn read_until(
        &mut self,
        buffer: &mut [u8],
        delimiter: &[u8],
        timeout: Option<Duration>,
    ) -> Result<isize> {
        if delimiter.is_empty() {
            return Err(Error::EmptyDelimiter);
        }
        if buffer.len() < delimiter.len() {
            return Err(Error::BufferTooSmall {
                len: buffer.len(),
                delimiter: delimiter.len(),
            });
        }

        let deadline = timeout.map(|t| Instant::now() + t);
        let mut written = 0;
        let mut matched = 0;

        loop {
            if written == buffer.len() && matched == 0 {
                return Ok(written as isize);
            }

            let byte = match self.next(deadline)? {
                Next::Byte(byte) => byte,
                Next::Eof => {
                    let room = (buffer.len() - written).min(matched);
                    buffer[written..written + room].copy_from_slice(&delimiter[..room]);
                    written += room;

                    if room < matched {
                        self.unread(&delimiter[room..matched])?;
                    }
                    return Ok(written as isize);
                }
                Next::TimedOut | Next::Pending => {
                    if matched > 0 {
                        self.unread(&delimiter[..matched])?;
                    }
                    return match timeout {
                        Some(timeout) if written == 0 => Err(Error::Timeout(timeout)),
                        _ => Ok(written as isize),
                    };
                }
            };

            if byte == delimiter[matched] {
                matched += 1;
                if matched == delimiter.len() {
                    return Ok(-(written as isize));
                }
                continue;
            }

            if written == buffer.len() {
                let mut rest = delimiter[..matched].to_vec();
                rest.push(byte);
                self.unread(&rest)?;
                return Ok(written as isize);
            }

            if matched == 0 {
                buffer[written] = byte;
                written += 1;
                continue;
            }

            buffer[written] = delimiter[0];
            written += 1;

            let mut rescan = delimiter[1..matched].to_vec();
            rescan.push(byte);
            self.unread(&rescan)?;
            matched = 0;
        }
    }

    /// Blocks until at least one byte can be read.
    ///
    /// # Errors
    ///
    /// [`Error::Timeout`] once `timeout` elapses, [`Error::Closed`] if input
    /// ends first.
    pub fn wait_for_data(&mut self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;

        loop {
            if !self.intake.lock().is_empty() {
                return Ok(());
            }

            match self.fill(Some(deadline))? {
                Fill::Data => continue,
                Fill::Eof => return Err(Error::Closed),
                Fill::TimedOut | Fill::Pending => return Err(Error::Timeout(timeout)),
            }
        }
    }

    /// Returns whether a byte can be read without blocking.
    pub fn has_data(&mut self) -> Result<bool> {
        if !self.intake.lock().is_empty() {
            return Ok(true);
        }

        match self.fill(Some(Instant::now()))? {
            Fill::Data => Ok(true),
            Fill::Eof | Fill::TimedOut | Fill::Pending => Ok(false),
        }
    }

    /// Consumes the next byte, refilling as needed.
    fn next(&mut self, deadline: Option<Instant>) -> Result<Next> {
        loop {
            if let Some(byte) = self.intake.lock().take() {
                return Ok(Next::Byte(byte));
            }

            match self.fill(deadline)? {
                Fill::Data => continue,
                Fill::Eof => return Ok(Next::Eof),
                Fill::TimedOut => return Ok(Next::TimedOut),
                Fill::Pending => return Ok(Next::Pending),
            }
        }
    }

    /// Like [`next`](Self::next) but leaves the byte in the buffer.
    fn look(&mut self, deadline: Option<Instant>) -> Result<Next> {
        loop {
            if let Some(&byte) = self.intake.lock().unread_bytes().first() {
                return Ok(Next::Byte(byte));
            }

            match self.fill(deadline)? {
                Fill::Data => continue,
                Fill::Eof => return Ok(Next::Eof),
                Fill::TimedOut => return Ok(Next::TimedOut),
                Fill::Pending => return Ok(Next::Pending),
            }
        }
    }

    /// Obtains more input, waiting at most until `deadline`.
    fn fill(&mut self, deadline: Option<Instant>) -> Result<Fill> {
        let Some(source) = self.source.as_mut() else {
            return Ok(wait_for_delivery(&self.intake, deadline));
        };

        if self.intake.is_closed() {
            return Ok(Fill::Eof);
        }

        let timeout = deadline.map(|d| d.saturating_duration_since(Instant::now()));
        let mut chunk = [0u8; FILL_CHUNK];

        loop {
            match source.read_timeout(&mut chunk, timeout) {
                Ok(0) => {
                    self.intake.close();
                    return Ok(Fill::Eof);
                }
                Ok(n) => {
                    self.intake.deliver(&chunk[..n]);
                    return Ok(Fill::Data);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) =>
                {
                    return Ok(Fill::TimedOut);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Waits on a fed reader's intake for the backend to deliver bytes.
fn wait_for_delivery(intake: &Intake, deadline: Option<Instant>) -> Fill {
    let mut buffer = intake.lock();

    loop {
        if !buffer.is_empty() {
            return Fill::Data;
        }
        if intake.is_closed() {
            return Fill::Eof;
        }
        let Some(deadline) = deadline else {
            return Fill::Pending;
        };

        let now = Instant::now();
        if now >= deadline {
            return Fill::TimedOut;
        }

        let (guard, _) = intake
            .arrived
            .wait_timeout(buffer, deadline - now)
            .unwrap_or_else(PoisonError::into_inner);
        buffer = guard;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::thread;

    fn reader(bytes: &[u8]) -> StreamReader {
        StreamReader::from_source(Cursor::new(bytes.to_vec()))
    }

    #[test]
    fn cr_followed_by_other_byte_ends_line() {
        let mut reader = reader(b"abc\rdef");

        assert_eq!(reader.read_line(None).unwrap().as_deref(), Some("abc"));
        assert_eq!(reader.read_line(None).unwrap().as_deref(), Some("def"));
        assert_eq!(reader.read_line(None).unwrap(), None);
    }

    #[test]
    fn fed_reader_reports_eof_when_drained() {
        let intake = Arc::new(Intake::new());
        let mut reader = StreamReader::fed(intake.clone(), Charset::Utf8);

        intake.deliver(b"x");
        assert_eq!(reader.read_byte().unwrap(), Some(b'x'));
        assert_eq!(reader.read_byte().unwrap(), None);
    }

    #[test]
    fn fed_reader_waits_for_delivery() {
        let intake = Arc::new(Intake::new());
        let mut reader = StreamReader::fed(intake.clone(), Charset::Utf8);

        let producer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            intake.deliver(b"late\n");
        });

        let line = reader.read_line(Some(Duration::from_secs(2))).unwrap();
        assert_eq!(line.as_deref(), Some("late"));

        producer.join().unwrap();
    }

    #[test]
    fn fed_reader_wait_sees_close() {
        let intake = Arc::new(Intake::new());
        let mut reader = StreamReader::fed(intake.clone(), Charset::Utf8);

        intake.close();

        let err = reader.wait_for_data(Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, Error::Closed));
    }

    #[test]
    fn read_copies_what_is_buffered() {
        let mut reader = reader(b"binary\x00data");
        let mut buffer = [0u8; 32];

        let n = reader.read(&mut buffer).unwrap();
        assert_eq!(&buffer[..n], b"binary\x00data");
        assert_eq!(reader.read(&mut buffer).unwrap(), 0);
    }

    #[test]
    fn fed_reader_keeps_line_split_after_cr() {
        let intake = Arc::new(Intake::new());
        let mut reader = StreamReader::fed(intake.clone(), Charset::Utf8);

        intake.deliver(b"abc\r");
        assert_eq!(reader.read_line(None).unwrap(), None);
        assert_eq!(reader.available(), 4);

        intake.deliver(b"\ndef\r\nxy");
        assert_eq!(reader.read_line(None).unwrap().as_deref(), Some("abc"));
        assert_eq!(reader.read_line(None).unwrap().as_deref(), Some("def"));
        assert_eq!(reader.read_line(None).unwrap(), None);
        assert_eq!(reader.available(), 2);

        intake.close();
        assert_eq!(reader.read_line(None).unwrap().as_deref(), Some("xy"));
        assert_eq!(reader.read_line(None).unwrap(), None);
    }

    #[test]
    fn fed_reader_keeps_partial_delimiter() {
        let intake = Arc::new(Intake::new());
        let mut reader = StreamReader::fed(intake.clone(), Charset::Utf8);
        let mut buffer = [0u8; 16];

        intake.deliver(b"ab\r");
        assert_eq!(reader.read_until(&mut buffer, b"\r\n", None).unwrap(), 2);
        assert_eq!(&buffer[..2], b"ab");
        assert_eq!(reader.available(), 1);

        reader.unread(b"ab").unwrap();
        intake.deliver(b"\n");
        assert_eq!(reader.read_until(&mut buffer, b"\r\n", None).unwrap(), -2);
        assert_eq!(&buffer[..2], b"ab");
    }
}
