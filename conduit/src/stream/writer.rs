use super::Charset;
use crate::buffer::OutputBuffer;
use crate::error::Result;

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Callback used by reactor-attached writers to request write interest.
pub(crate) type FlushHook = Arc<dyn Fn() + Send + Sync>;

/// Where pending bytes go on [`StreamWriter::flush`].
enum Target {
    /// Bytes are written synchronously to the sink.
    Sink(Box<dyn Write + Send>),

    /// Bytes leave through the reactor when the socket is writable.
    Reactor(Option<FlushHook>),
}

/// The write half of a connection's duplex stream.
///
/// Writes only accumulate into an [`OutputBuffer`]. What `flush` does
/// depends on how the writer was created:
/// - a sink-backed writer pushes everything to the sink immediately;
/// - a reactor-attached writer leaves transmission to the reactor, which
///   sends when the socket is writable, and only asks it to look again.
///
/// The pending byte count is mirrored in a shared counter so the backend
/// can tell whether output is queued without taking the writer's lock.
pub struct StreamWriter {
    output: OutputBuffer,
    queued: Arc<AtomicUsize>,
    target: Target,
    charset: Charset,
}

impl StreamWriter {
    /// Creates a writer that flushes into `sink`.
    pub fn from_sink<W>(sink: W) -> Self
    where
        W: Write + Send + 'static,
    {
        Self {
            output: OutputBuffer::new(),
            queued: Arc::new(AtomicUsize::new(0)),
            target: Target::Sink(Box::new(sink)),
            charset: Charset::default(),
        }
    }

    pub(crate) fn for_reactor(charset: Charset) -> Self {
        Self {
            output: OutputBuffer::new(),
            queued: Arc::new(AtomicUsize::new(0)),
            target: Target::Reactor(None),
            charset,
        }
    }

    /// Counter of pending bytes, kept current by every mutation.
    pub(crate) fn queued(&self) -> Arc<AtomicUsize> {
        self.queued.clone()
    }

    fn publish(&self) {
        self.queued.store(self.output.limit(), Ordering::Release);
    }

    /// Installs the hook a reactor-attached writer calls on `flush`.
    pub(crate) fn attach(&mut self, hook: FlushHook) {
        if let Target::Reactor(slot) = &mut self.target {
            *slot = Some(hook);
        }
    }

    /// Sets the charset used by [`print`](Self::print) and [`println`](Self::println).
    pub fn with_charset(mut self, charset: Charset) -> Self {
        self.charset = charset;
        self
    }

    pub fn charset(&self) -> Charset {
        self.charset
    }

    pub fn write(&mut self, bytes: &[u8]) {
        self.output.write(bytes);
        self.publish();
    }

    pub fn print(&mut self, text: &str) {
        let bytes = self.charset.encode(text);
        self.write(&bytes);
    }

    /// Like [`print`](Self::print), followed by `CRLF`.
    pub fn println(&mut self, text: &str) {
        self.print(text);
        self.write(b"\r\n");
    }

    pub fn pending(&self) -> &[u8] {
        self.output.pending()
    }

    pub fn has_pending(&self) -> bool {
        !self.output.is_empty()
    }

    /// Keeps the last `remaining` pending bytes after a partial write.
    ///
    /// Backends call this after every socket write that did not take all
    /// pending bytes.
    pub fn retain(&mut self, remaining: usize) {
        self.output.retain(remaining);
        self.publish();
    }

    pub fn flush(&mut self) -> Result<()> {
        match &mut self.target {
            Target::Sink(sink) => {
                if !self.output.is_empty() {
                    sink.write_all(self.output.pending())?;
                    self.output.clear();
                    self.queued.store(self.output.limit(), Ordering::Release);
                }
                sink.flush()?;
            }
            Target::Reactor(Some(hook)) if !self.output.is_empty() => (**hook)(),
            Target::Reactor(_) => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Shared(Arc<Mutex<Vec<u8>>>);

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn sink_writer_sends_on_flush_only() {
        let sink = Shared::default();
        let mut writer = StreamWriter::from_sink(sink.clone());

        writer.print("GET");
        writer.println(" /");
        assert!(sink.0.lock().unwrap().is_empty());

        writer.flush().unwrap();
        assert_eq!(&*sink.0.lock().unwrap(), b"GET /\r\n");
        assert!(!writer.has_pending());
    }

    #[test]
    fn reactor_writer_keeps_bytes_and_notifies() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let mut writer = StreamWriter::for_reactor(Charset::Utf8);
        writer.attach(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        writer.flush().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        writer.write(b"ping");
        writer.flush().unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(writer.pending(), b"ping");
    }

    #[test]
    fn queued_counter_follows_pending_bytes() {
        let mut writer = StreamWriter::from_sink(Shared::default());
        let queued = writer.queued();

        writer.println("abc");
        assert_eq!(queued.load(Ordering::Acquire), 5);

        writer.retain(2);
        assert_eq!(queued.load(Ordering::Acquire), 2);

        writer.flush().unwrap();
        assert_eq!(queued.load(Ordering::Acquire), 0);
    }
}
