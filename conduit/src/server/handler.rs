use crate::error::Result;
use crate::net::Connection;

/// Application logic run for a connection whenever input arrives.
///
/// With the reactor backend, `service` is called once per batch of bytes
/// delivered, on a pool thread, and reads without a timeout never wait for
/// more input:
/// - [`read_line`](crate::StreamReader::read_line) returns `Ok(None)` and
///   keeps an unterminated line buffered, a trailing `CR` included;
/// - [`read_until`](crate::StreamReader::read_until) returns what it copied
///   and keeps a partial delimiter match buffered.
///
/// A handler that finds an incomplete message should push the bytes it
/// consumed back with [`StreamReader::unread`](crate::StreamReader::unread)
/// and return `Ok(())`; it is called again when more input arrives.
///
/// With the blocking backend, `service` is called whenever input is
/// available and may block on reads.
///
/// Returning an error, or panicking, closes the connection.
///
/// Any `Fn(&Connection) -> Result<()>` closure is a handler.
pub trait Handler: Send + Sync + 'static {
    fn service(&self, connection: &Connection) -> Result<()>;
}

impl<F> Handler for F
where
    F: Fn(&Connection) -> Result<()> + Send + Sync + 'static,
{
    fn service(&self, connection: &Connection) -> Result<()> {
        self(connection)
    }
}
