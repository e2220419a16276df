//! Buffered duplex stream over a connection.
//!
//! A connection is read through a [`StreamReader`] and written through a
//! [`StreamWriter`]. The reader offers byte, line and delimiter reads with
//! peek and pushback; the writer accumulates bytes and text until a flush
//! or until the reactor finds the socket writable.
//!
//! Protocol code built on top of a connection should only use these two
//! types and never reach into the buffers behind them.

mod charset;
mod reader;
mod source;
mod writer;

pub use charset::{Charset, UnknownCharset};
pub use reader::StreamReader;
pub use source::Source;
pub use writer::StreamWriter;

pub(crate) use reader::Intake;
pub(crate) use writer::FlushHook;
