//! # Conduit
//!
//! **Conduit** is a TCP connection engine. A single reactor thread watches
//! every socket for readiness, a bounded worker pool does the actual
//! reading, application work and writing, and each connection is exposed
//! as a buffered duplex stream suited to both binary and line-oriented
//! protocols.
//!
//! It offers:
//!
//! - A **reactor backend** over `epoll` (Linux) or `poll(2)` (other Unix),
//!   and a **blocking backend** running one pool task per connection
//! - A **bounded worker pool** with core/max sizing and discard-oldest
//!   backpressure
//! - **Buffered streams** with peek, pushback, line reads and delimiter
//!   scans on the read side, and partial-write retention on the write side
//! - **Per-connection dispatch guards** so reads and writes of the same
//!   connection never run twice at once
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use conduit::{Connection, ServerBuilder};
//!
//! fn main() -> conduit::Result<()> {
//!     let server = ServerBuilder::new()
//!         .port(7000)
//!         .on_start(|address| println!("listening on {address:?}"))
//!         .build(|connection: &Connection| {
//!             let line = connection.reader().read_line(None)?;
//!
//!             if let Some(line) = line {
//!                 let mut writer = connection.writer();
//!                 writer.println(&line);
//!                 writer.flush()?;
//!             }
//!             Ok(())
//!         });
//!
//!     server.start()
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`Server`] owns the pool and the backend, and runs start and connect
//!   listeners
//! - [`Connection`] couples a [`StreamReader`] and a [`StreamWriter`] with
//!   a keep-alive flag and the dispatch guards
//! - [`Handler`] is the application hook called when input arrives
//!
//! ## Logging
//!
//! Conduit logs through [`tracing`]. Lifecycle events are emitted at
//! `info`, per-connection events and load shedding at `debug`, handler
//! failures and slow listeners at `warn`.

pub mod buffer;
pub mod net;
pub mod pool;
pub mod server;
pub mod service;
pub mod stream;

mod error;
mod reactor;
mod utils;

pub use error::{Error, Result};
pub use net::{Connection, ConnectionKey, DispatchGuard};
pub use pool::{PoolConfig, PoolStats, WorkerPool};
pub use server::{Handler, Server, ServerBuilder};
pub use service::{Backend, UnknownBackend};
pub use stream::{Charset, Source, StreamReader, StreamWriter};
