//! Connection identity and the per-connection state shared between the
//! application and the backends.

mod connection;
mod key;

pub use connection::{Connection, DispatchGuard};
pub use key::ConnectionKey;
