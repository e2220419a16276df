//! Server lifecycle: configuration, start and stop, listeners, and the
//! application [`Handler`].

mod builder;
mod core;
mod handler;
mod listener;

pub use self::core::Server;
pub use builder::ServerBuilder;
pub use handler::Handler;

pub(crate) use listener::Listeners;
