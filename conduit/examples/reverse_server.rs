//! Example: line-reversing server with Conduit
//!
//! Configure with `CONDUIT_PORT`, `CONDUIT_BACKEND` and friends, and the
//! log level with `RUST_LOG`:
//!
//! ```text
//! RUST_LOG=conduit=debug CONDUIT_PORT=9000 cargo run --example reverse_server
//! printf 'hello\r\n' | nc 127.0.0.1 9000
//! ```

use conduit::{Connection, ServerBuilder};
use tracing_subscriber::EnvFilter;

fn main() -> conduit::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut builder = ServerBuilder::from_env();
    if std::env::var_os("CONDUIT_PORT").is_none() {
        builder = builder.port(9000);
    }

    let server = builder
        .on_start(|address| println!("Reverse server listening on {address:?}"))
        .build(reverse);

    server.start()
}

// Answers each CRLF-terminated line with its reverse, then hangs up
fn reverse(connection: &Connection) -> conduit::Result<()> {
    let mut line = [0u8; 1024];

    let n = {
        let mut reader = connection.reader();
        let n = reader.read_until(&mut line, b"\r\n", None)?;

        // no full line yet, keep the bytes for the next batch
        if n >= 0 {
            reader.unread(&line[..n as usize])?;
            return Ok(());
        }
        (-n) as usize
    };

    line[..n].reverse();
    connection.set_keep_alive(false);

    let mut writer = connection.writer();
    writer.write(&line[..n]);
    writer.write(b"\r\n");
    writer.flush()
}
