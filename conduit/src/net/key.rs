use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// Identity of a connection: source and destination endpoints.
///
/// For an accepted connection the source is the remote peer and the
/// destination the local listening end. For an outbound connection the
/// source is the local end. Keys are fixed at creation and only used to
/// identify connections in logs and maps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    source: SocketAddr,
    destination: SocketAddr,
}

impl ConnectionKey {
    pub fn new(source: SocketAddr, destination: SocketAddr) -> Self {
        Self {
            source,
            destination,
        }
    }

    pub fn source(&self) -> SocketAddr {
        self.source
    }

    pub fn destination(&self) -> SocketAddr {
        self.destination
    }

    pub fn src_addr(&self) -> IpAddr {
        self.source.ip()
    }

    pub fn src_port(&self) -> u16 {
        self.source.port()
    }

    pub fn dst_addr(&self) -> IpAddr {
        self.destination.ip()
    }

    pub fn dst_port(&self) -> u16 {
        self.destination.port()
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exposes_both_endpoints() {
        let key = ConnectionKey::new(
            "10.0.0.1:50000".parse().unwrap(),
            "[::1]:8080".parse().unwrap(),
        );

        assert_eq!(key.src_port(), 50000);
        assert_eq!(key.dst_port(), 8080);
        assert!(key.dst_addr().is_loopback());
        assert_eq!(key.to_string(), "10.0.0.1:50000 -> [::1]:8080");
    }
}
