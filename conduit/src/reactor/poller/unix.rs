//! Thin `libc` wrappers for sockets and host introspection.
//!
//! Every function returns `io::Result` built from `errno`; none of them
//! retries on `EINTR` or `EAGAIN`, callers decide what those mean.

use libc::{
    AF_INET, AF_INET6, F_GETFL, F_SETFL, IPPROTO_IPV6, IPPROTO_TCP, IPV6_V6ONLY, O_NONBLOCK,
    SHUT_RD, SHUT_RDWR, SHUT_WR, SO_REUSEADDR, SOCK_STREAM, SOL_SOCKET, TCP_NODELAY, accept,
    bind, c_int, fcntl, getsockname, listen, recv, send, setsockopt, shutdown,
    sockaddr, sockaddr_in, sockaddr_in6, sockaddr_storage, socket, socklen_t,
};
use std::net::{Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::{io, mem};

#[cfg(target_os = "linux")]
const SEND_FLAGS: c_int = libc::MSG_NOSIGNAL;

#[cfg(not(target_os = "linux"))]
const SEND_FLAGS: c_int = 0;

/// Converts a libc return code into an `io::Result`.
fn cvt(rc: isize) -> io::Result<usize> {
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(rc as usize)
    }
}

/// Reads from a socket into `buffer`. `Ok(0)` is end of stream.
pub(crate) fn sys_read(fd: RawFd, buffer: &mut [u8]) -> io::Result<usize> {
    cvt(unsafe { recv(fd, buffer.as_mut_ptr() as *mut _, buffer.len(), 0) })
}

/// Sends `buffer` on a socket without raising `SIGPIPE` where supported.
pub(crate) fn sys_send(fd: RawFd, buffer: &[u8]) -> io::Result<usize> {
    cvt(unsafe { send(fd, buffer.as_ptr() as *const _, buffer.len(), SEND_FLAGS) })
}

/// Switches a descriptor between blocking and non-blocking mode.
pub(crate) fn sys_set_nonblocking(fd: RawFd, nonblocking: bool) -> io::Result<()> {
    let flags = unsafe { fcntl(fd, F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }

    let flags = if nonblocking {
        flags | O_NONBLOCK
    } else {
        flags & !O_NONBLOCK
    };

    if unsafe { fcntl(fd, F_SETFL, flags) } < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

/// Creates a non-blocking stream socket for `domain`.
pub(crate) fn sys_socket(domain: c_int) -> io::Result<OwnedFd> {
    let fd = unsafe { socket(domain, SOCK_STREAM, 0) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }

    let fd = unsafe { OwnedFd::from_raw_fd(fd) };
    sys_set_nonblocking(fd.as_raw_fd(), true)?;

    Ok(fd)
}

/// Creates a non-blocking listening socket bound to `address`.
///
/// The socket has `SO_REUSEADDR` set and, for IPv6 addresses, accepts
/// IPv4-mapped peers as well.
pub(crate) fn sys_listen_on(address: SocketAddr, backlog: u32) -> io::Result<OwnedFd> {
    let (storage, len) = socketaddr_to_storage(&address);
    let domain = storage.ss_family as c_int;

    let fd = sys_socket(domain)?;
    let raw = fd.as_raw_fd();

    sys_set_option(raw, SOL_SOCKET, SO_REUSEADDR, 1)?;
    if domain == AF_INET6 {
        sys_set_option(raw, IPPROTO_IPV6, IPV6_V6ONLY, 0)?;
    }

    if unsafe { bind(raw, &storage as *const _ as *const sockaddr, len) } < 0 {
        return Err(io::Error::last_os_error());
    }

    let backlog = backlog.min(c_int::MAX as u32) as c_int;
    if unsafe { listen(raw, backlog) } < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(fd)
}

/// Accepts one pending connection.
///
/// The returned socket is non-blocking with `TCP_NODELAY` set.
pub(crate) fn sys_accept(fd: RawFd) -> io::Result<(OwnedFd, SocketAddr)> {
    let mut storage: sockaddr_storage = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<sockaddr_storage>() as socklen_t;

    let client = unsafe { accept(fd, &mut storage as *mut _ as *mut sockaddr, &mut len) };
    if client < 0 {
        return Err(io::Error::last_os_error());
    }

    let client = unsafe { OwnedFd::from_raw_fd(client) };
    sys_set_nonblocking(client.as_raw_fd(), true)?;
    sys_set_option(client.as_raw_fd(), IPPROTO_TCP, TCP_NODELAY, 1)?;

    let peer = sockaddr_storage_to_socketaddr(&storage)?;

    Ok((client, peer))
}

/// Returns the local address of a socket.
pub(crate) fn sys_sockname(fd: RawFd) -> io::Result<SocketAddr> {
    let mut storage: sockaddr_storage = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<sockaddr_storage>() as socklen_t;

    if unsafe { getsockname(fd, &mut storage as *mut _ as *mut sockaddr, &mut len) } < 0 {
        return Err(io::Error::last_os_error());
    }

    sockaddr_storage_to_socketaddr(&storage)
}

/// Shuts down one or both directions of a socket.
pub(crate) fn sys_shutdown(fd: RawFd, how: Shutdown) -> io::Result<()> {
    let how = match how {
        Shutdown::Read => SHUT_RD,
        Shutdown::Write => SHUT_WR,
        Shutdown::Both => SHUT_RDWR,
    };

    if unsafe { shutdown(fd, how) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Sets an integer socket option.
fn sys_set_option(fd: RawFd, level: c_int, name: c_int, value: c_int) -> io::Result<()> {
    let rc = unsafe {
        setsockopt(
            fd,
            level,
            name,
            &value as *const c_int as *const _,
            mem::size_of::<c_int>() as socklen_t,
        )
    };

    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Number of online CPUs.
pub(crate) fn sys_cpu_count() -> Option<usize> {
    let n = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
    (n > 0).then_some(n as usize)
}

/// Total physical memory in bytes.
pub(crate) fn sys_physical_memory() -> Option<u64> {
    let pages = unsafe { libc::sysconf(libc::_SC_PHYS_PAGES) };
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };

    if pages <= 0 || page_size <= 0 {
        return None;
    }

    (pages as u64).checked_mul(page_size as u64)
}

/// Converts a `sockaddr_storage` to a Rust `SocketAddr`.
fn sockaddr_storage_to_socketaddr(storage: &sockaddr_storage) -> io::Result<SocketAddr> {
    match storage.ss_family as c_int {
        AF_INET => {
            let addr = unsafe { &*(storage as *const _ as *const sockaddr_in) };
            let ip = Ipv4Addr::from(u32::from_be(addr.sin_addr.s_addr));
            let port = u16::from_be(addr.sin_port);

            Ok(SocketAddr::V4(SocketAddrV4::new(ip, port)))
        }

        AF_INET6 => {
            let addr = unsafe { &*(storage as *const _ as *const sockaddr_in6) };
            let ip = Ipv6Addr::from(addr.sin6_addr.s6_addr);
            let port = u16::from_be(addr.sin6_port);

            Ok(SocketAddr::V6(SocketAddrV6::new(
                ip,
                port,
                addr.sin6_flowinfo,
                addr.sin6_scope_id,
            )))
        }

        _ => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "unsupported address family",
        )),
    }
}

/// Converts a `SocketAddr` to a `sockaddr_storage`.
fn socketaddr_to_storage(addr: &SocketAddr) -> (sockaddr_storage, socklen_t) {
    let mut storage: sockaddr_storage = unsafe { mem::zeroed() };

    match addr {
        SocketAddr::V4(v4) => {
            let sa = unsafe { &mut *(&mut storage as *mut _ as *mut sockaddr_in) };
            sa.sin_family = AF_INET as _;
            sa.sin_port = v4.port().to_be();
            sa.sin_addr.s_addr = u32::from(*v4.ip()).to_be();

            (storage, mem::size_of::<sockaddr_in>() as socklen_t)
        }

        SocketAddr::V6(v6) => {
            let sa = unsafe { &mut *(&mut storage as *mut _ as *mut sockaddr_in6) };
            sa.sin6_family = AF_INET6 as _;
            sa.sin6_port = v6.port().to_be();
            sa.sin6_addr.s6_addr = v6.ip().octets();
            sa.sin6_flowinfo = v6.flowinfo();
            sa.sin6_scope_id = v6.scope_id();

            (storage, mem::size_of::<sockaddr_in6>() as socklen_t)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpStream;

    #[test]
    fn listener_accepts_and_exchanges_bytes() {
        let listener = sys_listen_on("127.0.0.1:0".parse().unwrap(), 16).unwrap();
        let local = sys_sockname(listener.as_raw_fd()).unwrap();
        assert_ne!(local.port(), 0);

        let mut client = TcpStream::connect(local).unwrap();

        let (server, peer) = loop {
            match sys_accept(listener.as_raw_fd()) {
                Ok(accepted) => break accepted,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => std::thread::yield_now(),
                Err(e) => panic!("accept failed: {e}"),
            }
        };
        assert_eq!(peer, client.local_addr().unwrap());

        assert_eq!(sys_send(server.as_raw_fd(), b"hello").unwrap(), 5);
        let mut buf = [0u8; 5];
        client.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");

        client.write_all(b"x").unwrap();
        client.shutdown(Shutdown::Write).unwrap();

        sys_set_nonblocking(server.as_raw_fd(), false).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(sys_read(server.as_raw_fd(), &mut buf).unwrap(), 1);
        assert_eq!(sys_read(server.as_raw_fd(), &mut buf).unwrap(), 0);
    }

    #[test]
    fn host_introspection_reports_something() {
        assert!(sys_cpu_count().unwrap_or(1) >= 1);
        assert!(sys_physical_memory().unwrap_or(1) > 0);
    }
}
