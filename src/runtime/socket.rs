//! UDP endpoint construction.
//!
//! Each worker gets its own socket bound to the shared port. SO_REUSEPORT
//! lets the kernel hash incoming datagrams across the per-worker sockets,
//! and SO_INCOMING_CPU nudges that steering toward the worker's own core.

use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use tracing::warn;

/// Address family actually in effect for an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    /// IPv6 wildcard with IPV6_V6ONLY cleared; reachable from both families.
    DualStack,
    /// IPv6 wildcard, but clearing IPV6_V6ONLY failed.
    Ipv6Only,
    /// IPv4 wildcard fallback.
    Ipv4,
}

impl std::fmt::Display for Family {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Family::DualStack => write!(f, "dual-stack IPv6"),
            Family::Ipv6Only => write!(f, "IPv6-only"),
            Family::Ipv4 => write!(f, "IPv4"),
        }
    }
}

/// A bound per-worker UDP socket together with its steering metadata.
pub struct Endpoint {
    pub socket: Socket,
    pub cpu: usize,
    pub family: Family,
}

impl Endpoint {
    /// The bound local address.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()?.as_socket().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, "endpoint has no inet address")
        })
    }
}

/// Create and bind one worker endpoint on `(wildcard, port)`.
///
/// Prefers a dual-stack IPv6 socket and falls back to IPv4 if the IPv6
/// socket cannot be created. A failed IPV6_V6ONLY clear leaves the socket
/// single-stack IPv6 rather than silently claiming dual-stack reach.
/// Affinity-hint and buffer-size failures are warnings; socket creation
/// and bind failures are errors and the caller skips this worker index.
pub fn create_endpoint(port: u16, cpu: usize, buffer_bytes: usize) -> io::Result<Endpoint> {
    let (socket, family) = match Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP)) {
        Ok(socket) => match socket.set_only_v6(false) {
            Ok(()) => (socket, Family::DualStack),
            Err(e) => {
                warn!(cpu, error = %e, "Could not clear IPV6_V6ONLY, endpoint is IPv6-only");
                (socket, Family::Ipv6Only)
            }
        },
        Err(_) => (
            Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?,
            Family::Ipv4,
        ),
    };

    // Steering hint only; the kernel may ignore it and fall back to plain
    // reuse-port hashing.
    #[cfg(target_os = "linux")]
    if let Err(e) = socket.set_cpu_affinity(cpu) {
        warn!(cpu, error = %e, "Could not set SO_INCOMING_CPU");
    }

    if let Err(e) = socket.set_recv_buffer_size(buffer_bytes) {
        warn!(cpu, buffer_bytes, error = %e, "Could not set SO_RCVBUF");
    }
    if let Err(e) = socket.set_send_buffer_size(buffer_bytes) {
        warn!(cpu, buffer_bytes, error = %e, "Could not set SO_SNDBUF");
    }

    if let Err(e) = socket.set_reuse_port(true) {
        warn!(cpu, error = %e, "Could not set SO_REUSEPORT");
    }
    socket.set_nonblocking(true)?;

    let addr: SocketAddr = match family {
        Family::DualStack | Family::Ipv6Only => {
            SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, port, 0, 0).into()
        }
        Family::Ipv4 => SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port).into(),
    };
    socket.bind(&addr.into())?;

    Ok(Endpoint {
        socket,
        cpu,
        family,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_endpoint_binds_wildcard() {
        let ep = create_endpoint(0, 0, 256 * 1024).unwrap();
        let addr = ep.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
        assert!(addr.ip().is_unspecified());
    }

    #[test]
    fn test_endpoints_share_port_via_reuseport() {
        let first = create_endpoint(0, 0, 256 * 1024).unwrap();
        let port = first.local_addr().unwrap().port();

        let second = create_endpoint(port, 1, 256 * 1024).unwrap();
        assert_eq!(second.local_addr().unwrap().port(), port);
    }

    #[test]
    fn test_family_is_reported() {
        // Dual-stack where the host supports IPv6, IPv4 fallback otherwise.
        let ep = create_endpoint(0, 0, 256 * 1024).unwrap();
        match ep.family {
            Family::DualStack | Family::Ipv6Only => {
                assert!(ep.local_addr().unwrap().is_ipv6());
            }
            Family::Ipv4 => assert!(ep.local_addr().unwrap().is_ipv4()),
        }
    }
}
