//! Socket address helpers.

use std::net::{SocketAddr, ToSocketAddrs};

use crate::error::SocketError;

/// Protocol family of an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    V4,
    V6,
    /// Unix domain sockets; carried for completeness, the TCP/UDP wrappers
    /// in this crate do not produce it.
    Unix,
}

impl AddressFamily {
    pub fn of(addr: &SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(_) => AddressFamily::V4,
            SocketAddr::V6(_) => AddressFamily::V6,
        }
    }
}

/// Parse `host:port` (IPv4 / hostname) or `[host]:port` (IPv6) into a
/// resolved socket address. Hostnames resolve through the system resolver;
/// the first result wins.
pub fn parse_host_port(input: &str) -> crate::Result<SocketAddr> {
    // Fast path: already a literal address.
    if let Ok(addr) = input.parse::<SocketAddr>() {
        return Ok(addr);
    }
    let mut addrs = input
        .to_socket_addrs()
        .map_err(SocketError::from_io)?;
    addrs.next().ok_or_else(|| {
        SocketError::Other(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("no address resolved for '{input}'"),
        ))
    })
}

/// Format an address the way the wire expects it: `host:port` for IPv4,
/// `[host]:port` for IPv6.
pub fn format_addr(addr: &SocketAddr) -> String {
    addr.to_string()
}
