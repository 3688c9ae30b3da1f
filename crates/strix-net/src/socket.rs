//! Thin non-blocking wrappers over the OS socket types.
//!
//! Every operation returns immediately; `WouldBlock` tells the caller to
//! re-arm with the reactor. Ownership is exclusive: dropping a handle closes
//! the descriptor.

use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr};

use mio::event::Source;
use mio::{Interest, Registry, Token};

use crate::error::SocketError;
use crate::Result;

/// Non-blocking TCP stream.
#[derive(Debug)]
pub struct TcpSocket {
    stream: mio::net::TcpStream,
    shutdown_sent: bool,
}

impl TcpSocket {
    pub(crate) fn from_mio(stream: mio::net::TcpStream) -> Self {
        Self {
            stream,
            shutdown_sent: false,
        }
    }

    /// Start a non-blocking connect. The socket becomes writable once the
    /// connection is established (or refused).
    pub fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = mio::net::TcpStream::connect(addr).map_err(SocketError::from_io)?;
        Ok(Self::from_mio(stream))
    }

    /// Receive bytes. `Ok(n)` with `n > 0` on data, `Err(Closed)` on EOF.
    pub fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.stream.read(buf) {
            Ok(0) => Err(SocketError::Closed),
            Ok(n) => Ok(n),
            Err(e) => Err(SocketError::from_io(e)),
        }
    }

    /// Send bytes; returns how many were accepted by the kernel. A partial
    /// write is normal back-pressure, not an error.
    pub fn send(&mut self, buf: &[u8]) -> Result<usize> {
        self.stream.write(buf).map_err(SocketError::from_io)
    }

    /// Shut down one or both directions. Idempotent on the send side.
    pub fn shutdown(&mut self, how: Shutdown) -> Result<()> {
        if matches!(how, Shutdown::Write | Shutdown::Both) {
            if self.shutdown_sent {
                return Ok(());
            }
            self.shutdown_sent = true;
        }
        match self.stream.shutdown(how) {
            Ok(()) => Ok(()),
            // Peer already gone; treat as done.
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(SocketError::from_io(e)),
        }
    }

    pub fn peer_addr(&self) -> Result<SocketAddr> {
        self.stream.peer_addr().map_err(SocketError::from_io)
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.stream.local_addr().map_err(SocketError::from_io)
    }

    /// A pending connect error, if the kernel reported one.
    pub fn take_error(&self) -> Result<Option<std::io::Error>> {
        self.stream.take_error().map_err(SocketError::from_io)
    }

    pub fn set_nodelay(&self, nodelay: bool) -> Result<()> {
        self.stream.set_nodelay(nodelay).map_err(SocketError::from_io)
    }
}

impl Source for TcpSocket {
    fn register(&mut self, registry: &Registry, token: Token, interests: Interest) -> std::io::Result<()> {
        self.stream.register(registry, token, interests)
    }

    fn reregister(&mut self, registry: &Registry, token: Token, interests: Interest) -> std::io::Result<()> {
        self.stream.reregister(registry, token, interests)
    }

    fn deregister(&mut self, registry: &Registry) -> std::io::Result<()> {
        self.stream.deregister(registry)
    }
}

/// Non-blocking listening socket.
#[derive(Debug)]
pub struct TcpAcceptor {
    listener: mio::net::TcpListener,
}

impl TcpAcceptor {
    /// Bind and listen. The socket comes up non-blocking with
    /// `SO_REUSEADDR` set. The address may carry port 0 for an ephemeral
    /// port; query [`TcpAcceptor::local_addr`] for the resolved one.
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = mio::net::TcpListener::bind(addr).map_err(SocketError::from_io)?;
        Ok(Self { listener })
    }

    /// Accept one pending connection. `Err(WouldBlock)` when the backlog is
    /// drained.
    pub fn accept(&self) -> Result<(TcpSocket, SocketAddr)> {
        let (stream, peer) = self.listener.accept().map_err(SocketError::from_io)?;
        Ok((TcpSocket::from_mio(stream), peer))
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(SocketError::from_io)
    }
}

impl Source for TcpAcceptor {
    fn register(&mut self, registry: &Registry, token: Token, interests: Interest) -> std::io::Result<()> {
        self.listener.register(registry, token, interests)
    }

    fn reregister(&mut self, registry: &Registry, token: Token, interests: Interest) -> std::io::Result<()> {
        self.listener.reregister(registry, token, interests)
    }

    fn deregister(&mut self, registry: &Registry) -> std::io::Result<()> {
        self.listener.deregister(registry)
    }
}

/// Non-blocking UDP socket.
#[derive(Debug)]
pub struct UdpSocket {
    socket: mio::net::UdpSocket,
}

impl UdpSocket {
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = mio::net::UdpSocket::bind(addr).map_err(SocketError::from_io)?;
        Ok(Self { socket })
    }

    pub fn send_to(&self, buf: &[u8], target: SocketAddr) -> Result<usize> {
        self.socket.send_to(buf, target).map_err(SocketError::from_io)
    }

    pub fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf).map_err(SocketError::from_io)
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr().map_err(SocketError::from_io)
    }
}

impl Source for UdpSocket {
    fn register(&mut self, registry: &Registry, token: Token, interests: Interest) -> std::io::Result<()> {
        self.socket.register(registry, token, interests)
    }

    fn reregister(&mut self, registry: &Registry, token: Token, interests: Interest) -> std::io::Result<()> {
        self.socket.reregister(registry, token, interests)
    }

    fn deregister(&mut self, registry: &Registry) -> std::io::Result<()> {
        self.socket.deregister(registry)
    }
}
