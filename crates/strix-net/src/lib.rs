//! Non-blocking sockets and the readiness reactor.
//!
//! This crate is the lowest layer of the strix framework. It wraps the
//! OS-level socket types in small non-blocking handles with a closed error
//! taxonomy ([`SocketError`]), and provides the [`Reactor`]: a
//! single-threaded readiness loop that dispatches socket events to an
//! [`EventSink`]. Everything above it (HTTP engine, MCP transport) is built
//! on these two pieces.

pub mod addr;
pub mod error;
pub mod reactor;
pub mod socket;

pub use addr::AddressFamily;
pub use error::{SocketError, SocketErrorKind};
pub use reactor::{EventSink, InterestSet, Reactor, ReactorConfig, ReactorHandle, Token};
pub use socket::{TcpAcceptor, TcpSocket, UdpSocket};

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, SocketError>;
