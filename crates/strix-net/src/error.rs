//! Socket error taxonomy.
//!
//! The engine cares about a handful of outcomes, not the full `io::ErrorKind`
//! zoo. `WouldBlock` is not a failure: it means "re-arm with the reactor and
//! try again later".

use std::io;
use thiserror::Error;

/// Closed set of error kinds the connection engine distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketErrorKind {
    /// The operation would block; ask the reactor to wake us later.
    WouldBlock,
    /// The peer closed the connection (EOF).
    Closed,
    /// The connection was refused by the remote end.
    Refused,
    /// The connection was reset mid-flight.
    Reset,
    /// Anything else.
    Other,
}

/// Error produced by socket operations.
#[derive(Debug, Error)]
pub enum SocketError {
    #[error("operation would block")]
    WouldBlock,
    #[error("connection closed by peer")]
    Closed,
    #[error("connection refused")]
    Refused,
    #[error("connection reset")]
    Reset,
    #[error("socket error: {0}")]
    Other(#[from] io::Error),
}

impl SocketError {
    /// Collapse into the closed kind set.
    pub fn kind(&self) -> SocketErrorKind {
        match self {
            SocketError::WouldBlock => SocketErrorKind::WouldBlock,
            SocketError::Closed => SocketErrorKind::Closed,
            SocketError::Refused => SocketErrorKind::Refused,
            SocketError::Reset => SocketErrorKind::Reset,
            SocketError::Other(_) => SocketErrorKind::Other,
        }
    }

    /// True when the operation should simply be retried on the next
    /// readiness event.
    pub fn is_would_block(&self) -> bool {
        matches!(self, SocketError::WouldBlock)
    }

    /// Map an `io::Error` onto the closed kind set.
    pub fn from_io(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock => SocketError::WouldBlock,
            io::ErrorKind::Interrupted => SocketError::WouldBlock,
            io::ErrorKind::ConnectionRefused => SocketError::Refused,
            io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe => SocketError::Reset,
            io::ErrorKind::UnexpectedEof | io::ErrorKind::ConnectionAborted => SocketError::Closed,
            _ => SocketError::Other(err),
        }
    }
}
