//! Client error taxonomy.

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("unsupported scheme '{0}' (TLS terminates upstream)")]
    UnsupportedScheme(String),
    #[error("could not resolve host '{0}'")]
    Resolve(String),
    #[error("connect failed: {0}")]
    Connect(io::Error),
    #[error("request timed out")]
    Timeout,
    #[error("i/o error: {0}")]
    Io(io::Error),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("too many redirects (limit {0})")]
    TooManyRedirects(usize),
}

impl ClientError {
    pub(crate) fn from_io(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ClientError::Timeout,
            _ => ClientError::Io(err),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ClientError::Timeout)
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
