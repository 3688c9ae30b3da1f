//! Parsed request representation.

use std::net::SocketAddr;

use crate::headers::{HeaderAccess, HeaderMap};
use crate::method::Method;

/// A fully received HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// Peer address, when the transport knows it.
    pub remote_addr: Option<SocketAddr>,
    pub method: Method,
    /// Raw request-target, query string included.
    pub uri: String,
    /// Protocol token, e.g. `HTTP/1.1`.
    pub protocol: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            remote_addr: None,
            method,
            uri: uri.into(),
            protocol: "HTTP/1.1".to_string(),
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    /// Path portion of the request-target (everything before `?`).
    pub fn path(&self) -> &str {
        match self.uri.find('?') {
            Some(idx) => &self.uri[..idx],
            None => &self.uri,
        }
    }

    /// Query string without the leading `?`, if any.
    pub fn query(&self) -> Option<&str> {
        self.uri.find('?').map(|idx| &self.uri[idx + 1..])
    }

    pub fn is_http11(&self) -> bool {
        self.protocol == "HTTP/1.1"
    }

    /// `Content-Length` as a number; `None` when absent or unparseable
    /// (callers that care about the difference check `headers` directly).
    pub fn content_length(&self) -> Option<usize> {
        self.headers
            .get("Content-Length")
            .and_then(|v| v.trim().parse::<usize>().ok())
    }

    /// Whether the request body uses chunked transfer encoding.
    pub fn is_chunked(&self) -> bool {
        self.headers
            .get("Transfer-Encoding")
            .is_some_and(|v| v.to_ascii_lowercase().contains("chunked"))
    }

    /// Keep-alive negotiation: HTTP/1.1 defaults on, the `Connection`
    /// header overrides either way.
    pub fn keep_alive_requested(&self) -> bool {
        match self.headers.get("Connection") {
            Some(v) if v.eq_ignore_ascii_case("close") => false,
            Some(v) if v.eq_ignore_ascii_case("keep-alive") => true,
            _ => self.is_http11(),
        }
    }

    /// The `Expect` header, lowercased, if present.
    pub fn expectation(&self) -> Option<String> {
        self.headers.get("Expect").map(|v| v.trim().to_ascii_lowercase())
    }

    /// Whether the `Accept` header admits the given media type.
    pub fn accepts(&self, media_type: &str) -> bool {
        self.headers
            .get("Accept")
            .is_some_and(|v| v.to_ascii_lowercase().contains(media_type))
    }
}

impl HeaderAccess for HttpRequest {
    fn has_header(&self, name: &str) -> bool {
        self.headers.contains(name)
    }

    fn header_value(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }
}
