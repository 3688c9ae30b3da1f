//! Client-side request and response types.

use strix_http::{HeaderMap, Method};

/// Invoked once with the finished response.
pub type CompletionCallback = Box<dyn FnOnce(&ClientResponse) + Send>;

/// An outgoing request addressed by URL.
pub struct ClientRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    /// Invoked after the response body completes.
    pub on_complete: Option<CompletionCallback>,
}

impl ClientRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: Vec::new(),
            on_complete: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn json(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.headers.insert("Content-Type", "application/json");
        self.body = body.into();
        self
    }

    pub fn on_complete(mut self, f: impl FnOnce(&ClientResponse) + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }
}

impl std::fmt::Debug for ClientRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRequest")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .finish()
    }
}

/// A received response.
#[derive(Debug, Clone)]
pub struct ClientResponse {
    pub protocol: String,
    pub status: u16,
    pub reason: String,
    pub headers: HeaderMap,
    /// Accumulated body; empty when the caller consumed it via a chunk
    /// callback.
    pub body: Vec<u8>,
}

impl ClientResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self.status, 301 | 302 | 303 | 307 | 308)
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
