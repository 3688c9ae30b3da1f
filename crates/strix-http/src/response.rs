//! Response representation and head serialization.

use chrono::Utc;

use crate::headers::HeaderMap;
use crate::reason::reason_phrase;

/// One pull from a streaming response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamChunk {
    /// Bytes to frame and send.
    Data(Vec<u8>),
    /// Nothing right now; the engine parks the connection and polls again.
    Pending,
    /// End of stream: emit the terminal chunk and finish the exchange.
    End,
}

/// Pull callback for streaming responses.
pub type StreamPull = Box<dyn FnMut() -> StreamChunk + Send>;
/// Invoked once after the terminal chunk has been queued.
pub type StreamEnd = Box<dyn FnOnce() + Send>;

/// Response under construction by a handler.
///
/// `code == None` means "not set yet"; the serializer falls back to 200 and
/// the engine to 404 when no handler claimed the request.
#[derive(Default)]
pub struct HttpResponse {
    pub code: Option<u16>,
    /// Reason phrase override; defaults from the status code.
    pub message: Option<String>,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    /// When set, `body` is ignored and data is pulled via `stream_pull`.
    pub streaming: bool,
    /// Chunked framing flag, decided by the serializer from the protocol.
    pub use_chunked: bool,
    pub stream_pull: Option<StreamPull>,
    pub on_stream_end: Option<StreamEnd>,
}

impl std::fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResponse")
            .field("code", &self.code)
            .field("message", &self.message)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .field("streaming", &self.streaming)
            .field("use_chunked", &self.use_chunked)
            .finish()
    }
}

impl HttpResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(code: u16) -> Self {
        Self {
            code: Some(code),
            ..Self::default()
        }
    }

    pub fn set_status(&mut self, code: u16) -> &mut Self {
        self.code = Some(code);
        self
    }

    pub fn set_header(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        self.headers.insert(name, value);
        self
    }

    pub fn set_body(&mut self, body: impl Into<Vec<u8>>) -> &mut Self {
        self.body = body.into();
        self
    }

    /// Set a body and `Content-Type` in one go.
    pub fn set_typed_body(&mut self, content_type: &str, body: impl Into<Vec<u8>>) -> &mut Self {
        self.headers.insert("Content-Type", content_type);
        self.body = body.into();
        self
    }

    /// Switch to a streaming body fed by `pull`.
    pub fn set_streaming(
        &mut self,
        pull: impl FnMut() -> StreamChunk + Send + 'static,
    ) -> &mut Self {
        self.streaming = true;
        self.stream_pull = Some(Box::new(pull));
        self
    }

    pub fn set_on_stream_end(&mut self, f: impl FnOnce() + Send + 'static) -> &mut Self {
        self.on_stream_end = Some(Box::new(f));
        self
    }

    /// Whether the response declares `text/event-stream`.
    pub fn is_event_stream(&self) -> bool {
        self.headers
            .get("Content-Type")
            .is_some_and(|v| v.to_ascii_lowercase().contains("text/event-stream"))
    }
}

/// Outcome of head serialization.
#[derive(Debug)]
pub struct SerializedHead {
    pub bytes: Vec<u8>,
    /// Negotiated keep-alive after SSE forcing.
    pub keep_alive: bool,
    /// Whether the body will use chunked framing.
    pub chunked: bool,
}

/// Serialize the status line and headers.
///
/// Computes `Content-Length` from the body unless streaming, adds
/// `Transfer-Encoding: chunked` iff streaming on HTTP/1.1, stamps an
/// RFC 1123 `Date`, reflects `Connection` negotiation, and on SSE responses
/// adds `Cache-Control: no-cache` / `X-Accel-Buffering: no` and forces
/// keep-alive on.
pub fn serialize_response_head(
    response: &HttpResponse,
    protocol: &str,
    keep_alive: bool,
) -> SerializedHead {
    let code = response.code.unwrap_or(200);
    let message = response
        .message
        .clone()
        .unwrap_or_else(|| reason_phrase(code).to_string());

    let mut headers = response.headers.clone();
    let mut keep_alive = keep_alive;
    let mut chunked = false;

    if response.streaming {
        headers.remove("Content-Length");
        if protocol == "HTTP/1.1" {
            headers.insert("Transfer-Encoding", "chunked");
            chunked = true;
        }
        if response.is_event_stream() {
            headers.insert("Cache-Control", "no-cache");
            headers.insert("X-Accel-Buffering", "no");
            keep_alive = true;
        }
    } else {
        headers.insert("Content-Length", response.body.len().to_string());
    }

    headers.insert("Date", Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string());
    headers.insert(
        "Connection",
        if keep_alive { "keep-alive" } else { "close" },
    );

    let mut bytes = Vec::with_capacity(256);
    bytes.extend_from_slice(format!("{protocol} {code} {message}\r\n").as_bytes());
    for (name, value) in headers.iter() {
        bytes.extend_from_slice(name.as_bytes());
        bytes.extend_from_slice(b": ");
        bytes.extend_from_slice(value.as_bytes());
        bytes.extend_from_slice(b"\r\n");
    }
    bytes.extend_from_slice(b"\r\n");

    SerializedHead {
        bytes,
        keep_alive,
        chunked,
    }
}
