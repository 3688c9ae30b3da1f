//! Per-connection state.

use std::net::SocketAddr;

use bytes::BytesMut;
use strix_http::chunked::ChunkedDecoder;
use strix_http::{HttpRequest, HttpResponse, Method};
use strix_net::TcpSocket;

/// Connection state machine.
///
/// ```text
/// Idle -> ReceivingHeaders -> [Sending100Continue] -> ReceivingBody
///      -> Processing[Async] -> SendingHeaders
///      -> StreamingChunked | SendingBody -> Idle | Closing
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Idle,
    ReceivingHeaders,
    Sending100Continue,
    ReceivingBody,
    Processing,
    ProcessingAsync,
    SendingHeaders,
    SendingBody,
    StreamingChunked,
    Closing,
}

/// Metadata about the exchange in flight, captured before the request is
/// moved into a handler.
#[derive(Debug, Clone)]
pub(crate) struct ExchangeMeta {
    pub method: Method,
    pub protocol: String,
    pub keep_alive_requested: bool,
    pub head_only: bool,
    /// Set for protocol violations: the response goes out, keep-alive does
    /// not survive.
    pub force_close: bool,
}

impl ExchangeMeta {
    pub(crate) fn from_request(request: &HttpRequest) -> Self {
        Self {
            method: request.method,
            protocol: request.protocol.clone(),
            keep_alive_requested: request.keep_alive_requested(),
            head_only: request.method == Method::Head,
            force_close: false,
        }
    }

    pub(crate) fn error() -> Self {
        Self {
            method: Method::Get,
            protocol: "HTTP/1.1".to_string(),
            keep_alive_requested: false,
            head_only: false,
            force_close: true,
        }
    }
}

/// One accepted socket and everything in flight on it.
pub(crate) struct Connection {
    pub socket: TcpSocket,
    pub peer: SocketAddr,
    pub state: ConnState,
    pub recv_buf: BytesMut,
    pub send_buf: BytesMut,
    /// Declared request body length (Content-Length framing).
    pub content_length: usize,
    pub keepalive: bool,
    pub request: Option<HttpRequest>,
    pub response: Option<HttpResponse>,
    /// Decoder for chunked request bodies.
    pub chunked_decoder: Option<ChunkedDecoder>,
    pub streaming_active: bool,
    /// Streaming connection waiting for data; revisited on the reactor tick.
    pub parked: bool,
    pub chunks_sent: u64,
}

impl Connection {
    pub(crate) fn new(socket: TcpSocket, peer: SocketAddr) -> Self {
        Self {
            socket,
            peer,
            state: ConnState::Idle,
            recv_buf: BytesMut::with_capacity(4 * 1024),
            send_buf: BytesMut::with_capacity(4 * 1024),
            content_length: 0,
            keepalive: true,
            request: None,
            response: None,
            chunked_decoder: None,
            streaming_active: false,
            parked: false,
            chunks_sent: 0,
        }
    }

    /// Reset per-exchange fields for the next request on a kept-alive
    /// connection. The receive buffer is preserved: it may already hold the
    /// next pipelined request.
    pub(crate) fn reset_exchange(&mut self) {
        self.state = ConnState::Idle;
        self.content_length = 0;
        self.request = None;
        self.response = None;
        self.chunked_decoder = None;
        self.streaming_active = false;
        self.parked = false;
        self.chunks_sent = 0;
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.peer)
            .field("state", &self.state)
            .field("recv_buf", &self.recv_buf.len())
            .field("send_buf", &self.send_buf.len())
            .field("keepalive", &self.keepalive)
            .field("chunks_sent", &self.chunks_sent)
            .finish()
    }
}
