//! Synchronous HTTP/1.1 client and SSE consumer.
//!
//! [`HttpClient::send`] resolves the URL, opens a TCP connection, writes the
//! request and reads back a response framed by `Content-Length`, chunked
//! transfer encoding, or EOF. [`SseClient`] layers an auto-reconnecting
//! `text/event-stream` consumer on top, carrying `Last-Event-ID` across
//! reconnects.

pub mod client;
pub mod config;
pub mod error;
pub mod request;
pub mod sse;

pub use client::HttpClient;
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use request::{ClientRequest, ClientResponse};
pub use sse::SseClient;
