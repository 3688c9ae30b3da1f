//! MCP client over HTTP + SSE.
//!
//! Wraps the synchronous HTTP client with the MCP conventions: an
//! `initialize` call captures the session id from the response header and
//! every subsequent request carries it; [`McpClient::call`] correlates
//! JSON-RPC responses and surfaces protocol errors as typed failures;
//! [`McpClient::events`] opens the server's SSE stream for the session,
//! resumable via `Last-Event-ID`.

mod client;
mod error;

pub use client::{McpClient, McpClientConfig};
pub use error::{McpClientError, Result};
