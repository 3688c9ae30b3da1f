//! MCP transport over HTTP + SSE.
//!
//! Binds one endpoint (default `/mcp`) on the strix HTTP engine and maps
//! the verbs onto the protocol: POST for JSON-RPC traffic (`initialize`
//! opens a session), GET for the long-lived SSE stream with
//! `Last-Event-ID` replay, DELETE for session termination, OPTIONS for
//! CORS preflight. Server-initiated events go out through
//! [`McpServerHandle::push_event`] and are recorded per session for
//! resumability.

pub mod auth;
pub mod config;
pub mod method;
pub mod prelude;
pub mod server;

mod stream;

pub use auth::{static_bearer_validator, AuthResult, AuthValidator};
pub use config::{
    AuthOptions, AuthStrategy, McpServerConfig, ResponseMode, ResumabilityOptions, SessionOptions,
};
pub use method::{McpMethod, McpRequestContext};
pub use server::{McpServer, McpServerError, McpServerHandle, Result, ServerStats};
