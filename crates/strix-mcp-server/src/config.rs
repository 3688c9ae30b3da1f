//! MCP server configuration surface.

use std::time::Duration;

use strix_http::parser::{DEFAULT_MAX_CONTENT_SIZE, DEFAULT_MAX_HEADERS_SIZE};
use strix_http_server::CorsConfig;

/// How POST responses are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseMode {
    /// Plain `application/json` bodies.
    #[default]
    Batch,
    /// A single SSE event per response, when the client accepts
    /// `text/event-stream`.
    Stream,
}

/// Session behavior.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub enabled: bool,
    /// Header carrying the session id.
    pub header_name: String,
    /// Whether DELETE on the endpoint may terminate sessions.
    pub allow_client_termination: bool,
    pub timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            header_name: "Mcp-Session-Id".to_string(),
            allow_client_termination: true,
            timeout: Duration::from_secs(3600),
        }
    }
}

/// SSE replay behavior.
#[derive(Debug, Clone)]
pub struct ResumabilityOptions {
    pub enabled: bool,
    pub history_duration: Duration,
    pub max_history_size: usize,
}

impl Default for ResumabilityOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            history_duration: Duration::from_millis(300_000),
            max_history_size: 1000,
        }
    }
}

/// Authentication strategy for the `WWW-Authenticate` challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthStrategy {
    #[default]
    Bearer,
    ApiKey,
    Custom,
}

/// Authentication options; the validator itself is registered on the
/// server ([`crate::McpServer::set_auth_validator`]).
#[derive(Debug, Clone)]
pub struct AuthOptions {
    pub enabled: bool,
    pub strategy: AuthStrategy,
    /// Header the validator is expected to read.
    pub header_name: String,
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            strategy: AuthStrategy::Bearer,
            header_name: "Authorization".to_string(),
        }
    }
}

/// Top-level MCP server configuration.
#[derive(Debug, Clone)]
pub struct McpServerConfig {
    pub host: String,
    /// Port to bind; 0 picks an ephemeral port.
    pub port: u16,
    /// Endpoint path the dispatcher binds.
    pub endpoint: String,
    pub response_mode: ResponseMode,
    /// Cap on a JSON-RPC message body.
    pub max_message_size: usize,
    pub cors: CorsConfig,
    pub session: SessionOptions,
    pub resumability: ResumabilityOptions,
    pub auth: AuthOptions,
    pub max_request_headers_size: usize,
    pub max_request_content_size: usize,
    pub max_sessions: usize,
    /// Worker threads for handler offload; 0 keeps handlers on the reactor.
    pub thread_pool_size: usize,
}

impl Default for McpServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            endpoint: "/mcp".to_string(),
            response_mode: ResponseMode::Batch,
            max_message_size: 4 * 1024 * 1024,
            cors: CorsConfig::default(),
            session: SessionOptions::default(),
            resumability: ResumabilityOptions::default(),
            auth: AuthOptions::default(),
            max_request_headers_size: DEFAULT_MAX_HEADERS_SIZE,
            max_request_content_size: DEFAULT_MAX_CONTENT_SIZE,
            max_sessions: 4096,
            thread_pool_size: 0,
        }
    }
}
