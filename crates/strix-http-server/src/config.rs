//! Server configuration.

use strix_http::parser::{DEFAULT_MAX_CONTENT_SIZE, DEFAULT_MAX_HEADERS_SIZE};
use strix_net::ReactorConfig;

use crate::cors::CorsConfig;

/// Configuration for the HTTP connection engine.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub host: String,
    /// Port to bind to; 0 picks an ephemeral port.
    pub port: u16,
    /// Cap on the request head; overruns answer 431.
    pub max_request_headers_size: usize,
    /// Cap on the request body; overruns answer 413.
    pub max_request_content_size: usize,
    /// Worker threads for handler offload; 0 runs handlers on the reactor
    /// thread.
    pub thread_pool_size: usize,
    /// Master switch for connection reuse.
    pub keep_alive_enabled: bool,
    /// Reactor tuning.
    pub reactor: ReactorConfig,
    /// CORS headers attached to every response when enabled.
    pub cors: Option<CorsConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            max_request_headers_size: DEFAULT_MAX_HEADERS_SIZE,
            max_request_content_size: DEFAULT_MAX_CONTENT_SIZE,
            thread_pool_size: 0,
            keep_alive_enabled: true,
            reactor: ReactorConfig::default(),
            cors: None,
        }
    }
}
