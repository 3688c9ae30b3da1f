//! Client configuration.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// `User-Agent` default header.
    pub user_agent: String,
    pub connect_timeout: Duration,
    /// Read timeout for each socket read, including idle time on an SSE
    /// stream.
    pub read_timeout: Duration,
    /// Follow 3xx responses (non-streaming requests only).
    pub follow_redirects: bool,
    pub max_redirects: usize,
    /// Reopen SSE streams after they end.
    pub auto_reconnect_sse: bool,
    /// Delay before an SSE reconnect; overridden by `retry:` directives.
    pub reconnect_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("strix-http-client/{}", env!("CARGO_PKG_VERSION")),
            connect_timeout: Duration::from_millis(10_000),
            read_timeout: Duration::from_millis(30_000),
            follow_redirects: true,
            max_redirects: 10,
            auto_reconnect_sse: true,
            reconnect_delay: Duration::from_millis(3000),
        }
    }
}
