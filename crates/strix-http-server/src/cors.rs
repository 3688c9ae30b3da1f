//! CORS header application.

use strix_http::HeaderMap;

/// Cross-origin resource sharing configuration.
#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub enabled: bool,
    pub allow_origin: String,
    pub allow_methods: String,
    pub allow_headers: String,
    pub expose_headers: String,
    /// Preflight cache lifetime in seconds; attached only on OPTIONS.
    pub max_age: u32,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allow_origin: "*".to_string(),
            allow_methods: "GET, POST, DELETE, OPTIONS".to_string(),
            allow_headers: "Content-Type, Accept, Authorization, Mcp-Session-Id, Last-Event-ID"
                .to_string(),
            expose_headers: "Mcp-Session-Id".to_string(),
            max_age: 86400,
        }
    }
}

impl CorsConfig {
    /// Attach the `Access-Control-*` set; `Max-Age` only for preflight.
    pub fn apply(&self, headers: &mut HeaderMap, preflight: bool) {
        headers.insert("Access-Control-Allow-Origin", self.allow_origin.clone());
        headers.insert("Access-Control-Allow-Methods", self.allow_methods.clone());
        headers.insert("Access-Control-Allow-Headers", self.allow_headers.clone());
        if !self.expose_headers.is_empty() {
            headers.insert("Access-Control-Expose-Headers", self.expose_headers.clone());
        }
        if preflight {
            headers.insert("Access-Control-Max-Age", self.max_age.to_string());
        }
    }
}
