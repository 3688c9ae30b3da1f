//! Pluggable request authentication.
//!
//! The core mandates no cryptography: a user-provided validator inspects
//! the request (via [`HeaderAccess`]) and returns an [`AuthResult`]. On
//! failure the dispatcher answers 401 with one `WWW-Authenticate` challenge
//! per configured strategy.

use serde_json::Value;
use strix_http::{HeaderAccess, HttpRequest};

use crate::config::AuthStrategy;

/// Outcome of a validator run.
#[derive(Debug, Clone)]
pub struct AuthResult {
    pub authenticated: bool,
    pub user_id: Option<String>,
    /// Arbitrary claims forwarded to the post-auth callback.
    pub claims: Value,
    pub error: Option<String>,
}

impl AuthResult {
    pub fn allow(user_id: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            user_id: Some(user_id.into()),
            claims: Value::Null,
            error: None,
        }
    }

    pub fn with_claims(mut self, claims: Value) -> Self {
        self.claims = claims;
        self
    }

    pub fn deny(error: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            user_id: None,
            claims: Value::Null,
            error: Some(error.into()),
        }
    }
}

/// Per-request validator; called before handler dispatch.
pub trait AuthValidator: Send + Sync {
    fn validate(&self, request: &HttpRequest) -> AuthResult;
}

impl<F> AuthValidator for F
where
    F: Fn(&HttpRequest) -> AuthResult + Send + Sync,
{
    fn validate(&self, request: &HttpRequest) -> AuthResult {
        self(request)
    }
}

impl AuthStrategy {
    /// Challenge emitted in `WWW-Authenticate` on 401.
    pub fn challenge(&self, header_name: &str) -> String {
        match self {
            AuthStrategy::Bearer => "Bearer realm=\"mcp\"".to_string(),
            AuthStrategy::ApiKey => format!("ApiKey header=\"{header_name}\""),
            AuthStrategy::Custom => "Custom".to_string(),
        }
    }
}

/// Convenience validator checking a bearer token against a fixed secret.
/// Real deployments plug in their own verification.
pub fn static_bearer_validator(token: impl Into<String>) -> impl AuthValidator {
    let expected = format!("Bearer {}", token.into());
    move |request: &HttpRequest| {
        match request.header_value("Authorization") {
            Some(value) if value == expected => AuthResult::allow("bearer"),
            Some(_) => AuthResult::deny("invalid token"),
            None => AuthResult::deny("missing Authorization header"),
        }
    }
}
