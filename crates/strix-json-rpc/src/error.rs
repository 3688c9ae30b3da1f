//! The standard error taxonomy.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Server-defined error code range.
pub const SERVER_ERROR_RANGE: std::ops::RangeInclusive<i32> = -32099..=-32000;
/// Reserved server code for "Invalid or expired session".
pub const INVALID_SESSION_CODE: i32 = -32001;

/// Well-known error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    /// -32099..=-32000
    ServerError(i32),
}

impl RpcErrorCode {
    pub fn code(&self) -> i32 {
        match self {
            RpcErrorCode::ParseError => -32700,
            RpcErrorCode::InvalidRequest => -32600,
            RpcErrorCode::MethodNotFound => -32601,
            RpcErrorCode::InvalidParams => -32602,
            RpcErrorCode::InternalError => -32603,
            RpcErrorCode::ServerError(code) => *code,
        }
    }

    pub fn default_message(&self) -> &'static str {
        match self {
            RpcErrorCode::ParseError => "Parse error",
            RpcErrorCode::InvalidRequest => "Invalid Request",
            RpcErrorCode::MethodNotFound => "Method not found",
            RpcErrorCode::InvalidParams => "Invalid params",
            RpcErrorCode::InternalError => "Internal error",
            RpcErrorCode::ServerError(_) => "Server error",
        }
    }
}

/// The `error` member of a failure response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcErrorObject {
    pub fn new(code: RpcErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn parse_error(detail: Option<String>) -> Self {
        let mut error = Self::new(RpcErrorCode::ParseError, RpcErrorCode::ParseError.default_message());
        if let Some(detail) = detail {
            error.data = Some(Value::String(detail));
        }
        error
    }

    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::InvalidRequest, RpcErrorCode::InvalidRequest.default_message())
            .with_data(Value::String(reason.into()))
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            RpcErrorCode::MethodNotFound,
            format!("Method '{method}' not found"),
        )
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::InvalidParams, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::InternalError, message)
    }

    /// Server-defined error; `code` must sit in [`SERVER_ERROR_RANGE`].
    pub fn server_error(code: i32, message: impl Into<String>) -> Self {
        debug_assert!(
            SERVER_ERROR_RANGE.contains(&code),
            "server error code out of range: {code}"
        );
        Self::new(RpcErrorCode::ServerError(code), message)
    }

    pub fn invalid_session() -> Self {
        Self::server_error(INVALID_SESSION_CODE, "Invalid or expired session")
    }
}

impl fmt::Display for RpcErrorObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JSON-RPC error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for RpcErrorObject {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_codes() {
        assert_eq!(RpcErrorCode::ParseError.code(), -32700);
        assert_eq!(RpcErrorCode::InvalidRequest.code(), -32600);
        assert_eq!(RpcErrorCode::MethodNotFound.code(), -32601);
        assert_eq!(RpcErrorCode::InvalidParams.code(), -32602);
        assert_eq!(RpcErrorCode::InternalError.code(), -32603);
    }

    #[test]
    fn invalid_session_error() {
        let error = RpcErrorObject::invalid_session();
        assert_eq!(error.code, -32001);
        assert_eq!(error.message, "Invalid or expired session");
    }

    #[test]
    fn data_is_omitted_when_none() {
        let raw = serde_json::to_string(&RpcErrorObject::method_not_found("x")).unwrap();
        assert!(!raw.contains("data"));
        assert!(raw.contains("Method 'x' not found"));
    }
}
