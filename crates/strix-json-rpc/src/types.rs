//! Shared protocol types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// The only protocol version this crate speaks.
pub const JSONRPC_VERSION: &str = "2.0";

/// Marker for the `jsonrpc` field; serializes as `"2.0"` and refuses
/// anything else on the way in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JsonRpcVersion {
    #[serde(rename = "2.0")]
    V2,
}

impl Default for JsonRpcVersion {
    fn default() -> Self {
        JsonRpcVersion::V2
    }
}

/// Correlation id. The protocol restricts it to strings, integers and null.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Number(i64),
    Null,
}

impl RequestId {
    /// Strict conversion from a JSON value; fractional numbers and other
    /// types are refused.
    pub fn from_value(value: &Value) -> Option<RequestId> {
        match value {
            Value::String(s) => Some(RequestId::String(s.clone())),
            Value::Number(n) => n.as_i64().map(RequestId::Number),
            Value::Null => Some(RequestId::Null),
            _ => None,
        }
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::String(s) => write!(f, "{s}"),
            RequestId::Number(n) => write!(f, "{n}"),
            RequestId::Null => write!(f, "null"),
        }
    }
}
