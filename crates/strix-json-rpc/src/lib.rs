//! JSON-RPC 2.0 framing.
//!
//! Message types (request / response / notification), the id variants the
//! protocol allows, the standard error taxonomy, and strict parsing from a
//! JSON value. Transport-agnostic: HTTP bodies and SSE `data` fields both
//! carry these.

mod error;
mod notification;
mod request;
mod response;
mod types;

pub use error::{RpcErrorCode, RpcErrorObject, INVALID_SESSION_CODE, SERVER_ERROR_RANGE};
pub use notification::JsonRpcNotification;
pub use request::{JsonRpcRequest, RequestParams};
pub use response::JsonRpcResponse;
pub use types::{JsonRpcVersion, RequestId, JSONRPC_VERSION};

use serde_json::Value;

/// A parsed incoming message: the presence of `id` splits requests from
/// notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonRpcMessage {
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
}

/// Parse raw text. Invalid JSON maps to `parse_error`, a structurally
/// invalid message to `invalid_request`.
pub fn parse_message_str(raw: &str) -> Result<JsonRpcMessage, RpcErrorObject> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| RpcErrorObject::parse_error(Some(e.to_string())))?;
    parse_message(&value)
}

/// Parse an already-decoded JSON value into a message.
pub fn parse_message(value: &Value) -> Result<JsonRpcMessage, RpcErrorObject> {
    let object = value
        .as_object()
        .ok_or_else(|| RpcErrorObject::invalid_request("message must be an object"))?;

    match object.get("jsonrpc").and_then(Value::as_str) {
        Some(JSONRPC_VERSION) => {}
        _ => return Err(RpcErrorObject::invalid_request("jsonrpc must be \"2.0\"")),
    }

    let method = object
        .get("method")
        .and_then(Value::as_str)
        .ok_or_else(|| RpcErrorObject::invalid_request("method must be a string"))?
        .to_string();

    let params = match object.get("params") {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) => Some(RequestParams::Object(map.clone())),
        Some(Value::Array(items)) => Some(RequestParams::Array(items.clone())),
        Some(_) => {
            return Err(RpcErrorObject::invalid_request(
                "params must be an object or array",
            ));
        }
    };

    match object.get("id") {
        None => Ok(JsonRpcMessage::Notification(JsonRpcNotification {
            jsonrpc: JsonRpcVersion::V2,
            method,
            params,
        })),
        Some(id_value) => {
            let id = RequestId::from_value(id_value)
                .ok_or_else(|| RpcErrorObject::invalid_request("id must be a string, integer or null"))?;
            Ok(JsonRpcMessage::Request(JsonRpcRequest {
                jsonrpc: JsonRpcVersion::V2,
                id,
                method,
                params,
            }))
        }
    }
}
