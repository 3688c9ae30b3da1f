//! Response type: result XOR error.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RpcErrorObject;
use crate::types::{JsonRpcVersion, RequestId};

/// A JSON-RPC response. Exactly one of `result` / `error` is present;
/// the constructors keep that invariant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: JsonRpcVersion,
    pub id: RequestId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorObject>,
}

impl JsonRpcResponse {
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JsonRpcVersion::V2,
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: RequestId, error: RpcErrorObject) -> Self {
        Self {
            jsonrpc: JsonRpcVersion::V2,
            id,
            result: None,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_shape() {
        let response = JsonRpcResponse::success(RequestId::Number(1), json!({"ok": true}));
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(
            value,
            json!({"jsonrpc": "2.0", "id": 1, "result": {"ok": true}})
        );
        assert!(response.is_success());
    }

    #[test]
    fn failure_shape() {
        let response = JsonRpcResponse::failure(
            RequestId::Null,
            RpcErrorObject::parse_error(None),
        );
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["id"], json!(null));
        assert_eq!(value["error"]["code"], json!(-32700));
        assert!(value.get("result").is_none());
    }

    #[test]
    fn response_round_trip_all_id_variants() {
        for id in [
            RequestId::String("s".into()),
            RequestId::Number(-4),
            RequestId::Null,
        ] {
            let response = JsonRpcResponse::success(id.clone(), json!([1, 2, 3]));
            let raw = serde_json::to_string(&response).unwrap();
            let parsed: JsonRpcResponse = serde_json::from_str(&raw).unwrap();
            assert_eq!(parsed, response);
        }
    }
}
