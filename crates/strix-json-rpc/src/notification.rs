//! Notifications: fire-and-forget requests without an id.

use serde::{Deserialize, Serialize};

use crate::request::RequestParams;
use crate::types::JsonRpcVersion;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: JsonRpcVersion,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<RequestParams>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            jsonrpc: JsonRpcVersion::V2,
            method: method.into(),
            params: None,
        }
    }

    pub fn with_params(mut self, params: impl Into<RequestParams>) -> Self {
        self.params = Some(params.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn notification_has_no_id() {
        let value = serde_json::to_value(JsonRpcNotification::new("progress")).unwrap();
        assert_eq!(value, json!({"jsonrpc": "2.0", "method": "progress"}));
        assert!(value.get("id").is_none());
    }
}
