//! The MCP client proper.

use std::sync::atomic::{AtomicI64, Ordering};

use parking_lot::Mutex;
use serde_json::Value;
use strix_http::Method;
use strix_http_client::{ClientRequest, ClientResponse, HttpClient, SseClient};
use strix_json_rpc::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId, RequestParams};
use strix_sse::SseParser;
use tracing::debug;

use crate::error::{McpClientError, Result};

#[derive(Debug, Clone)]
pub struct McpClientConfig {
    /// Full endpoint URL, e.g. `http://127.0.0.1:8080/mcp`.
    pub endpoint: String,
    /// Header carrying the session id.
    pub session_header: String,
}

impl McpClientConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            session_header: "Mcp-Session-Id".to_string(),
        }
    }
}

/// Synchronous MCP client bound to one endpoint.
pub struct McpClient {
    http: HttpClient,
    config: McpClientConfig,
    session_id: Mutex<Option<String>>,
    next_id: AtomicI64,
}

impl McpClient {
    pub fn new(http: HttpClient, config: McpClientConfig) -> Self {
        Self {
            http,
            config,
            session_id: Mutex::new(None),
            next_id: AtomicI64::new(1),
        }
    }

    /// Connect to an endpoint with default HTTP client settings.
    pub fn connect(endpoint: impl Into<String>) -> Self {
        Self::new(HttpClient::default(), McpClientConfig::new(endpoint))
    }

    /// Session id captured from `initialize`, if any.
    pub fn session_id(&self) -> Option<String> {
        self.session_id.lock().clone()
    }

    /// Send `initialize`, capture the session header, return the result.
    pub fn initialize(&self, params: Value) -> Result<Value> {
        let request = JsonRpcRequest::new(self.next_request_id(), "initialize")
            .with_params(to_params(params)?);
        let response = self.post(&serde_json::to_vec(&request).map_err(json_error)?)?;

        if let Some(session) = response.headers.get(&self.config.session_header) {
            debug!(session_id = %session, "mcp session established");
            *self.session_id.lock() = Some(session.to_string());
        }
        self.extract_result(response)
    }

    /// Call a method and return its result; JSON-RPC failures come back as
    /// [`McpClientError::Rpc`].
    pub fn call(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let mut request = JsonRpcRequest::new(self.next_request_id(), method);
        if let Some(params) = params {
            request = request.with_params(to_params(params)?);
        }
        let response = self.post(&serde_json::to_vec(&request).map_err(json_error)?)?;
        self.extract_result(response)
    }

    /// Fire a notification; the server acknowledges without a body.
    pub fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        let mut notification = JsonRpcNotification::new(method);
        if let Some(params) = params {
            notification = notification.with_params(to_params(params)?);
        }
        let response = self.post(&serde_json::to_vec(&notification).map_err(json_error)?)?;
        match response.status {
            200 | 202 | 204 => Ok(()),
            status => Err(McpClientError::Status(status)),
        }
    }

    /// Terminate the current session. `Ok(true)` when the server dropped
    /// it, `Ok(false)` when it was already gone.
    pub fn terminate(&self) -> Result<bool> {
        let session = self.session_id().ok_or(McpClientError::NoSession)?;
        let response = self.http.send(
            ClientRequest::new(Method::Delete, &self.config.endpoint)
                .header(&self.config.session_header, session),
        )?;
        match response.status {
            204 | 200 => {
                *self.session_id.lock() = None;
                Ok(true)
            }
            404 => {
                *self.session_id.lock() = None;
                Ok(false)
            }
            status => Err(McpClientError::Status(status)),
        }
    }

    /// Open the session's SSE stream. The returned [`SseClient`] carries
    /// `Last-Event-ID` across reconnects; drive it with [`SseClient::run`].
    pub fn events(&self) -> Result<SseClient> {
        let session = self.session_id().ok_or(McpClientError::NoSession)?;
        let url = format!("{}?session={}", self.config.endpoint, session);
        Ok(SseClient::new(self.http.clone(), url))
    }

    fn next_request_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn post(&self, body: &[u8]) -> Result<ClientResponse> {
        let mut request = ClientRequest::post(&self.config.endpoint)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json, text/event-stream")
            .body(body.to_vec());
        if let Some(session) = self.session_id() {
            request = request.header(&self.config.session_header, session);
        }
        Ok(self.http.send(request)?)
    }

    /// Decode a JSON-RPC response from a JSON body or a single-event SSE
    /// body (stream response mode).
    fn extract_result(&self, response: ClientResponse) -> Result<Value> {
        let is_event_stream = response
            .headers
            .get("Content-Type")
            .is_some_and(|v| v.to_ascii_lowercase().contains("text/event-stream"));

        let payload: Vec<u8> = if is_event_stream {
            let mut parser = SseParser::new();
            let events = parser.feed_bytes(&response.body);
            let event = events
                .into_iter()
                .find(|e| e.has_data)
                .ok_or_else(|| McpClientError::Protocol("empty event stream response".into()))?;
            event.data.into_bytes()
        } else {
            response.body.clone()
        };

        let rpc: JsonRpcResponse = serde_json::from_slice(&payload)
            .map_err(|e| McpClientError::Protocol(format!("bad response body: {e}")))?;
        if let Some(error) = rpc.error {
            return Err(McpClientError::Rpc(error));
        }
        match rpc.result {
            Some(result) if (200..300).contains(&response.status) => Ok(result),
            Some(_) => Err(McpClientError::Status(response.status)),
            None => Err(McpClientError::Protocol(
                "response carried neither result nor error".into(),
            )),
        }
    }
}

fn to_params(value: Value) -> Result<RequestParams> {
    match value {
        Value::Object(map) => Ok(RequestParams::Object(map)),
        Value::Array(items) => Ok(RequestParams::Array(items)),
        other => Err(McpClientError::Protocol(format!(
            "params must be an object or array, got {other}"
        ))),
    }
}

fn json_error(e: serde_json::Error) -> McpClientError {
    McpClientError::Protocol(format!("serialization failed: {e}"))
}
