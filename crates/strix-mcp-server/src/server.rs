//! The MCP dispatcher bound to one HTTP endpoint.
//!
//! Verb routing per the streamable transport: POST carries JSON-RPC,
//! `initialize` creates the session; GET opens the long-lived SSE stream
//! with `Last-Event-ID` replay; DELETE terminates the session; OPTIONS is
//! answered centrally by the engine's CORS preflight handling.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use serde_json::{json, Value};
use strix_http::{query, HttpRequest, HttpResponse, Method, StreamChunk};
use strix_http_server::{HandlerAction, HttpServer, ServerConfig, ServerHandle};
use strix_json_rpc::{
    parse_message, JsonRpcMessage, JsonRpcRequest, JsonRpcResponse, RequestId, RpcErrorObject,
};
use strix_session::{SessionConfig, SessionError, SessionManager};
use strix_sse::SseEvent;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::auth::{AuthResult, AuthValidator};
use crate::config::{McpServerConfig, ResponseMode};
use crate::method::{McpMethod, McpRequestContext};
use crate::stream::StreamRegistry;

const SWEEP_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum McpServerError {
    #[error(transparent)]
    Http(#[from] strix_http_server::ServerError),
}

pub type Result<T> = std::result::Result<T, McpServerError>;

type PostAuthCallback = Arc<dyn Fn(&HttpRequest, &AuthResult) + Send + Sync>;

/// MCP server under construction; [`McpServer::start`] brings it up.
pub struct McpServer {
    config: McpServerConfig,
    methods: HashMap<String, Arc<dyn McpMethod>>,
    auth_validator: Option<Arc<dyn AuthValidator>>,
    on_authenticated: Option<PostAuthCallback>,
}

impl McpServer {
    pub fn new(config: McpServerConfig) -> Self {
        Self {
            config,
            methods: HashMap::new(),
            auth_validator: None,
            on_authenticated: None,
        }
    }

    /// Register a JSON-RPC method handler from a closure.
    pub fn register_method<F>(&mut self, name: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(Option<&Value>, &McpRequestContext<'_>) -> std::result::Result<Value, RpcErrorObject>
            + Send
            + Sync
            + 'static,
    {
        self.methods.insert(name.into(), Arc::new(handler));
        self
    }

    /// Register a [`McpMethod`] implementation.
    pub fn register_handler(
        &mut self,
        name: impl Into<String>,
        handler: impl McpMethod + 'static,
    ) -> &mut Self {
        self.methods.insert(name.into(), Arc::new(handler));
        self
    }

    /// Install the per-request authentication validator.
    pub fn set_auth_validator(&mut self, validator: impl AuthValidator + 'static) -> &mut Self {
        self.auth_validator = Some(Arc::new(validator));
        self
    }

    /// Callback invoked with the auth result after a successful validation,
    /// before handler dispatch.
    pub fn on_authenticated(
        &mut self,
        callback: impl Fn(&HttpRequest, &AuthResult) + Send + Sync + 'static,
    ) -> &mut Self {
        self.on_authenticated = Some(Arc::new(callback));
        self
    }

    /// Bind the endpoint, start the engine and the session sweeper.
    pub fn start(self) -> Result<McpServerHandle> {
        let session_config = SessionConfig {
            timeout: self.config.session.timeout,
            resumability_enabled: self.config.resumability.enabled,
            max_history_size: self.config.resumability.max_history_size,
            history_duration: self.config.resumability.history_duration,
            max_sessions: self.config.max_sessions,
        };
        let core = Arc::new(McpCore {
            sessions: Arc::new(SessionManager::new(session_config)),
            streams: Arc::new(StreamRegistry::new()),
            methods: self.methods,
            auth_validator: self.auth_validator,
            on_authenticated: self.on_authenticated,
            event_counter: AtomicU64::new(1),
            config: self.config,
        });

        let server_config = ServerConfig {
            host: core.config.host.clone(),
            port: core.config.port,
            max_request_headers_size: core.config.max_request_headers_size,
            max_request_content_size: core.config.max_request_content_size,
            thread_pool_size: core.config.thread_pool_size,
            cors: Some(core.config.cors.clone()),
            ..ServerConfig::default()
        };
        let mut http = HttpServer::new(server_config);
        let route_core = Arc::clone(&core);
        http.route(core.config.endpoint.clone(), move |request, response| {
            route_core.handle(request, response)
        });
        let http = http.start()?;
        let local_addr = http.local_addr();
        info!(%local_addr, endpoint = %core.config.endpoint, "mcp server started");

        let sweeper_stop = Arc::new(AtomicBool::new(false));
        let sweeper = {
            let sessions = Arc::clone(&core.sessions);
            let stop = Arc::clone(&sweeper_stop);
            std::thread::Builder::new()
                .name("strix-session-sweeper".to_string())
                .spawn(move || loop {
                    // Sleep in short steps so shutdown joins promptly.
                    for _ in 0..(SWEEP_INTERVAL_SECS * 10) {
                        if stop.load(Ordering::Acquire) {
                            return;
                        }
                        std::thread::sleep(Duration::from_millis(100));
                    }
                    sessions.cleanup_expired();
                })
                .expect("failed to spawn session sweeper")
        };

        Ok(McpServerHandle {
            http: Some(http),
            local_addr,
            core,
            sweeper_stop,
            sweeper: Some(sweeper),
        })
    }
}

/// Handle to a running MCP server.
pub struct McpServerHandle {
    http: Option<ServerHandle>,
    local_addr: SocketAddr,
    core: Arc<McpCore>,
    sweeper_stop: Arc<AtomicBool>,
    sweeper: Option<JoinHandle<()>>,
}

impl McpServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Full URL of the MCP endpoint.
    pub fn endpoint_url(&self) -> String {
        format!("http://{}{}", self.local_addr, self.core.config.endpoint)
    }

    pub fn sessions(&self) -> Arc<SessionManager> {
        Arc::clone(&self.core.sessions)
    }

    /// Push a server-initiated event to a session: assigns an event id,
    /// records it for replay (when resumability is on) and feeds every open
    /// SSE stream of that session. Returns false for unknown sessions.
    pub fn push_event(
        &self,
        session_id: &str,
        event_type: Option<&str>,
        data: impl AsRef<str>,
    ) -> bool {
        self.core.push_event(session_id, event_type, data.as_ref())
    }

    /// Snapshot of live counters.
    pub fn stats(&self) -> ServerStats {
        ServerStats {
            sessions: self.core.sessions.len(),
        }
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.sweeper_stop.store(true, Ordering::Release);
        if let Some(sweeper) = self.sweeper.take() {
            let _ = sweeper.join();
        }
        if let Some(http) = self.http.take() {
            http.stop();
        }
    }
}

impl Drop for McpServerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Live server counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerStats {
    /// Sessions in the table, stale entries included until the next sweep.
    pub sessions: usize,
}

struct McpCore {
    config: McpServerConfig,
    sessions: Arc<SessionManager>,
    streams: Arc<StreamRegistry>,
    methods: HashMap<String, Arc<dyn McpMethod>>,
    auth_validator: Option<Arc<dyn AuthValidator>>,
    on_authenticated: Option<PostAuthCallback>,
    event_counter: AtomicU64,
}

impl McpCore {
    fn handle(&self, request: &HttpRequest, response: &mut HttpResponse) -> HandlerAction {
        // Authentication gates every verb the dispatcher serves (the engine
        // answers OPTIONS preflight before dispatch reaches us).
        let auth = if self.config.auth.enabled {
            match &self.auth_validator {
                Some(validator) => {
                    let result = validator.validate(request);
                    if !result.authenticated {
                        return self.unauthorized(response, &result);
                    }
                    if let Some(callback) = &self.on_authenticated {
                        callback(request, &result);
                    }
                    Some(result)
                }
                None => {
                    warn!("auth enabled but no validator registered; treating request as public");
                    None
                }
            }
        } else {
            None
        };

        match request.method {
            Method::Post => self.handle_post(request, response, auth.as_ref()),
            Method::Get => self.handle_get(request, response),
            Method::Delete => self.handle_delete(request, response),
            _ => HandlerAction::Status(405),
        }
    }

    // ------------------------------------------------------------------
    // POST: JSON-RPC requests and notifications
    // ------------------------------------------------------------------

    fn handle_post(
        &self,
        request: &HttpRequest,
        response: &mut HttpResponse,
        auth: Option<&AuthResult>,
    ) -> HandlerAction {
        let json_content = request
            .headers
            .get("Content-Type")
            .is_some_and(|v| v.to_ascii_lowercase().contains("application/json"));
        if !json_content {
            return self.rpc_error(
                response,
                400,
                None,
                RpcErrorObject::invalid_request("Content-Type must be application/json"),
            );
        }
        if request.body.len() > self.config.max_message_size {
            return self.rpc_error(
                response,
                413,
                None,
                RpcErrorObject::invalid_request("message exceeds the configured size cap"),
            );
        }

        let value: Value = match serde_json::from_slice(&request.body) {
            Ok(value) => value,
            Err(e) => {
                return self.rpc_error(
                    response,
                    400,
                    None,
                    RpcErrorObject::parse_error(Some(e.to_string())),
                );
            }
        };
        let message = match parse_message(&value) {
            Ok(message) => message,
            Err(error) => return self.rpc_error(response, 400, None, error),
        };

        match message {
            JsonRpcMessage::Notification(notification) => {
                debug!(method = %notification.method, "notification received");
                if let Some(handler) = self.methods.get(&notification.method) {
                    let session_id = self.session_header(request).map(str::to_string);
                    let ctx = McpRequestContext {
                        session_id: session_id.as_deref(),
                        auth,
                        request,
                    };
                    let params = notification.params.as_ref().map(|p| p.to_value());
                    // Notifications expect no response; outcomes are dropped.
                    let _ = self.run_handler(handler, params.as_ref(), &ctx);
                }
                response.set_status(202);
                HandlerAction::Status(202)
            }
            JsonRpcMessage::Request(rpc) if rpc.method == "initialize" => {
                self.handle_initialize(request, response, rpc, auth)
            }
            JsonRpcMessage::Request(rpc) => {
                self.handle_request_message(request, response, rpc, auth)
            }
        }
    }

    fn handle_initialize(
        &self,
        request: &HttpRequest,
        response: &mut HttpResponse,
        rpc: JsonRpcRequest,
        auth: Option<&AuthResult>,
    ) -> HandlerAction {
        let session_id = if self.config.session.enabled {
            match self.sessions.create() {
                Ok(id) => Some(id),
                Err(SessionError::CapacityExceeded(live)) => {
                    warn!(live, "session capacity exceeded on initialize");
                    return self.rpc_error(
                        response,
                        503,
                        Some(rpc.id),
                        RpcErrorObject::server_error(-32000, "session capacity exceeded"),
                    );
                }
            }
        } else {
            None
        };

        let ctx = McpRequestContext {
            session_id: session_id.as_deref(),
            auth,
            request,
        };
        let params = rpc.params.as_ref().map(|p| p.to_value());
        let rpc_response = match self.methods.get("initialize") {
            Some(handler) => match self.run_handler(handler, params.as_ref(), &ctx) {
                Ok(result) => JsonRpcResponse::success(rpc.id, result),
                Err(error) => JsonRpcResponse::failure(rpc.id, error),
            },
            // A server without an initialize handler still opens sessions.
            None => JsonRpcResponse::success(rpc.id, json!({})),
        };

        if let Some(id) = &session_id {
            response.set_header(&self.config.session.header_name, id.clone());
            debug!(session_id = %id, "session established");
        }
        self.deliver(request, response, rpc_response, session_id.as_deref())
    }

    fn handle_request_message(
        &self,
        request: &HttpRequest,
        response: &mut HttpResponse,
        rpc: JsonRpcRequest,
        auth: Option<&AuthResult>,
    ) -> HandlerAction {
        let session_id = self.session_header(request).map(str::to_string);
        if let Some(sid) = &session_id {
            if self.config.session.enabled && !self.sessions.validate(sid) {
                return self.rpc_error(
                    response,
                    404,
                    Some(rpc.id),
                    RpcErrorObject::invalid_session(),
                );
            }
        }
        // A missing session header means a public request; dispatch proceeds.

        let ctx = McpRequestContext {
            session_id: session_id.as_deref(),
            auth,
            request,
        };
        let rpc_response = match self.methods.get(&rpc.method) {
            None => JsonRpcResponse::failure(rpc.id, RpcErrorObject::method_not_found(&rpc.method)),
            Some(handler) => {
                let params = rpc.params.as_ref().map(|p| p.to_value());
                match self.run_handler(handler, params.as_ref(), &ctx) {
                    Ok(result) => JsonRpcResponse::success(rpc.id, result),
                    Err(error) => JsonRpcResponse::failure(rpc.id, error),
                }
            }
        };
        self.deliver(request, response, rpc_response, session_id.as_deref())
    }

    /// Handler errors propagate as-is; panics map to `internal_error`.
    fn run_handler(
        &self,
        handler: &Arc<dyn McpMethod>,
        params: Option<&Value>,
        ctx: &McpRequestContext<'_>,
    ) -> std::result::Result<Value, RpcErrorObject> {
        match std::panic::catch_unwind(AssertUnwindSafe(|| handler.handle(params, ctx))) {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "handler panicked".to_string());
                Err(RpcErrorObject::internal_error(message))
            }
        }
    }

    // ------------------------------------------------------------------
    // GET: long-lived SSE stream with replay
    // ------------------------------------------------------------------

    fn handle_get(&self, request: &HttpRequest, response: &mut HttpResponse) -> HandlerAction {
        let params = match request.query().map(query::parse_query) {
            Some(Ok(params)) => params,
            Some(Err(e)) => {
                return self.rpc_error(
                    response,
                    400,
                    None,
                    RpcErrorObject::invalid_request(e.to_string()),
                );
            }
            None => Vec::new(),
        };
        let Some(session_id) = query::query_param(&params, "session").map(str::to_string) else {
            return self.rpc_error(
                response,
                400,
                None,
                RpcErrorObject::invalid_request("missing 'session' query parameter"),
            );
        };
        if !self.sessions.validate(&session_id) {
            return self.rpc_error(response, 404, None, RpcErrorObject::invalid_session());
        }

        let mut replay: VecDeque<String> = if self.config.resumability.enabled {
            let last_event_id = request.headers.get("Last-Event-ID").unwrap_or("");
            self.sessions
                .events_since(&session_id, last_event_id)
                .into()
        } else {
            VecDeque::new()
        };
        debug!(session_id = %session_id, replay = replay.len(), "sse stream opening");

        let live = self.streams.open(&session_id);
        let stream = Arc::clone(&live);
        let sessions = Arc::clone(&self.sessions);
        let pull_session = session_id.clone();
        response.set_header("Content-Type", "text/event-stream");
        response.set_streaming(move || {
            if let Some(event) = replay.pop_front() {
                return StreamChunk::Data(event.into_bytes());
            }
            if let Some(event) = stream.pop() {
                return StreamChunk::Data(event.into_bytes());
            }
            if stream.is_closed() || !sessions.contains(&pull_session) {
                StreamChunk::End
            } else {
                StreamChunk::Pending
            }
        });

        let registry = Arc::clone(&self.streams);
        let stream_id = live.id;
        response.set_on_stream_end(move || registry.remove(&session_id, stream_id));
        response.set_status(200);
        HandlerAction::Status(200)
    }

    // ------------------------------------------------------------------
    // DELETE: session termination
    // ------------------------------------------------------------------

    fn handle_delete(&self, request: &HttpRequest, response: &mut HttpResponse) -> HandlerAction {
        if !self.config.session.allow_client_termination {
            return HandlerAction::Status(403);
        }
        let Some(session_id) = self.session_header(request) else {
            return HandlerAction::Status(400);
        };
        if self.sessions.terminate(session_id) {
            self.streams.close_session(session_id);
            response.set_status(204);
            HandlerAction::Status(204)
        } else {
            HandlerAction::Status(404)
        }
    }

    // ------------------------------------------------------------------
    // Shared plumbing
    // ------------------------------------------------------------------

    fn session_header<'a>(&self, request: &'a HttpRequest) -> Option<&'a str> {
        request.headers.get(&self.config.session.header_name)
    }

    fn push_event(&self, session_id: &str, event_type: Option<&str>, data: &str) -> bool {
        if !self.sessions.contains(session_id) {
            return false;
        }
        let event_id = self.next_event_id();
        let mut event = SseEvent::new(data).with_id(event_id.clone());
        if let Some(event_type) = event_type {
            event = event.with_type(event_type);
        }
        let formatted = event.format();
        self.sessions.add_event(session_id, &event_id, &formatted);
        self.streams.push(session_id, &formatted);
        true
    }

    fn next_event_id(&self) -> String {
        self.event_counter.fetch_add(1, Ordering::SeqCst).to_string()
    }

    /// Deliver a JSON-RPC response as JSON or, in stream mode for clients
    /// that accept it, as a single SSE event (recorded for replay when a
    /// session is attached).
    fn deliver(
        &self,
        request: &HttpRequest,
        response: &mut HttpResponse,
        rpc_response: JsonRpcResponse,
        session_id: Option<&str>,
    ) -> HandlerAction {
        let payload = serde_json::to_string(&rpc_response).unwrap_or_else(|e| {
            warn!("response serialization failed: {e}");
            r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32603,"message":"Internal error"}}"#
                .to_string()
        });

        if self.config.response_mode == ResponseMode::Stream
            && request.accepts("text/event-stream")
        {
            let event_id = self.next_event_id();
            let event = SseEvent::new(payload)
                .with_type("message")
                .with_id(event_id.clone());
            let formatted = event.format();
            if let Some(sid) = session_id {
                self.sessions.add_event(sid, &event_id, &formatted);
            }
            let mut pending = Some(formatted);
            response.set_header("Content-Type", "text/event-stream");
            response.set_streaming(move || match pending.take() {
                Some(event) => StreamChunk::Data(event.into_bytes()),
                None => StreamChunk::End,
            });
        } else {
            response.set_typed_body("application/json", payload);
        }
        response.set_status(200);
        HandlerAction::Status(200)
    }

    fn rpc_error(
        &self,
        response: &mut HttpResponse,
        status: u16,
        id: Option<RequestId>,
        error: RpcErrorObject,
    ) -> HandlerAction {
        let body = JsonRpcResponse::failure(id.unwrap_or(RequestId::Null), error);
        let payload = serde_json::to_string(&body)
            .unwrap_or_else(|_| r#"{"jsonrpc":"2.0","id":null}"#.to_string());
        response.set_typed_body("application/json", payload);
        response.set_status(status);
        HandlerAction::Status(status)
    }

    fn unauthorized(&self, response: &mut HttpResponse, result: &AuthResult) -> HandlerAction {
        let challenge = self
            .config
            .auth
            .strategy
            .challenge(&self.config.auth.header_name);
        response.set_header("WWW-Authenticate", challenge);
        let reason = result
            .error
            .clone()
            .unwrap_or_else(|| "authentication required".to_string());
        self.rpc_error(
            response,
            401,
            None,
            RpcErrorObject::server_error(-32000, reason),
        )
    }
}
