//! Method handlers the dispatcher routes JSON-RPC requests to.

use serde_json::Value;
use strix_http::HttpRequest;
use strix_json_rpc::RpcErrorObject;

use crate::auth::AuthResult;

/// Context handed to a method handler.
pub struct McpRequestContext<'a> {
    /// Session attached to the call: the freshly created id on
    /// `initialize`, the validated header id otherwise, `None` for public
    /// calls.
    pub session_id: Option<&'a str>,
    /// Present when authentication ran.
    pub auth: Option<&'a AuthResult>,
    pub request: &'a HttpRequest,
}

/// A JSON-RPC method implementation.
///
/// Returning `Err` propagates the error object verbatim; panics map to
/// `internal_error`.
pub trait McpMethod: Send + Sync {
    fn handle(
        &self,
        params: Option<&Value>,
        ctx: &McpRequestContext<'_>,
    ) -> Result<Value, RpcErrorObject>;
}

impl<F> McpMethod for F
where
    F: Fn(Option<&Value>, &McpRequestContext<'_>) -> Result<Value, RpcErrorObject> + Send + Sync,
{
    fn handle(
        &self,
        params: Option<&Value>,
        ctx: &McpRequestContext<'_>,
    ) -> Result<Value, RpcErrorObject> {
        self(params, ctx)
    }
}
