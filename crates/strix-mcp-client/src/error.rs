//! Client-side MCP error taxonomy.

use strix_json_rpc::RpcErrorObject;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum McpClientError {
    #[error(transparent)]
    Transport(#[from] strix_http_client::ClientError),
    /// The server answered with a JSON-RPC error object.
    #[error(transparent)]
    Rpc(#[from] RpcErrorObject),
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    #[error("no session established; call initialize first")]
    NoSession,
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl McpClientError {
    /// True for the reserved "Invalid or expired session" error.
    pub fn is_invalid_session(&self) -> bool {
        matches!(self, McpClientError::Rpc(e) if e.code == strix_json_rpc::INVALID_SESSION_CODE)
    }
}

pub type Result<T> = std::result::Result<T, McpClientError>;
