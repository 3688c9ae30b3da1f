//! Common imports for building an MCP server.

pub use crate::auth::{AuthResult, AuthValidator};
pub use crate::config::{McpServerConfig, ResponseMode};
pub use crate::method::{McpMethod, McpRequestContext};
pub use crate::server::{McpServer, McpServerHandle};
pub use strix_json_rpc::{RequestId, RpcErrorObject};
