//! Minimal MCP server with an `echo` method.
//!
//! Run with `cargo run --example echo_server`, then:
//!
//! ```text
//! curl -s -X POST http://127.0.0.1:8080/mcp \
//!   -H 'Content-Type: application/json' \
//!   -d '{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}' -i
//! ```

use serde_json::json;
use strix_mcp_server::{McpServer, McpServerConfig};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut server = McpServer::new(McpServerConfig {
        port: 8080,
        ..McpServerConfig::default()
    });
    server.register_method("echo", |params, _ctx| {
        Ok(json!({ "echo": params.cloned().unwrap_or(serde_json::Value::Null) }))
    });

    let handle = server.start().expect("failed to start");
    println!("MCP endpoint: {}", handle.endpoint_url());
    loop {
        std::thread::sleep(std::time::Duration::from_secs(60));
    }
}
