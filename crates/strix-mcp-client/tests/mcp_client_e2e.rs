//! Full-stack round trips: strix-mcp-client against strix-mcp-server.

use serde_json::{json, Value};
use strix_mcp_client::{McpClient, McpClientError};
use strix_mcp_server::{McpServer, McpServerConfig, McpServerHandle, ResponseMode};

fn start(config: McpServerConfig) -> McpServerHandle {
    let mut server = McpServer::new(config);
    server.register_method("echo", |params: Option<&Value>, _ctx| {
        Ok(json!({ "echo": params.cloned().unwrap_or(Value::Null) }))
    });
    server.register_method("fail", |_params, _ctx| {
        Err(strix_json_rpc_error("deliberate"))
    });
    server.start().expect("server failed to start")
}

fn strix_json_rpc_error(msg: &str) -> strix_json_rpc::RpcErrorObject {
    strix_json_rpc::RpcErrorObject::invalid_params(msg)
}

#[test]
fn initialize_call_terminate_lifecycle() {
    let handle = start(McpServerConfig::default());
    let client = McpClient::connect(handle.endpoint_url());

    assert!(client.session_id().is_none());
    let result = client.initialize(json!({})).unwrap();
    assert!(result.is_object());
    let session_id = client.session_id().expect("session captured");
    assert!(session_id.starts_with("session-"));
    assert!(handle.sessions().validate(&session_id));

    let echoed = client
        .call("echo", Some(json!({"x": 41})))
        .unwrap();
    assert_eq!(echoed["echo"]["x"], json!(41));

    assert!(client.terminate().unwrap());
    assert!(client.session_id().is_none());
    assert!(!handle.sessions().validate(&session_id));
    handle.stop();
}

#[test]
fn rpc_failures_surface_as_typed_errors() {
    let handle = start(McpServerConfig::default());
    let client = McpClient::connect(handle.endpoint_url());
    client.initialize(json!({})).unwrap();

    let err = client.call("fail", Some(json!({}))).unwrap_err();
    match err {
        McpClientError::Rpc(rpc) => {
            assert_eq!(rpc.code, -32602);
            assert_eq!(rpc.message, "deliberate");
        }
        other => panic!("expected rpc error, got {other}"),
    }

    let err = client.call("no/such", None).unwrap_err();
    assert!(matches!(err, McpClientError::Rpc(rpc) if rpc.code == -32601));
    handle.stop();
}

#[test]
fn invalid_session_is_detectable() {
    let handle = start(McpServerConfig::default());
    let client = McpClient::connect(handle.endpoint_url());
    client.initialize(json!({})).unwrap();

    // Kill the session behind the client's back.
    let session_id = client.session_id().unwrap();
    handle.sessions().terminate(&session_id);

    let err = client.call("echo", Some(json!({}))).unwrap_err();
    assert!(err.is_invalid_session(), "got: {err}");
    handle.stop();
}

#[test]
fn notifications_are_acknowledged() {
    let handle = start(McpServerConfig::default());
    let client = McpClient::connect(handle.endpoint_url());
    client.initialize(json!({})).unwrap();
    client.notify("echo", Some(json!({"fire": "forget"}))).unwrap();
    handle.stop();
}

#[test]
fn stream_mode_responses_decode_transparently() {
    let handle = start(McpServerConfig {
        response_mode: ResponseMode::Stream,
        ..McpServerConfig::default()
    });
    let client = McpClient::connect(handle.endpoint_url());

    let result = client.initialize(json!({})).unwrap();
    assert!(result.is_object());
    let echoed = client.call("echo", Some(json!({"via": "sse"}))).unwrap();
    assert_eq!(echoed["echo"]["via"], json!("sse"));
    handle.stop();
}

#[test]
fn event_stream_receives_server_pushes() {
    let handle = start(McpServerConfig::default());
    let client = McpClient::connect(handle.endpoint_url());
    client.initialize(json!({})).unwrap();
    let session_id = client.session_id().unwrap();

    let events = client.events().unwrap();
    let sessions = handle.sessions();

    std::thread::scope(|scope| {
        scope.spawn(|| {
            std::thread::sleep(std::time::Duration::from_millis(200));
            assert!(handle.push_event(&session_id, Some("message"), "from-server"));
        });

        let mut seen = Vec::new();
        events
            .run(|event| {
                seen.push(event.data.clone());
                // One event is enough; drop the session to end the stream.
                sessions.terminate(&session_id);
                events.close();
            })
            .unwrap();
        assert_eq!(seen, vec!["from-server".to_string()]);
    });
    handle.stop();
}
