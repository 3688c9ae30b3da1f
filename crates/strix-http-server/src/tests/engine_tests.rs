//! Request/response paths through a live engine.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serial_test::serial;

use super::{read_one_response, roundtrip, split_response, start_server};
use crate::config::ServerConfig;
use crate::cors::CorsConfig;
use crate::handler::HandlerAction;
use strix_session::{SessionConfig, SessionManager};

fn hello_setup(server: &mut crate::server::HttpServer) {
    server.route("/", |_req, resp| {
        resp.set_typed_body("text/plain", "hi");
        HandlerAction::Status(200)
    });
}

#[test]
fn simple_get() {
    let handle = start_server(ServerConfig::default(), hello_setup);
    let raw = roundtrip(
        &handle,
        b"GET /hello HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n",
    );
    let (head, body) = split_response(&raw);

    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"), "head: {head}");
    assert!(head.contains("Content-Length: 2\r\n"));
    assert!(head.contains("Connection: close\r\n"));
    assert_eq!(body, b"hi");
    handle.stop();
}

#[test]
fn head_parity_clears_body_keeps_length() {
    let handle = start_server(ServerConfig::default(), hello_setup);
    let raw = roundtrip(
        &handle,
        b"HEAD /hello HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n",
    );
    let (head, body) = split_response(&raw);

    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(head.contains("Content-Length: 2\r\n"));
    assert!(body.is_empty(), "HEAD response must carry no body");
    handle.stop();
}

#[test]
fn unmatched_prefix_is_404() {
    let handle = start_server(ServerConfig::default(), |server| {
        server.route("/real", |_req, resp| {
            resp.set_body("yes");
            HandlerAction::Status(200)
        });
    });
    let raw = roundtrip(
        &handle,
        b"GET /other HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n",
    );
    let (head, _) = split_response(&raw);
    assert!(head.starts_with("HTTP/1.1 404 Not Found\r\n"));
    handle.stop();
}

#[test]
fn handler_close_drops_connection_silently() {
    let handle = start_server(ServerConfig::default(), |server| {
        server.route("/kill", |_req, _resp| HandlerAction::Close);
    });
    let raw = roundtrip(&handle, b"GET /kill HTTP/1.1\r\nHost: x\r\n\r\n");
    assert!(raw.is_empty(), "expected silent close, got: {raw:?}");
    handle.stop();
}

#[test]
fn echo_post_body() {
    let handle = start_server(ServerConfig::default(), |server| {
        server.route("/echo", |req, resp| {
            resp.set_body(req.body.clone());
            HandlerAction::Status(200)
        });
    });
    let raw = roundtrip(
        &handle,
        b"POST /echo HTTP/1.1\r\nHost: x\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello",
    );
    let (head, body) = split_response(&raw);
    assert!(head.starts_with("HTTP/1.1 200"));
    assert_eq!(body, b"hello");
    handle.stop();
}

#[test]
fn chunked_request_body_discards_trailers() {
    let handle = start_server(ServerConfig::default(), |server| {
        server.route("/echo", |req, resp| {
            resp.set_body(req.body.clone());
            HandlerAction::Status(200)
        });
    });
    let raw = roundtrip(
        &handle,
        b"POST /echo HTTP/1.1\r\nHost: x\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n\
          2\r\nab\r\n1\r\nc\r\n0\r\nX-Trailer: ignored\r\n\r\n",
    );
    let (head, body) = split_response(&raw);
    assert!(head.starts_with("HTTP/1.1 200"));
    assert_eq!(body, b"abc");
    handle.stop();
}

#[test]
fn expect_100_continue_interlude() {
    let handle = start_server(ServerConfig::default(), |server| {
        server.route("/x", |req, resp| {
            resp.set_body(req.body.clone());
            HandlerAction::Status(200)
        });
    });

    let mut stream = TcpStream::connect(handle.local_addr()).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    stream
        .write_all(
            b"POST /x HTTP/1.1\r\nHost: x\r\nContent-Length: 5\r\nExpect: 100-continue\r\nConnection: close\r\n\r\n",
        )
        .unwrap();

    // The interim response arrives before we send any body byte.
    let mut interim = Vec::new();
    let mut chunk = [0u8; 256];
    while strix_http::find_header_end(&interim).is_none() {
        let n = stream.read(&mut chunk).unwrap();
        assert!(n > 0);
        interim.extend_from_slice(&chunk[..n]);
    }
    let text = String::from_utf8_lossy(&interim);
    assert!(text.starts_with("HTTP/1.1 100 Continue\r\n"), "got: {text}");

    stream.write_all(b"salut").unwrap();
    let mut rest = Vec::new();
    stream.read_to_end(&mut rest).unwrap();
    let (head, body) = split_response(&rest);
    assert!(head.starts_with("HTTP/1.1 200"));
    assert_eq!(body, b"salut");
    handle.stop();
}

#[test]
fn unsupported_expectation_is_417() {
    let handle = start_server(ServerConfig::default(), hello_setup);
    let raw = roundtrip(
        &handle,
        b"POST /x HTTP/1.1\r\nHost: x\r\nExpect: 202-maybe\r\nContent-Length: 1\r\n\r\nz",
    );
    let (head, _) = split_response(&raw);
    assert!(head.starts_with("HTTP/1.1 417"), "head: {head}");
    assert!(head.contains("Connection: close\r\n"));
    handle.stop();
}

#[test]
fn oversized_head_is_431() {
    let handle = start_server(
        ServerConfig {
            max_request_headers_size: 256,
            ..ServerConfig::default()
        },
        hello_setup,
    );
    let mut request = b"GET / HTTP/1.1\r\nHost: x\r\nPad: ".to_vec();
    request.extend(std::iter::repeat_n(b'a', 512));
    request.extend_from_slice(b"\r\n\r\n");
    let raw = roundtrip(&handle, &request);
    let (head, _) = split_response(&raw);
    assert!(head.starts_with("HTTP/1.1 431"), "head: {head}");
    handle.stop();
}

#[test]
fn oversized_body_is_413() {
    let handle = start_server(
        ServerConfig {
            max_request_content_size: 16,
            ..ServerConfig::default()
        },
        hello_setup,
    );
    let raw = roundtrip(
        &handle,
        b"POST / HTTP/1.1\r\nHost: x\r\nContent-Length: 17\r\n\r\nAAAAAAAAAAAAAAAAA",
    );
    let (head, _) = split_response(&raw);
    assert!(head.starts_with("HTTP/1.1 413"), "head: {head}");
    handle.stop();
}

#[test]
fn body_at_exact_cap_is_accepted() {
    let handle = start_server(
        ServerConfig {
            max_request_content_size: 16,
            ..ServerConfig::default()
        },
        |server| {
            server.route("/", |req, resp| {
                resp.set_body(req.body.clone());
                HandlerAction::Status(200)
            });
        },
    );
    let raw = roundtrip(
        &handle,
        b"POST / HTTP/1.1\r\nHost: x\r\nContent-Length: 16\r\nConnection: close\r\n\r\nAAAAAAAAAAAAAAAA",
    );
    let (head, body) = split_response(&raw);
    assert!(head.starts_with("HTTP/1.1 200"), "head: {head}");
    assert_eq!(body.len(), 16);
    handle.stop();
}

#[test]
fn malformed_request_line_is_400() {
    let handle = start_server(ServerConfig::default(), hello_setup);
    let raw = roundtrip(&handle, b"BREW /pot HTTP/1.1\r\nHost: x\r\n\r\n");
    let (head, _) = split_response(&raw);
    assert!(head.starts_with("HTTP/1.1 400"), "head: {head}");
    handle.stop();
}

#[test]
fn keep_alive_serves_sequential_requests() {
    let handle = start_server(ServerConfig::default(), hello_setup);
    let mut stream = TcpStream::connect(handle.local_addr()).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();

    for _ in 0..3 {
        stream
            .write_all(b"GET /hello HTTP/1.1\r\nHost: x\r\n\r\n")
            .unwrap();
        let (head, body) = read_one_response(&mut stream);
        assert!(head.contains("Connection: keep-alive\r\n"), "head: {head}");
        assert_eq!(body, b"hi");
    }
    handle.stop();
}

#[test]
fn pipelined_requests_are_served_in_order() {
    let handle = start_server(ServerConfig::default(), |server| {
        server.route("/", |req, resp| {
            resp.set_body(req.uri.clone());
            HandlerAction::Status(200)
        });
    });
    let mut stream = TcpStream::connect(handle.local_addr()).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    stream
        .write_all(
            b"GET /first HTTP/1.1\r\nHost: x\r\n\r\nGET /second HTTP/1.1\r\nHost: x\r\n\r\n",
        )
        .unwrap();

    let (_, body1) = read_one_response(&mut stream);
    assert_eq!(body1, b"/first");
    let (_, body2) = read_one_response(&mut stream);
    assert_eq!(body2, b"/second");
    handle.stop();
}

#[test]
fn central_options_with_cors() {
    let handle = start_server(
        ServerConfig {
            cors: Some(CorsConfig::default()),
            ..ServerConfig::default()
        },
        hello_setup,
    );
    let raw = roundtrip(
        &handle,
        b"OPTIONS /anything HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n",
    );
    let (head, _) = split_response(&raw);
    assert!(head.starts_with("HTTP/1.1 204"), "head: {head}");
    assert!(head.contains("Access-Control-Allow-Origin: *\r\n"));
    assert!(head.contains("Access-Control-Max-Age: 86400\r\n"));
    handle.stop();
}

#[test]
fn central_options_without_cors_is_405() {
    let handle = start_server(ServerConfig::default(), hello_setup);
    let raw = roundtrip(
        &handle,
        b"OPTIONS / HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n",
    );
    let (head, _) = split_response(&raw);
    assert!(head.starts_with("HTTP/1.1 405"), "head: {head}");
    assert!(head.contains("Allow: "));
    handle.stop();
}

#[test]
fn cors_headers_attach_to_every_response() {
    let handle = start_server(
        ServerConfig {
            cors: Some(CorsConfig::default()),
            ..ServerConfig::default()
        },
        hello_setup,
    );
    let raw = roundtrip(
        &handle,
        b"GET /hello HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n",
    );
    let (head, _) = split_response(&raw);
    assert!(head.contains("Access-Control-Allow-Origin: *\r\n"));
    // Max-Age is preflight-only.
    assert!(!head.contains("Access-Control-Max-Age"));
    handle.stop();
}

#[test]
fn central_delete_terminates_sessions() {
    let sessions = Arc::new(SessionManager::new(SessionConfig::default()));
    let session_id = sessions.create().unwrap();
    let sessions_for_server = Arc::clone(&sessions);

    let handle = start_server(ServerConfig::default(), move |server| {
        server.attach_sessions(sessions_for_server);
        hello_setup(server);
    });

    let request = format!(
        "DELETE /mcp HTTP/1.1\r\nHost: x\r\nMcp-Session-Id: {session_id}\r\nConnection: close\r\n\r\n"
    );
    let raw = roundtrip(&handle, request.as_bytes());
    let (head, _) = split_response(&raw);
    assert!(head.starts_with("HTTP/1.1 200"), "head: {head}");
    assert!(!sessions.validate(&session_id));

    // Second delete: the session is gone.
    let raw = roundtrip(&handle, request.as_bytes());
    let (head, _) = split_response(&raw);
    assert!(head.starts_with("HTTP/1.1 404"), "head: {head}");

    // No header at all: 400.
    let raw = roundtrip(
        &handle,
        b"DELETE /mcp HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n",
    );
    let (head, _) = split_response(&raw);
    assert!(head.starts_with("HTTP/1.1 400"), "head: {head}");
    handle.stop();
}

#[test]
#[serial]
fn worker_pool_offloads_blocking_handlers() {
    let handle = start_server(
        ServerConfig {
            thread_pool_size: 4,
            ..ServerConfig::default()
        },
        |server| {
            server.route("/slow", |_req, resp| {
                std::thread::sleep(Duration::from_millis(100));
                resp.set_body("done");
                HandlerAction::Status(200)
            });
        },
    );

    let started = Instant::now();
    let mut workers = Vec::new();
    for _ in 0..4 {
        let addr = handle.local_addr();
        workers.push(std::thread::spawn(move || {
            let mut stream = TcpStream::connect(addr).unwrap();
            stream
                .set_read_timeout(Some(Duration::from_secs(5)))
                .unwrap();
            stream
                .write_all(b"GET /slow HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n")
                .unwrap();
            let mut raw = Vec::new();
            stream.read_to_end(&mut raw).unwrap();
            raw
        }));
    }
    for worker in workers {
        let raw = worker.join().unwrap();
        let (head, body) = split_response(&raw);
        assert!(head.starts_with("HTTP/1.1 200"));
        assert_eq!(body, b"done");
    }
    // Four 100ms handlers on four workers finish far sooner than serially.
    assert!(started.elapsed() < Duration::from_millis(2000));
    handle.stop();
}

#[test]
fn keep_alive_disabled_by_config() {
    let handle = start_server(
        ServerConfig {
            keep_alive_enabled: false,
            ..ServerConfig::default()
        },
        hello_setup,
    );
    // The client asks for keep-alive; the server refuses.
    let raw = roundtrip(&handle, b"GET /hello HTTP/1.1\r\nHost: x\r\n\r\n");
    let (head, body) = split_response(&raw);
    assert!(head.contains("Connection: close\r\n"), "head: {head}");
    assert_eq!(body, b"hi");
    handle.stop();
}

#[test]
fn http10_defaults_to_close() {
    let handle = start_server(ServerConfig::default(), hello_setup);
    let raw = roundtrip(&handle, b"GET /hello HTTP/1.0\r\nHost: x\r\n\r\n");
    let (head, body) = split_response(&raw);
    assert!(head.starts_with("HTTP/1.0 200 OK\r\n"), "head: {head}");
    assert!(head.contains("Connection: close\r\n"));
    assert_eq!(body, b"hi");
    handle.stop();
}

#[test]
fn handler_sees_query_and_remote_addr() {
    let handle = start_server(ServerConfig::default(), |server| {
        server.route("/q", |req, resp| {
            assert!(req.remote_addr.is_some());
            resp.set_body(format!(
                "path={} query={}",
                req.path(),
                req.query().unwrap_or("-")
            ));
            HandlerAction::Status(200)
        });
    });
    let raw = roundtrip(
        &handle,
        b"GET /q?a=1&b=2 HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n",
    );
    let (_, body) = split_response(&raw);
    assert_eq!(body, b"path=/q query=a=1&b=2");
    handle.stop();
}

#[test]
fn put_and_patch_go_through_the_handler_table() {
    let handle = start_server(ServerConfig::default(), |server| {
        server.route("/res", |req, resp| {
            resp.set_body(format!("{} ok", req.method));
            HandlerAction::Status(200)
        });
    });
    for (request, expected) in [
        (
            b"PUT /res HTTP/1.1\r\nHost: x\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".as_ref(),
            b"PUT ok".as_ref(),
        ),
        (
            b"PATCH /res HTTP/1.1\r\nHost: x\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".as_ref(),
            b"PATCH ok".as_ref(),
        ),
    ] {
        let raw = roundtrip(&handle, request);
        let (head, body) = split_response(&raw);
        assert!(head.starts_with("HTTP/1.1 200"), "head: {head}");
        assert_eq!(body, expected);
    }
    handle.stop();
}

#[test]
fn unknown_status_code_gets_question_mark_reason() {
    let handle = start_server(ServerConfig::default(), |server| {
        server.route("/odd", |_req, _resp| HandlerAction::Status(299));
    });
    let raw = roundtrip(
        &handle,
        b"GET /odd HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n",
    );
    let (head, _) = split_response(&raw);
    assert!(head.starts_with("HTTP/1.1 299 ???\r\n"), "head: {head}");
    handle.stop();
}

#[test]
fn bare_lf_request_is_accepted() {
    let handle = start_server(ServerConfig::default(), hello_setup);
    let raw = roundtrip(&handle, b"GET /hello HTTP/1.1\nHost: x\nConnection: close\n\n");
    let (head, body) = split_response(&raw);
    assert!(head.starts_with("HTTP/1.1 200"), "head: {head}");
    assert_eq!(body, b"hi");
    handle.stop();
}
