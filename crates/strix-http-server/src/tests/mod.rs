//! Engine integration tests: real sockets, raw wire bytes.

mod engine_tests;

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use crate::config::ServerConfig;
use crate::server::{HttpServer, ServerHandle};

/// Start a server on an ephemeral port with the given setup applied.
pub(crate) fn start_server(
    config: ServerConfig,
    setup: impl FnOnce(&mut HttpServer),
) -> ServerHandle {
    let mut server = HttpServer::new(ServerConfig {
        port: 0,
        ..config
    });
    setup(&mut server);
    server.start().expect("server failed to start")
}

/// Write a raw request and read the whole response (the request should
/// carry `Connection: close` so the server delimits it for us).
pub(crate) fn roundtrip(handle: &ServerHandle, request: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(handle.local_addr()).expect("connect failed");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    stream.write_all(request).unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).expect("read failed");
    response
}

/// Split a raw response into (head, body) at the first blank line.
pub(crate) fn split_response(raw: &[u8]) -> (String, Vec<u8>) {
    let end = strix_http::find_header_end(raw).expect("no header terminator in response");
    (
        String::from_utf8_lossy(&raw[..end]).into_owned(),
        raw[end..].to_vec(),
    )
}

/// Read exactly one response with a `Content-Length` body from a kept-alive
/// stream.
pub(crate) fn read_one_response(stream: &mut TcpStream) -> (String, Vec<u8>) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        if let Some(end) = strix_http::find_header_end(&buf) {
            break end;
        }
        let n = stream.read(&mut chunk).expect("read failed");
        assert!(n > 0, "connection closed before response head");
        buf.extend_from_slice(&chunk[..n]);
    };
    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let content_length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().unwrap())
        })
        .unwrap_or(0);
    let mut body = buf[head_end..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut chunk).expect("read failed");
        assert!(n > 0, "connection closed mid-body");
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);
    (head, body)
}
