//! Plain HTTP server with a streaming route.
//!
//! `cargo run --example hello_server`, then `curl -i http://127.0.0.1:8080/`
//! or `curl -iN http://127.0.0.1:8080/count` for the chunked stream.

use strix_http::StreamChunk;
use strix_http_server::{HandlerAction, HttpServer, ServerConfig};

fn main() {
    let mut server = HttpServer::new(ServerConfig {
        port: 8080,
        ..ServerConfig::default()
    });

    server.route("/count", |_req, resp| {
        let mut remaining = 5u32;
        resp.set_header("Content-Type", "text/plain");
        resp.set_streaming(move || {
            if remaining == 0 {
                return StreamChunk::End;
            }
            remaining -= 1;
            StreamChunk::Data(format!("tick {}\n", 5 - remaining).into_bytes())
        });
        HandlerAction::Status(200)
    });

    server.route("/", |req, resp| {
        resp.set_typed_body("text/plain", format!("hello from {}\n", req.path()));
        HandlerAction::Status(200)
    });

    let handle = server.start().expect("failed to start");
    println!("listening on http://{}/", handle.local_addr());
    loop {
        std::thread::sleep(std::time::Duration::from_secs(60));
    }
}
