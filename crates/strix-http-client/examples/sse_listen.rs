//! Consume an SSE endpoint, reconnecting automatically.
//!
//! `cargo run --example sse_listen -- http://127.0.0.1:8080/mcp?session=<id>`

use strix_http_client::{HttpClient, SseClient};

fn main() {
    let url = std::env::args()
        .nth(1)
        .expect("usage: sse_listen <url>");

    let sse = SseClient::new(HttpClient::default(), url);
    let outcome = sse.run(|event| {
        println!(
            "[{}] {} {}",
            if event.id.is_empty() { "-" } else { &event.id },
            if event.event_type.is_empty() {
                "message"
            } else {
                &event.event_type
            },
            event.data
        );
    });
    if let Err(e) = outcome {
        eprintln!("stream failed: {e}");
    }
}
