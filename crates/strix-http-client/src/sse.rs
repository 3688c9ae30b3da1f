//! Auto-reconnecting SSE consumer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use strix_http::Method;
use strix_sse::{ParsedSseEvent, SseParser};
use tracing::{debug, warn};

use crate::client::HttpClient;
use crate::error::{ClientError, Result};
use crate::request::ClientRequest;

/// Long-lived `text/event-stream` consumer.
///
/// Opens a GET with `Accept: text/event-stream`, feeds arriving chunks
/// through the incremental parser, and dispatches events to the caller.
/// When the stream ends (server close, timeout, transport error) and
/// auto-reconnect is on, it sleeps the reconnect delay and reopens the
/// stream carrying `Last-Event-ID`. `retry:` directives adjust the delay.
#[derive(Debug)]
pub struct SseClient {
    client: HttpClient,
    url: String,
    last_event_id: Mutex<String>,
    reconnect_delay: Mutex<Duration>,
    closed: AtomicBool,
}

impl SseClient {
    pub fn new(client: HttpClient, url: impl Into<String>) -> Self {
        let reconnect_delay = client.config().reconnect_delay;
        Self {
            client,
            url: url.into(),
            last_event_id: Mutex::new(String::new()),
            reconnect_delay: Mutex::new(reconnect_delay),
            closed: AtomicBool::new(false),
        }
    }

    /// Last event id observed on the stream; carried on reconnect.
    pub fn last_event_id(&self) -> String {
        self.last_event_id.lock().clone()
    }

    /// Stop after the current stream terminates: no further reconnects.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Consume the stream, dispatching each event. Returns when the stream
    /// ends and reconnecting is off (or [`SseClient::close`] was called);
    /// transport errors with reconnect off are returned to the caller.
    pub fn run(&self, mut on_event: impl FnMut(&ParsedSseEvent)) -> Result<()> {
        loop {
            if self.is_closed() {
                return Ok(());
            }

            let mut request = ClientRequest::new(Method::Get, &self.url)
                .header("Accept", "text/event-stream")
                .header("Cache-Control", "no-cache");
            let last_id = self.last_event_id();
            if !last_id.is_empty() {
                request = request.header("Last-Event-ID", last_id);
            }

            let mut parser = SseParser::new();
            let outcome = {
                let mut sink = |chunk: &[u8]| {
                    for event in parser.feed_bytes(chunk) {
                        self.observe(&event);
                        on_event(&event);
                    }
                };
                self.client.send_streaming(request, &mut sink)
            };

            match outcome {
                Ok(response) if !response.is_success() => {
                    warn!(status = response.status, "sse endpoint refused the stream");
                    if !self.client.config().auto_reconnect_sse {
                        return Ok(());
                    }
                }
                Ok(_) => {
                    debug!("sse stream ended");
                }
                Err(e) if e.is_timeout() => {
                    debug!("sse stream idle timeout; treating as end of stream");
                }
                Err(e) => {
                    if !self.client.config().auto_reconnect_sse || self.is_closed() {
                        return Err(e);
                    }
                    warn!(error = %e, "sse stream failed; reconnecting");
                }
            }

            if !self.client.config().auto_reconnect_sse || self.is_closed() {
                return Ok(());
            }
            std::thread::sleep(*self.reconnect_delay.lock());
        }
    }

    fn observe(&self, event: &ParsedSseEvent) {
        if !event.id.is_empty() {
            *self.last_event_id.lock() = event.id.clone();
        }
        if event.retry >= 0 {
            *self.reconnect_delay.lock() = Duration::from_millis(event.retry as u64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observe_tracks_id_and_retry() {
        let sse = SseClient::new(HttpClient::default(), "http://localhost/events");
        assert_eq!(sse.last_event_id(), "");

        sse.observe(&ParsedSseEvent {
            id: "41".to_string(),
            event_type: String::new(),
            data: "x".to_string(),
            retry: -1,
            has_data: true,
        });
        assert_eq!(sse.last_event_id(), "41");

        sse.observe(&ParsedSseEvent {
            id: String::new(),
            event_type: String::new(),
            data: String::new(),
            retry: 250,
            has_data: false,
        });
        // Id unchanged, delay updated.
        assert_eq!(sse.last_event_id(), "41");
        assert_eq!(*sse.reconnect_delay.lock(), Duration::from_millis(250));
    }

    #[test]
    fn close_is_sticky() {
        let sse = SseClient::new(HttpClient::default(), "http://localhost/events");
        assert!(!sse.is_closed());
        sse.close();
        assert!(sse.is_closed());
    }
}
