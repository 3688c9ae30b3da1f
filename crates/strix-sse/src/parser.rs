//! Incremental event-stream parsing.

use tracing::trace;

/// One event lifted off the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSseEvent {
    /// Last `id:` field seen in the event; empty when none.
    pub id: String,
    /// `event:` field; empty when none.
    pub event_type: String,
    /// `data:` lines joined with `\n`.
    pub data: String,
    /// `retry:` value in milliseconds, or -1 when absent.
    pub retry: i32,
    /// Whether the event carried at least one `data:` field.
    pub has_data: bool,
}

/// Incremental parser for a `text/event-stream` body.
///
/// Feed chunks as they arrive; complete events (terminated by a blank line)
/// come back in order. Anything after the last terminator stays buffered
/// for the next feed.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk; returns the events it completed.
    pub fn feed(&mut self, chunk: &str) -> Vec<ParsedSseEvent> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();
        while let Some((event_end, rest_start)) = next_event_boundary(&self.buffer) {
            let event_text: String = self.buffer[..event_end].to_string();
            self.buffer.drain(..rest_start);
            if let Some(event) = parse_event(&event_text) {
                trace!(id = %event.id, event_type = %event.event_type, "sse event parsed");
                events.push(event);
            }
        }
        events
    }

    /// Feed raw bytes; invalid UTF-8 is replaced, which matches how
    /// browsers treat event streams.
    pub fn feed_bytes(&mut self, chunk: &[u8]) -> Vec<ParsedSseEvent> {
        self.feed(&String::from_utf8_lossy(chunk))
    }

    /// Bytes held back waiting for an event terminator.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }
}

/// Find the earliest blank-line terminator (`\n\n` or `\r\n\r\n`).
/// Returns the end of the event text and the offset where the remainder
/// starts.
fn next_event_boundary(buffer: &str) -> Option<(usize, usize)> {
    let bytes = buffer.as_bytes();
    for i in 0..bytes.len() {
        if bytes[i..].starts_with(b"\r\n\r\n") {
            return Some((i, i + 4));
        }
        if bytes[i..].starts_with(b"\n\n") {
            return Some((i, i + 2));
        }
    }
    None
}

/// Parse one event's worth of lines. Returns `None` when nothing is
/// dispatchable (comment-only events).
fn parse_event(text: &str) -> Option<ParsedSseEvent> {
    let mut id = String::new();
    let mut event_type = String::new();
    let mut data_lines: Vec<&str> = Vec::new();
    let mut retry: i32 = -1;

    for line in split_lines(text) {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.find(':') {
            Some(idx) => {
                let value = &line[idx + 1..];
                // A single leading space belongs to the separator.
                (&line[..idx], value.strip_prefix(' ').unwrap_or(value))
            }
            None => (line, ""),
        };
        match field {
            "id" => id = value.to_string(),
            "event" => event_type = value.to_string(),
            "data" => data_lines.push(value),
            "retry" => {
                // Garbage retry values are ignored, per WHATWG.
                if let Ok(ms) = value.trim().parse::<u32>() {
                    retry = ms as i32;
                }
            }
            _ => {}
        }
    }

    let has_data = !data_lines.is_empty();
    if !has_data && id.is_empty() && retry < 0 {
        return None;
    }
    Some(ParsedSseEvent {
        id,
        event_type,
        data: data_lines.join("\n"),
        retry,
        has_data,
    })
}

/// Lines separated by `\n` or `\r\n` (a dangling `\r` is tolerated).
fn split_lines(text: &str) -> impl Iterator<Item = &str> {
    text.split('\n').map(|line| line.strip_suffix('\r').unwrap_or(line))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::SseEvent;

    #[test]
    fn parses_simple_event() {
        let mut parser = SseParser::new();
        let events = parser.feed("data: hello\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "hello");
        assert!(events[0].has_data);
        assert_eq!(events[0].retry, -1);
    }

    #[test]
    fn event_held_until_terminator() {
        let mut parser = SseParser::new();
        assert!(parser.feed("data: partial").is_empty());
        assert!(parser.feed("\n").is_empty());
        let events = parser.feed("\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "partial");
    }

    #[test]
    fn crlf_framing() {
        let mut parser = SseParser::new();
        let events = parser.feed("id: 3\r\ndata: x\r\n\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, "3");
        assert_eq!(events[0].data, "x");
    }

    #[test]
    fn multiline_data_joined() {
        let mut parser = SseParser::new();
        let events = parser.feed("data: one\ndata: two\n\n");
        assert_eq!(events[0].data, "one\ntwo");
    }

    #[test]
    fn comments_are_not_dispatched() {
        let mut parser = SseParser::new();
        assert!(parser.feed(": keepalive\n\n").is_empty());
        // But a comment inside a real event is simply skipped.
        let events = parser.feed(": note\ndata: real\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "real");
    }

    #[test]
    fn id_only_and_retry_only_dispatch() {
        let mut parser = SseParser::new();
        let events = parser.feed("id: 42\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, "42");
        assert!(!events[0].has_data);

        let events = parser.feed("retry: 250\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].retry, 250);
    }

    #[test]
    fn bad_retry_is_ignored() {
        let mut parser = SseParser::new();
        assert!(parser.feed("retry: soon\n\n").is_empty());
        let events = parser.feed("retry: -5\ndata: x\n\n");
        assert_eq!(events[0].retry, -1);
    }

    #[test]
    fn leading_space_stripped_once() {
        let mut parser = SseParser::new();
        let events = parser.feed("data:  two spaces\n\n");
        assert_eq!(events[0].data, " two spaces");
    }

    #[test]
    fn field_without_colon_has_empty_value() {
        let mut parser = SseParser::new();
        let events = parser.feed("data\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "");
        assert!(events[0].has_data);
    }

    #[test]
    fn multiple_events_in_one_chunk() {
        let mut parser = SseParser::new();
        let events = parser.feed("data: a\n\ndata: b\n\ndata: c");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, "a");
        assert_eq!(events[1].data, "b");
        let tail = parser.feed("\n\n");
        assert_eq!(tail[0].data, "c");
    }

    #[test]
    fn emit_parse_round_trip() {
        let cases = vec![
            SseEvent::new("hello"),
            SseEvent::new("multi\nline\ndata").with_id("9"),
            SseEvent::new("x").with_type("message").with_id("abc").with_retry(3000),
            SseEvent::new("").with_id("id-only"),
        ];
        for case in cases {
            let mut parser = SseParser::new();
            let events = parser.feed(&case.format());
            assert_eq!(events.len(), 1, "case: {case:?}");
            let parsed = &events[0];
            assert_eq!(parsed.data, case.data);
            assert_eq!(parsed.id, case.id.clone().unwrap_or_default());
            assert_eq!(
                parsed.event_type,
                case.event_type.clone().unwrap_or_default()
            );
            match case.retry_ms {
                Some(ms) => assert_eq!(parsed.retry, ms as i32),
                None => assert_eq!(parsed.retry, -1),
            }
        }
    }
}
