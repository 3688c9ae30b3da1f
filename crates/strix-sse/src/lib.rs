//! Server-Sent Events support.
//!
//! The server side formats outgoing [`SseEvent`]s onto the wire; the client
//! side parses a `text/event-stream` byte stream incrementally with
//! [`SseParser`], following the WHATWG dispatch rules.

mod event;
mod parser;

pub use event::SseEvent;
pub use parser::{ParsedSseEvent, SseParser};
