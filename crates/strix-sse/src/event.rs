//! Outgoing event formatting.

/// An event to be written onto a `text/event-stream` response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    /// `event:` field; omitted when empty.
    pub event_type: Option<String>,
    /// Event payload. Multi-line data is split onto one `data:` field per
    /// line.
    pub data: String,
    /// `id:` field; omitted when empty.
    pub id: Option<String>,
    /// `retry:` reconnection hint in milliseconds.
    pub retry_ms: Option<u32>,
}

impl SseEvent {
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            ..Self::default()
        }
    }

    pub fn with_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_retry(mut self, retry_ms: u32) -> Self {
        self.retry_ms = Some(retry_ms);
        self
    }

    /// Format for the wire: one `field: value` line per non-empty field,
    /// data split per line, blank-line terminator.
    pub fn format(&self) -> String {
        let mut out = String::with_capacity(self.data.len() + 32);
        if let Some(event_type) = &self.event_type {
            if !event_type.is_empty() {
                out.push_str("event: ");
                out.push_str(event_type);
                out.push('\n');
            }
        }
        if let Some(id) = &self.id {
            if !id.is_empty() {
                out.push_str("id: ");
                out.push_str(id);
                out.push('\n');
            }
        }
        if let Some(retry) = self.retry_ms {
            out.push_str("retry: ");
            out.push_str(&retry.to_string());
            out.push('\n');
        }
        if !self.data.is_empty() {
            for line in self.data.split('\n') {
                out.push_str("data: ");
                out.push_str(line);
                out.push('\n');
            }
        }
        out.push('\n');
        out
    }
}
