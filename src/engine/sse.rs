//! Incremental parser for `text/event-stream` bodies.
//!
//! Network chunks arrive with arbitrary boundaries, so bytes are buffered
//! until a full line is available. Lines accumulate into an event until a
//! blank line dispatches it.

/// One server-sent event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    /// `event:` field, when the server sets one.
    pub event: Option<String>,
    /// `data:` payload; multiple data lines are joined with newlines.
    pub data: String,
    /// `id:` field, when the server sets one.
    pub id: Option<String>,
}

impl SseEvent {
    /// OpenAI-compatible streams end with a `[DONE]` sentinel event.
    pub fn is_done(&self) -> bool {
        self.data.trim() == "[DONE]"
    }
}

/// Splits a line into field name and value, dropping one leading space of
/// the value as the format prescribes.
fn parse_field(line: &str) -> Option<(&str, &str)> {
    let colon = line.find(':')?;
    let value = &line[colon + 1..];
    Some((&line[..colon], value.strip_prefix(' ').unwrap_or(value)))
}

#[derive(Debug, Default)]
struct EventBuilder {
    event: Option<String>,
    data_lines: Vec<String>,
    id: Option<String>,
}

impl EventBuilder {
    /// Consume one line. A blank line dispatches the pending event.
    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.take();
        }
        if line.starts_with(':') {
            // Comment / keep-alive line.
            return None;
        }
        match parse_field(line) {
            Some(("data", value)) => self.data_lines.push(value.to_owned()),
            Some(("event", value)) => self.event = Some(value.to_owned()),
            Some(("id", value)) => self.id = Some(value.to_owned()),
            // Unknown fields and bare field names are ignored.
            Some(_) | None => {}
        }
        None
    }

    fn take(&mut self) -> Option<SseEvent> {
        if self.data_lines.is_empty() && self.event.is_none() && self.id.is_none() {
            return None;
        }
        Some(SseEvent {
            event: self.event.take(),
            data: std::mem::take(&mut self.data_lines).join("\n"),
            id: self.id.take(),
        })
    }
}

/// Byte-level incremental parser. Feed chunks with [`SseLineParser::push`]
/// as they arrive, then [`SseLineParser::flush`] at end of stream.
#[derive(Debug, Default)]
pub struct SseLineParser {
    // Raw bytes so a chunk boundary inside a multibyte char is harmless;
    // '\n' never occurs inside a UTF-8 sequence.
    buffer: Vec<u8>,
    builder: EventBuilder,
}

impl SseLineParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a chunk of bytes; returns events completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        let mut events = Vec::new();
        for &byte in chunk {
            if byte == b'\n' {
                let raw = std::mem::take(&mut self.buffer);
                let line = String::from_utf8_lossy(&raw);
                let line = line.strip_suffix('\r').unwrap_or(&line);
                if let Some(event) = self.builder.process_line(line) {
                    events.push(event);
                }
            } else {
                self.buffer.push(byte);
            }
        }
        events
    }

    /// Flush any buffered line and dispatch a final unterminated event.
    pub fn flush(&mut self) -> Option<SseEvent> {
        if !self.buffer.is_empty() {
            let raw = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&raw);
            let line = line.strip_suffix('\r').unwrap_or(&line);
            self.builder.process_line(line);
        }
        self.builder.take()
    }
}
