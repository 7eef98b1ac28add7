//! Incremental line decoder
//!
//! Bytes are buffered rather than text because a fragment boundary may fall
//! inside a multi-byte UTF-8 sequence.

use super::StreamEvent;
use serde_json::Value;
use thiserror::Error;

/// Prefix of every event line
pub const EVENT_PREFIX: &[u8] = b"data:";

/// A single line that could not be decoded. Never aborts the stream.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("event line is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
    #[error("event payload is not valid JSON: {0}")]
    Syntax(#[source] serde_json::Error),
    #[error("malformed {kind} event: {source}")]
    Shape {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

enum LineOutcome {
    Event(StreamEvent),
    Blank,
    /// Unknown prefix or unknown discriminant; forward-compatible drop
    Ignored,
    Failed(DecodeError),
}

/// Decoder bound to one stream's lifetime
#[derive(Debug, Default)]
pub struct StreamDecoder {
    buffer: Vec<u8>,
    decode_errors: usize,
    ignored_lines: usize,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment and return every event completed by it
    pub fn feed(&mut self, fragment: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(fragment);

        let mut events = Vec::new();
        let mut consumed = 0;
        while let Some(offset) = self.buffer[consumed..].iter().position(|&b| b == b'\n') {
            let end = consumed + offset;
            let line = &self.buffer[consumed..end];
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            match decode_line(line) {
                LineOutcome::Event(event) => events.push(event),
                LineOutcome::Blank => {}
                LineOutcome::Ignored => self.ignored_lines += 1,
                LineOutcome::Failed(e) => {
                    self.decode_errors += 1;
                    tracing::warn!(error = %e, "Skipping undecodable stream line");
                }
            }
            consumed = end + 1;
        }
        self.buffer.drain(..consumed);

        events
    }

    /// End of input: discard any unterminated line. Returns the bytes dropped.
    pub fn finish(&mut self) -> usize {
        let dropped = self.buffer.len();
        if dropped > 0 {
            tracing::warn!(bytes = dropped, "Stream ended inside an unterminated line");
        }
        self.buffer.clear();
        dropped
    }

    /// Lines skipped because they could not be decoded
    pub fn decode_errors(&self) -> usize {
        self.decode_errors
    }

    /// Lines dropped for an unknown prefix or event type
    pub fn ignored_lines(&self) -> usize {
        self.ignored_lines
    }

    /// Bytes waiting for a line terminator
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }
}

fn decode_line(line: &[u8]) -> LineOutcome {
    if line.is_empty() {
        return LineOutcome::Blank;
    }
    let Some(payload) = line.strip_prefix(EVENT_PREFIX) else {
        tracing::debug!(len = line.len(), "Ignoring line without event prefix");
        return LineOutcome::Ignored;
    };
    let payload = payload.strip_prefix(b" ").unwrap_or(payload);

    let text = match std::str::from_utf8(payload) {
        Ok(text) => text,
        Err(e) => return LineOutcome::Failed(e.into()),
    };
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => return LineOutcome::Failed(DecodeError::Syntax(e)),
    };
    let Some(kind) = StreamEvent::known_kind(&value) else {
        tracing::debug!(
            kind = value.get("type").and_then(serde_json::Value::as_str).unwrap_or("<missing>"),
            "Ignoring event with unknown type"
        );
        return LineOutcome::Ignored;
    };

    match serde_json::from_value(value) {
        Ok(event) => LineOutcome::Event(event),
        Err(source) => LineOutcome::Failed(DecodeError::Shape { kind, source }),
    }
}
