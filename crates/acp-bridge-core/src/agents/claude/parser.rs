//! Claude stream parser.
//!
//! Claude writes one JSON object per line on stdout. Each line is either a
//! control request (Claude waiting on a permission decision) or an ordinary
//! stream message for the translator.
//!
//! Data read from the process may arrive in chunks that split lines, so the
//! parser buffers until it sees a newline. Call [`ClaudeParser::flush`] when
//! stdout closes to pick up a final unterminated line.

use serde_json::Value;

use crate::agents::EngineMessage;

use super::types::{ControlRequest, ControlRequestEnvelope};

/// One parsed line of Claude output.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaudeOutput {
    /// A stream message for the translator.
    Message(EngineMessage),

    /// Claude is blocked until the bridge answers on stdin.
    ControlRequest {
        request_id: String,
        request: ControlRequest,
    },
}

/// Line-buffering parser state for one Claude process.
#[derive(Debug, Default)]
pub struct ClaudeParser {
    /// Buffer for incomplete lines.
    buffer: String,
}

impl ClaudeParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of stdout and collect every complete line's output.
    pub fn feed(&mut self, data: &str) -> Vec<ClaudeOutput> {
        self.buffer.push_str(data);

        // Take the buffer so it can be split while we hold the remainder.
        let buffer = std::mem::take(&mut self.buffer);
        let mut lines: Vec<&str> = buffer.split('\n').collect();
        if let Some(incomplete) = lines.pop() {
            self.buffer = incomplete.to_string();
        }

        lines.into_iter().filter_map(parse_line).collect()
    }

    /// Parse whatever is left in the buffer.
    pub fn flush(&mut self) -> Vec<ClaudeOutput> {
        let remaining = std::mem::take(&mut self.buffer);
        parse_line(&remaining).into_iter().collect()
    }
}

/// Parse a single line. Blank lines and invalid JSON yield `None`.
pub fn parse_line(line: &str) -> Option<ClaudeOutput> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    let value: Value = match serde_json::from_str(trimmed) {
        Ok(value) => value,
        Err(err) => {
            log::debug!("Skipping non-JSON engine output ({}): {}", err, trimmed);
            return None;
        }
    };

    match value.get("type").and_then(Value::as_str) {
        Some("control_request") => match serde_json::from_value::<ControlRequestEnvelope>(value) {
            Ok(envelope) => Some(ClaudeOutput::ControlRequest {
                request_id: envelope.request_id,
                request: envelope.request,
            }),
            Err(err) => {
                log::warn!("Malformed control request from engine: {}", err);
                None
            }
        },
        _ => Some(ClaudeOutput::Message(EngineMessage::from_value(value))),
    }
}
