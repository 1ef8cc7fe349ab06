//! Typed events produced by the engine.
//!
//! Every message the engine streams carries a `"type"` discriminator. Known
//! discriminators map onto [`EngineEvent`] variants; anything else (or a known
//! type whose payload does not deserialize) becomes [`EngineEvent::Unknown`]
//! so newer engine releases never break a turn.
//!
//! # Example JSON
//!
//! ```json
//! {"type":"assistant","session_id":"sess-123","message":{"role":"assistant","content":[{"type":"text","text":"Hi"}]}}
//! {"type":"tool_use_output","id":"toolu_1","output":"done"}
//! {"type":"stream_event","event":{"type":"content_block_delta","delta":{"type":"text_delta","text":"He"}}}
//! ```

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// One message from the engine stream plus the resume token it carried.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineMessage {
    /// Engine-side conversation id, usable to resume on a later turn.
    pub session_id: Option<String>,
    pub event: EngineEvent,
}

impl EngineMessage {
    pub fn new(event: EngineEvent) -> Self {
        Self {
            session_id: None,
            event,
        }
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Classify a raw JSON message.
    ///
    /// Never fails: unknown or malformed messages become
    /// [`EngineEvent::Unknown`] carrying their discriminator.
    pub fn from_value(value: Value) -> Self {
        let session_id = value
            .get("session_id")
            .and_then(Value::as_str)
            .filter(|sid| !sid.is_empty())
            .map(str::to_string);
        let event_type = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let event = match serde_json::from_value::<EngineEvent>(value) {
            Ok(event) => event,
            Err(err) => {
                log::debug!("Unrecognized engine message '{}': {}", event_type, err);
                EngineEvent::Unknown { event_type }
            }
        };

        Self { session_id, event }
    }
}

/// Closed set of engine event kinds the bridge understands.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// Engine bookkeeping (init, hooks); never shown to the client.
    System {
        #[serde(default)]
        subtype: Option<String>,
    },

    /// Echoed user message; carries tool results.
    User {
        #[serde(default)]
        message: Option<MessageBody>,
    },

    /// Assistant reply with structured content, or a bare `text` field.
    Assistant {
        #[serde(default)]
        message: Option<MessageBody>,
        #[serde(default)]
        text: Option<String>,
    },

    /// Terminal marker for the engine's own turn.
    Result {
        #[serde(default)]
        subtype: Option<String>,
        #[serde(default)]
        result: Option<String>,
        #[serde(default)]
        is_error: bool,
    },

    Text {
        #[serde(default)]
        text: Option<String>,
    },

    ToolUseStart {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        tool_name: Option<String>,
        #[serde(default)]
        input: Option<Value>,
    },

    ToolUseOutput {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        output: Option<String>,
    },

    ToolUseError {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        error: Option<String>,
    },

    /// Raw partial-message delta from the model API.
    StreamEvent { event: StreamEvent },

    /// Discriminator the bridge does not understand.
    #[serde(skip)]
    Unknown { event_type: String },
}

impl EngineEvent {
    /// Discriminator as it appears on the wire.
    pub fn kind(&self) -> &str {
        match self {
            Self::System { .. } => "system",
            Self::User { .. } => "user",
            Self::Assistant { .. } => "assistant",
            Self::Result { .. } => "result",
            Self::Text { .. } => "text",
            Self::ToolUseStart { .. } => "tool_use_start",
            Self::ToolUseOutput { .. } => "tool_use_output",
            Self::ToolUseError { .. } => "tool_use_error",
            Self::StreamEvent { .. } => "stream_event",
            Self::Unknown { event_type } => event_type,
        }
    }
}

/// The `message` envelope of user and assistant events.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MessageBody {
    #[serde(default)]
    pub role: Option<String>,

    /// `None` when the envelope has no `content` key at all.
    #[serde(default, deserialize_with = "blocks_or_text")]
    pub content: Option<Vec<ContentBlock>>,
}

/// A block inside a message envelope.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        #[serde(default)]
        id: String,
        #[serde(default)]
        name: String,
        #[serde(default)]
        input: Option<Value>,
    },
    ToolResult {
        #[serde(default)]
        tool_use_id: String,
        #[serde(default)]
        content: Option<Value>,
        #[serde(default)]
        is_error: bool,
    },
    /// Thinking, images and anything newer.
    #[serde(other)]
    Other,
}

/// Message content is usually a list of blocks but may be a bare string.
fn blocks_or_text<'de, D>(deserializer: D) -> Result<Option<Vec<ContentBlock>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Content {
        Blocks(Vec<ContentBlock>),
        Text(String),
    }

    Ok(match Option::<Content>::deserialize(deserializer)? {
        Some(Content::Blocks(blocks)) => Some(blocks),
        Some(Content::Text(text)) => Some(vec![ContentBlock::Text { text }]),
        None => None,
    })
}

/// Flatten a tool result payload into display text.
///
/// Results are either a plain string or a list of `{"type":"text"}` blocks.
pub fn tool_result_text(content: Option<&Value>) -> Option<String> {
    match content? {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(|item| item.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        other => Some(other.to_string()),
    }
}

/// Partial-message events from the model API.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    ContentBlockStart { content_block: StreamContentBlock },
    ContentBlockDelta { delta: StreamDelta },
    ContentBlockStop,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StreamContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StreamDelta {
    #[serde(rename = "type")]
    pub delta_type: String,
    #[serde(default)]
    pub text: Option<String>,
}
