//! Claude-specific JSON shapes for the stdio control channel.
//!
//! Ordinary stream messages are classified by [`crate::agents::EngineMessage`];
//! this module only covers the envelopes that are specific to talking to the
//! Claude CLI over `--input-format stream-json`.
//!
//! # Example
//!
//! Claude asks for permission:
//! ```json
//! {"type":"control_request","request_id":"req-1","request":{"subtype":"can_use_tool","tool_name":"Bash","input":{"command":"ls"}}}
//! ```
//!
//! The bridge answers on stdin:
//! ```json
//! {"type":"control_response","response":{"subtype":"success","request_id":"req-1","response":{"behavior":"allow","updatedInput":{"command":"ls"}}}}
//! ```

use serde::Deserialize;
use serde_json::{json, Value};

use crate::agents::{PermissionDecision, UserMessage};

/// Subtype of a tool permission request.
pub const CAN_USE_TOOL: &str = "can_use_tool";

/// A `control_request` line from Claude.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ControlRequestEnvelope {
    pub request_id: String,
    pub request: ControlRequest,
}

/// Body of a control request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ControlRequest {
    /// `can_use_tool` for permission prompts.
    pub subtype: String,

    #[serde(default)]
    pub tool_name: String,

    /// Tool input as arbitrary JSON.
    #[serde(default)]
    pub input: Option<Value>,

    #[serde(default)]
    pub tool_use_id: Option<String>,
}

impl ControlRequest {
    pub fn is_tool_permission(&self) -> bool {
        self.subtype == CAN_USE_TOOL
    }
}

/// Wrap the composite prompt in the stdin `user` envelope.
pub fn user_envelope(message: &UserMessage) -> Value {
    json!({
        "type": "user",
        "message": message,
    })
}

/// Build the stdin answer to a `can_use_tool` request.
pub fn control_response(request_id: &str, decision: &PermissionDecision) -> Value {
    json!({
        "type": "control_response",
        "response": {
            "subtype": "success",
            "request_id": request_id,
            "response": decision,
        }
    })
}
