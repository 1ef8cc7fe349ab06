//! Engine boundary.
//!
//! The bridge consumes an engine through three small traits:
//!
//! - [`Engine`] starts a stream for one prompt turn.
//! - [`EngineStream`] yields [`EngineMessage`]s one at a time.
//! - [`ToolApprover`] is the callback the engine awaits before running a tool.
//!
//! The Claude CLI backend lives in [`claude`]; tests drive the same traits with
//! scripted in-memory engines.

pub mod claude;
pub mod event;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::EngineError;
use crate::session::PermissionMode;

pub use event::{ContentBlock, EngineEvent, EngineMessage, MessageBody, StreamEvent};

/// The composite user message sent to the engine for one turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserMessage {
    pub role: String,
    pub content: Vec<UserContent>,
}

impl UserMessage {
    pub fn new(content: Vec<UserContent>) -> Self {
        Self {
            role: "user".to_string(),
            content,
        }
    }

    /// Concatenated text of all text entries.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|entry| match entry {
                UserContent::Text { text } => Some(text.as_str()),
                UserContent::Image { .. } => None,
            })
            .collect()
    }
}

/// One entry of a user message, in the engine's content-block format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UserContent {
    Text { text: String },
    Image { source: ImageSource },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSource {
    /// Always `"base64"` for prompt images.
    #[serde(rename = "type")]
    pub source_type: String,
    pub media_type: String,
    pub data: String,
}

impl ImageSource {
    pub fn base64(media_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            source_type: "base64".to_string(),
            media_type: media_type.into(),
            data: data.into(),
        }
    }
}

/// Verdict returned to the engine for a tool-use request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "behavior", rename_all = "snake_case")]
pub enum PermissionDecision {
    #[serde(rename_all = "camelCase")]
    Allow { updated_input: Value },
    Deny { message: String },
}

impl PermissionDecision {
    pub fn is_allow(&self) -> bool {
        matches!(self, Self::Allow { .. })
    }
}

/// Approval callback handed to the engine for the duration of a turn.
#[async_trait]
pub trait ToolApprover: Send + Sync {
    /// `tool_use_id` is the call the engine is asking about, when it says so.
    async fn decide(
        &self,
        tool_name: &str,
        input: &Value,
        tool_use_id: Option<&str>,
    ) -> PermissionDecision;
}

/// Everything the engine needs to run one turn.
#[derive(Clone)]
pub struct EngineRequest {
    pub message: UserMessage,
    pub permission_mode: PermissionMode,
    /// Engine conversation to resume; `None` on a session's first turn.
    pub resume: Option<String>,
    pub working_dir: Option<String>,
    pub approver: Arc<dyn ToolApprover>,
    /// Cancelled when the turn is abandoned; the engine should stop yielding.
    pub cancel: CancellationToken,
}

impl std::fmt::Debug for EngineRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRequest")
            .field("message", &self.message)
            .field("permission_mode", &self.permission_mode)
            .field("resume", &self.resume)
            .field("working_dir", &self.working_dir)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

/// An engine that turns a request into an event stream.
#[async_trait]
pub trait Engine: Send + Sync {
    async fn start(&self, request: EngineRequest) -> Result<Box<dyn EngineStream>, EngineError>;
}

/// A live event stream for one turn.
#[async_trait]
pub trait EngineStream: Send {
    /// Next message, `None` once the stream is exhausted.
    async fn next_message(&mut self) -> Option<Result<EngineMessage, EngineError>>;
}
