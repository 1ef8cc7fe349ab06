//! Engine event to session update translation.
//!
//! [`MessageTranslator`] turns one [`EngineEvent`] into the session updates the
//! client should see, updating the session's tool-call ledger as it goes. It
//! never performs I/O: the driver sends the returned updates in order.
//!
//! | Event | Updates |
//! |---|---|
//! | `system`, `result` | none |
//! | `user` tool results | `tool_call_update` (completed) unless the call is a plan |
//! | `assistant` text | `agent_message_chunk` |
//! | `assistant` tool use, `tool_use_start` | `tool_call` (pending), or `plan` for TodoWrite |
//! | `text` | `agent_message_chunk` |
//! | `tool_use_output` | `tool_call_update` (completed) unless the call is a plan |
//! | `tool_use_error` | `tool_call_update` (failed) |
//! | `stream_event` text start / delta | `agent_message_chunk` |

use serde_json::{json, Value};

use crate::agents::event::tool_result_text;
use crate::agents::{ContentBlock, EngineEvent, MessageBody, StreamEvent};
use crate::protocol::{
    PlanEntry, SessionUpdate, ToolCall, ToolCallContent, ToolCallStatus, ToolCallUpdate,
};
use crate::session::ToolCallLedger;
use crate::tools::{classify_tool_kind, render_tool_content, ToolInput, TODO_WRITE_TOOL};

/// Title used for tool calls that arrive without a name.
const UNNAMED_TOOL_TITLE: &str = "Tool";

/// Translates engine events for one session.
pub struct MessageTranslator<'a> {
    ledger: &'a mut ToolCallLedger,
}

impl<'a> MessageTranslator<'a> {
    pub fn new(ledger: &'a mut ToolCallLedger) -> Self {
        Self { ledger }
    }

    /// Translate one event into zero or more updates.
    pub fn translate(&mut self, event: &EngineEvent) -> Vec<SessionUpdate> {
        match event {
            EngineEvent::System { .. } | EngineEvent::Result { .. } => Vec::new(),

            EngineEvent::User { message } => message
                .as_ref()
                .map(|message| self.tool_results(message))
                .unwrap_or_default(),

            EngineEvent::Assistant { message, text } => {
                match message.as_ref().and_then(|m| m.content.as_ref()) {
                    Some(blocks) => self.assistant_blocks(blocks),
                    None => text.iter().map(SessionUpdate::message_chunk).collect(),
                }
            }

            EngineEvent::Text { text } => text.iter().map(SessionUpdate::message_chunk).collect(),

            EngineEvent::ToolUseStart {
                id,
                tool_name,
                input,
            } => {
                let input = input.clone().unwrap_or_else(|| json!({}));
                vec![self.tool_use(
                    id.as_deref().unwrap_or_default(),
                    tool_name.as_deref().unwrap_or_default(),
                    input,
                )]
            }

            EngineEvent::ToolUseOutput { id, output } => self
                .tool_output(
                    id.as_deref().unwrap_or_default(),
                    output.as_deref().unwrap_or_default(),
                )
                .into_iter()
                .collect(),

            EngineEvent::ToolUseError { id, error } => vec![tool_error(
                id.as_deref().unwrap_or_default(),
                error.as_deref().unwrap_or_default(),
            )],

            EngineEvent::StreamEvent { event } => stream_event(event).into_iter().collect(),

            EngineEvent::Unknown { event_type } => {
                log::debug!("Ignoring engine event '{}'", event_type);
                Vec::new()
            }
        }
    }

    fn assistant_blocks(&mut self, blocks: &[ContentBlock]) -> Vec<SessionUpdate> {
        let mut updates = Vec::new();
        for block in blocks {
            match block {
                ContentBlock::Text { text } => updates.push(SessionUpdate::message_chunk(text)),
                ContentBlock::ToolUse { id, name, input } => {
                    let input = input.clone().unwrap_or_else(|| json!({}));
                    updates.push(self.tool_use(id, name, input));
                }
                ContentBlock::ToolResult { .. } | ContentBlock::Other => {}
            }
        }
        updates
    }

    /// A tool announcement: a plan for TodoWrite, a pending tool call otherwise.
    fn tool_use(&mut self, id: &str, name: &str, input: Value) -> SessionUpdate {
        self.ledger.record_tool_use(name, id);

        if name == TODO_WRITE_TOOL {
            if let ToolInput::TodoWrite { todos } = ToolInput::parse(name, &input) {
                self.ledger.mark_plan(id);
                return SessionUpdate::Plan {
                    entries: todos.into_iter().map(PlanEntry::from).collect(),
                };
            }
        }

        let content = render_tool_content(name, &input);
        self.ledger.start_call(id, content.clone());

        SessionUpdate::ToolCall(ToolCall {
            tool_call_id: id.to_string(),
            title: if name.is_empty() {
                UNNAMED_TOOL_TITLE.to_string()
            } else {
                name.to_string()
            },
            kind: classify_tool_kind(name),
            status: ToolCallStatus::Pending,
            content,
            raw_input: Some(input),
        })
    }

    fn tool_results(&mut self, message: &MessageBody) -> Vec<SessionUpdate> {
        let Some(blocks) = message.content.as_ref() else {
            return Vec::new();
        };

        let mut updates = Vec::new();
        for block in blocks {
            let ContentBlock::ToolResult {
                tool_use_id,
                content,
                ..
            } = block
            else {
                continue;
            };
            if self.ledger.is_plan(tool_use_id) {
                continue;
            }

            let text = tool_result_text(content.as_ref()).unwrap_or_default();
            let accumulated = self
                .ledger
                .append(tool_use_id, ToolCallContent::text(format!("{}\n", text)));
            updates.push(completed(tool_use_id, accumulated, raw_result(content.as_ref())));
        }
        updates
    }

    fn tool_output(&mut self, id: &str, output: &str) -> Option<SessionUpdate> {
        if self.ledger.is_plan(id) {
            return None;
        }
        let accumulated = self.ledger.append(id, ToolCallContent::text(output));
        let raw_output = (!output.is_empty()).then(|| json!({ "output": output }));
        Some(completed(id, accumulated, raw_output))
    }
}

/// The result payload exactly as the engine sent it; absent, null or empty
/// string means there is nothing to attach.
fn raw_result(content: Option<&Value>) -> Option<Value> {
    match content? {
        Value::Null => None,
        Value::String(text) if text.is_empty() => None,
        raw => Some(json!({ "output": raw })),
    }
}

fn completed(id: &str, content: Vec<ToolCallContent>, raw_output: Option<Value>) -> SessionUpdate {
    SessionUpdate::ToolCallUpdate(ToolCallUpdate {
        tool_call_id: id.to_string(),
        status: Some(ToolCallStatus::Completed),
        content: Some(content),
        raw_output,
    })
}

/// Errors replace the call's content rather than extending it.
fn tool_error(id: &str, error: &str) -> SessionUpdate {
    SessionUpdate::ToolCallUpdate(ToolCallUpdate {
        tool_call_id: id.to_string(),
        status: Some(ToolCallStatus::Failed),
        content: Some(vec![ToolCallContent::text(format!("Error: {}", error))]),
        raw_output: Some(json!({ "error": error })),
    })
}

fn stream_event(event: &StreamEvent) -> Option<SessionUpdate> {
    match event {
        StreamEvent::ContentBlockStart { content_block } if content_block.block_type == "text" => {
            Some(SessionUpdate::message_chunk(
                content_block.text.clone().unwrap_or_default(),
            ))
        }
        StreamEvent::ContentBlockDelta { delta } if delta.delta_type == "text_delta" => {
            Some(SessionUpdate::message_chunk(delta.text.clone().unwrap_or_default()))
        }
        _ => None,
    }
}
