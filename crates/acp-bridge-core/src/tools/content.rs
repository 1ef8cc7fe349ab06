//! Rendering of tool input into tool-call content blocks.

use serde_json::Value;

use super::input::ToolInput;
use crate::protocol::ToolCallContent;

/// Render a tool's input into the blocks shown with its tool call.
///
/// Only edit-style tools produce blocks (diffs); everything else renders
/// nothing and the client falls back to the raw input.
pub fn render_tool_content(tool_name: &str, input: &Value) -> Vec<ToolCallContent> {
    match ToolInput::parse(tool_name, input) {
        ToolInput::Edit {
            file_path,
            old_string,
            new_string,
        } => vec![ToolCallContent::Diff {
            path: file_path,
            old_text: old_string,
            new_text: new_string,
        }],
        ToolInput::MultiEdit { file_path, edits } => edits
            .into_iter()
            .map(|edit| ToolCallContent::Diff {
                path: file_path.clone(),
                old_text: edit.old_string,
                new_text: edit.new_string,
            })
            .collect(),
        ToolInput::TodoWrite { .. } | ToolInput::Other => Vec::new(),
    }
}
