//! Typed views of the tool inputs the bridge renders specially.
//!
//! Tool input arrives as arbitrary JSON. [`ToolInput::parse`] validates it
//! against the handful of tools with dedicated rendering; anything that does
//! not fit becomes [`ToolInput::Other`] and is shown only as raw input.
//!
//! # Example JSON
//!
//! Edit:
//! ```json
//! {"file_path": "src/main.rs", "old_string": "foo", "new_string": "bar"}
//! ```
//!
//! TodoWrite:
//! ```json
//! {"todos": [{"id": "1", "content": "Write tests", "status": "pending", "priority": "high"}]}
//! ```

use serde::Deserialize;
use serde_json::Value;

use crate::protocol::{PlanEntry, PlanEntryPriority, PlanEntryStatus};

pub const EDIT_TOOL: &str = "Edit";
pub const MULTI_EDIT_TOOL: &str = "MultiEdit";
/// The engine's self-management tool; rendered as a plan.
pub const TODO_WRITE_TOOL: &str = "TodoWrite";

/// One old/new replacement inside a MultiEdit.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EditPair {
    pub old_string: String,
    pub new_string: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoPriority {
    High,
    Medium,
    Low,
}

/// A TodoWrite entry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TodoItem {
    #[serde(default)]
    pub id: Option<String>,
    pub content: String,
    pub status: TodoStatus,
    #[serde(default)]
    pub priority: Option<TodoPriority>,
}

impl From<TodoItem> for PlanEntry {
    /// Drops the todo id; a missing priority becomes `low`.
    fn from(todo: TodoItem) -> Self {
        let status = match todo.status {
            TodoStatus::Pending => PlanEntryStatus::Pending,
            TodoStatus::InProgress => PlanEntryStatus::InProgress,
            TodoStatus::Completed => PlanEntryStatus::Completed,
        };
        let priority = match todo.priority {
            Some(TodoPriority::High) => PlanEntryPriority::High,
            Some(TodoPriority::Medium) => PlanEntryPriority::Medium,
            Some(TodoPriority::Low) | None => PlanEntryPriority::Low,
        };
        PlanEntry {
            content: todo.content,
            status,
            priority,
        }
    }
}

/// Validated input of a tool with dedicated rendering.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolInput {
    Edit {
        file_path: String,
        old_string: String,
        new_string: String,
    },
    MultiEdit {
        file_path: String,
        edits: Vec<EditPair>,
    },
    TodoWrite {
        todos: Vec<TodoItem>,
    },
    Other,
}

impl ToolInput {
    /// Validate `input` for `tool_name`. Missing or empty fields yield `Other`.
    pub fn parse(tool_name: &str, input: &Value) -> Self {
        match tool_name {
            EDIT_TOOL => {
                match (
                    non_empty_str(input, "file_path"),
                    non_empty_str(input, "old_string"),
                    non_empty_str(input, "new_string"),
                ) {
                    (Some(file_path), Some(old_string), Some(new_string)) => Self::Edit {
                        file_path,
                        old_string,
                        new_string,
                    },
                    _ => Self::Other,
                }
            }
            MULTI_EDIT_TOOL => {
                let file_path = non_empty_str(input, "file_path");
                let edits = input.get("edits").and_then(Value::as_array);
                match (file_path, edits) {
                    (Some(file_path), Some(edits)) => Self::MultiEdit {
                        file_path,
                        // Malformed pairs are dropped individually.
                        edits: edits
                            .iter()
                            .filter_map(|edit| EditPair::deserialize(edit).ok())
                            .collect(),
                    },
                    _ => Self::Other,
                }
            }
            TODO_WRITE_TOOL => match input.get("todos") {
                Some(todos) => match Vec::<TodoItem>::deserialize(todos) {
                    Ok(todos) => Self::TodoWrite { todos },
                    Err(err) => {
                        log::debug!("TodoWrite input without a usable todo list: {}", err);
                        Self::Other
                    }
                },
                None => Self::Other,
            },
            _ => Self::Other,
        }
    }
}

fn non_empty_str(input: &Value, key: &str) -> Option<String> {
    input
        .get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
