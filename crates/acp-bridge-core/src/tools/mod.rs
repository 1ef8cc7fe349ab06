//! Tool classification and rendering.
//!
//! Both halves are pure: they look only at a tool's name and input.

mod content;
mod input;
mod kind;

pub use content::render_tool_content;
pub use input::{EditPair, TodoItem, TodoPriority, TodoStatus, ToolInput, TODO_WRITE_TOOL};
pub use kind::classify_tool_kind;
