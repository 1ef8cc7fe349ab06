//! Tool-call bookkeeping kept per session.

use std::collections::{HashMap, HashSet};

use crate::protocol::ToolCallContent;

/// Tracks tool calls across the events of a session.
///
/// - plan tool ids, whose results are never rendered as tool output
/// - accumulated content per tool call id
/// - the latest call id per tool name, for permission prompts
#[derive(Debug, Default)]
pub struct ToolCallLedger {
    plan_tool_call_ids: HashSet<String>,
    content: HashMap<String, Vec<ToolCallContent>>,
    last_id_by_tool: HashMap<String, String>,
}

impl ToolCallLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember `id` as the most recent call of `tool_name`.
    pub fn record_tool_use(&mut self, tool_name: &str, id: &str) {
        self.last_id_by_tool
            .insert(tool_name.to_string(), id.to_string());
    }

    pub fn last_id_for(&self, tool_name: &str) -> Option<&str> {
        self.last_id_by_tool.get(tool_name).map(String::as_str)
    }

    pub fn mark_plan(&mut self, id: &str) {
        self.plan_tool_call_ids.insert(id.to_string());
    }

    pub fn is_plan(&self, id: &str) -> bool {
        self.plan_tool_call_ids.contains(id)
    }

    /// Seed a call's content when it is announced.
    pub fn start_call(&mut self, id: &str, content: Vec<ToolCallContent>) {
        self.content.insert(id.to_string(), content);
    }

    /// Append a block to a call and return everything accumulated so far.
    pub fn append(&mut self, id: &str, block: ToolCallContent) -> Vec<ToolCallContent> {
        let entry = self.content.entry(id.to_string()).or_default();
        entry.push(block);
        entry.clone()
    }

    pub fn content(&self, id: &str) -> &[ToolCallContent] {
        self.content.get(id).map(Vec::as_slice).unwrap_or_default()
    }
}
