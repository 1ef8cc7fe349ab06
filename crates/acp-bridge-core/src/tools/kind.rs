//! Tool name → coarse capability category.

use crate::protocol::ToolKind;

/// Keyword sets checked in order; the first category with a match wins.
const KIND_KEYWORDS: &[(ToolKind, &[&str])] = &[
    (ToolKind::Read, &["read", "view", "get"]),
    (ToolKind::Edit, &["write", "create", "update", "edit"]),
    (ToolKind::Delete, &["delete", "remove"]),
    (ToolKind::Move, &["move", "rename"]),
    (ToolKind::Search, &["search", "find", "grep"]),
    (ToolKind::Execute, &["run", "execute", "bash"]),
    (ToolKind::Think, &["think", "plan"]),
    (ToolKind::Fetch, &["fetch", "download"]),
];

/// Classify a tool by case-insensitive substring match on its name.
pub fn classify_tool_kind(tool_name: &str) -> ToolKind {
    let lower = tool_name.to_lowercase();
    KIND_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|keyword| lower.contains(keyword)))
        .map(|(kind, _)| *kind)
        .unwrap_or(ToolKind::Other)
}
