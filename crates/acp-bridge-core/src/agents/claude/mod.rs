//! Claude CLI engine.
//!
//! Spawns `claude` in stream-json mode, parses its output into
//! [`EngineMessage`](crate::agents::EngineMessage)s and answers its permission
//! prompts over stdin.

mod parser;
mod process;
pub mod spawn;
mod types;

pub use parser::{parse_line, ClaudeOutput, ClaudeParser};
pub use process::ClaudeProcessEngine;
pub use spawn::ClaudeConfig;
pub use types::*;
