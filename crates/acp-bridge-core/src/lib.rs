//! # acp-bridge-core
//!
//! Session and message-translation core for bridging the Claude CLI to the
//! Agent Client Protocol.
//!
//! This crate is transport-agnostic: the daemon wires it to JSON-RPC over
//! stdio, tests wire it to in-memory doubles.
//!
//! ## Key Concepts
//!
//! - **Session**: a client-visible conversation with its engine resume token
//! - **Turn**: one prompt and everything the engine streams in reply
//! - **EngineEvent**: one typed message from the engine stream
//! - **SessionUpdate**: what the client is told about a turn

pub mod agent;
pub mod agents;
pub mod approval;
pub mod client;
pub mod config;
pub mod driver;
pub mod error;
pub mod protocol;
pub mod session;
pub mod tools;
pub mod translate;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use agent::BridgeAgent;
pub use agents::claude::ClaudeProcessEngine;
pub use agents::{Engine, EngineEvent, EngineMessage, EngineRequest, EngineStream};
pub use client::Client;
pub use config::{BridgeConfig, ConfigError};
pub use error::{BridgeError, ClientError, EngineError};
pub use session::{PermissionMode, Session, SessionId, SessionStore};
