//! Session management for client conversations.
//!
//! Sessions are in-memory only; a bridge restart loses engine continuity for
//! any session the client reloads.

mod ledger;
mod manager;
mod state;

pub use ledger::ToolCallLedger;
pub use manager::{SessionError, SessionStore, SharedSession};
pub use state::{
    ActiveTurn, PermissionMode, Session, SessionId, TurnId, UnknownPermissionMode,
    ACCEPT_EDITS_MARKER, BYPASS_MARKER, DEFAULT_MARKER,
};
