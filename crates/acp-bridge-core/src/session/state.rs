//! Per-session state.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::ledger::ToolCallLedger;

/// Marker switching a session to `acceptEdits`.
pub const ACCEPT_EDITS_MARKER: &str = "[ACP:PERMISSION:ACCEPT_EDITS]";
/// Marker switching a session to `bypassPermissions`.
pub const BYPASS_MARKER: &str = "[ACP:PERMISSION:BYPASS]";
/// Marker switching a session back to `default`.
pub const DEFAULT_MARKER: &str = "[ACP:PERMISSION:DEFAULT]";

/// Unique identifier for a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Unique identifier for a prompt turn.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TurnId(pub String);

impl TurnId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for TurnId {
    fn default() -> Self {
        Self::new()
    }
}

/// How the engine asks before running tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionMode {
    #[default]
    Default,
    AcceptEdits,
    BypassPermissions,
    Plan,
}

impl PermissionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::AcceptEdits => "acceptEdits",
            Self::BypassPermissions => "bypassPermissions",
            Self::Plan => "plan",
        }
    }

    /// Mode selected by an in-band control marker, if the text has one.
    ///
    /// Markers are checked in a fixed order: accept-edits, bypass, default.
    /// `plan` has no marker.
    pub fn from_control_marker(text: &str) -> Option<Self> {
        if text.contains(ACCEPT_EDITS_MARKER) {
            Some(Self::AcceptEdits)
        } else if text.contains(BYPASS_MARKER) {
            Some(Self::BypassPermissions)
        } else if text.contains(DEFAULT_MARKER) {
            Some(Self::Default)
        } else {
            None
        }
    }
}

impl fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for an unrecognised permission mode name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown permission mode: {0}")]
pub struct UnknownPermissionMode(pub String);

impl FromStr for PermissionMode {
    type Err = UnknownPermissionMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(Self::Default),
            "acceptEdits" => Ok(Self::AcceptEdits),
            "bypassPermissions" => Ok(Self::BypassPermissions),
            "plan" => Ok(Self::Plan),
            other => Err(UnknownPermissionMode(other.to_string())),
        }
    }
}

/// Handle to the turn currently running on a session.
#[derive(Debug, Clone)]
pub struct ActiveTurn {
    pub id: TurnId,
    pub cancel: CancellationToken,
}

/// A single client-visible conversation.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,

    /// Engine conversation id; absent until the engine first reports one.
    resume_token: Option<String>,

    pub permission_mode: PermissionMode,

    /// Working directory the client opened the session in.
    pub working_dir: Option<String>,

    active_turn: Option<ActiveTurn>,

    /// Tool-call bookkeeping used by the translator and permission broker.
    pub ledger: ToolCallLedger,
}

impl Session {
    pub fn new(id: SessionId, permission_mode: PermissionMode, working_dir: Option<String>) -> Self {
        Self {
            id,
            resume_token: None,
            permission_mode,
            working_dir,
            active_turn: None,
            ledger: ToolCallLedger::default(),
        }
    }

    pub fn resume_token(&self) -> Option<&str> {
        self.resume_token.as_deref()
    }

    /// Store the engine's resume token. Returns true if it changed.
    pub fn record_resume_token(&mut self, token: &str) -> bool {
        if token.is_empty() || self.resume_token.as_deref() == Some(token) {
            return false;
        }
        log::debug!(
            "Session {}: resume token {:?} -> {}",
            self.id,
            self.resume_token,
            token
        );
        self.resume_token = Some(token.to_string());
        true
    }

    pub fn active_turn(&self) -> Option<&ActiveTurn> {
        self.active_turn.as_ref()
    }

    /// Install a new active turn, cancelling any turn already running.
    pub fn begin_turn(&mut self) -> ActiveTurn {
        if let Some(previous) = self.active_turn.take() {
            log::info!("Session {}: superseding turn {}", self.id, previous.id.0);
            previous.cancel.cancel();
        }
        let turn = ActiveTurn {
            id: TurnId::new(),
            cancel: CancellationToken::new(),
        };
        self.active_turn = Some(turn.clone());
        turn
    }

    /// Clear the active turn if it is still `turn_id`.
    ///
    /// A superseded turn finishing late must not clear its successor.
    pub fn finish_turn(&mut self, turn_id: &TurnId) -> bool {
        match &self.active_turn {
            Some(turn) if &turn.id == turn_id => {
                self.active_turn = None;
                true
            }
            _ => false,
        }
    }

    /// Signal the active turn to stop. Returns false if nothing was running.
    pub fn cancel_turn(&self) -> bool {
        match &self.active_turn {
            Some(turn) => {
                turn.cancel.cancel();
                true
            }
            None => false,
        }
    }
}
