//! Bridge configuration from the environment.

use thiserror::Error;

use crate::session::{PermissionMode, UnknownPermissionMode};

/// Default permission mode for new sessions.
pub const PERMISSION_MODE_ENV: &str = "ACP_PERMISSION_MODE";
/// `true` turns on debug logging.
pub const DEBUG_ENV: &str = "ACP_DEBUG";
/// Path to the Claude CLI.
pub const CLAUDE_EXECUTABLE_ENV: &str = "ACP_PATH_TO_CLAUDE_CODE_EXECUTABLE";

pub const DEFAULT_CLAUDE_EXECUTABLE: &str = "claude";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid ACP_PERMISSION_MODE: {0}")]
    PermissionMode(#[from] UnknownPermissionMode),
}

/// Process-wide settings, read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub permission_mode: PermissionMode,
    /// Observability only; never changes behavior.
    pub debug: bool,
    pub claude_executable: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            permission_mode: PermissionMode::Default,
            debug: false,
            claude_executable: DEFAULT_CLAUDE_EXECUTABLE.to_string(),
        }
    }
}

impl BridgeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|value| !value.is_empty());

        let permission_mode = match get(PERMISSION_MODE_ENV) {
            Some(mode) => mode.parse::<PermissionMode>()?,
            None => PermissionMode::Default,
        };

        Ok(Self {
            permission_mode,
            debug: get(DEBUG_ENV).as_deref() == Some("true"),
            claude_executable: get(CLAUDE_EXECUTABLE_ENV)
                .unwrap_or_else(|| DEFAULT_CLAUDE_EXECUTABLE.to_string()),
        })
    }
}
