//! claude-acp-bridge - serve the Agent Client Protocol over stdio, backed by
//! the Claude CLI.
//!
//! stdout carries the protocol; all logging goes to stderr.

mod connection;
mod jsonrpc;
mod server;

use std::sync::Arc;

use acp_bridge_core::{BridgeConfig, ClaudeProcessEngine, ConfigError, Engine, PermissionMode};
use clap::Parser;
use thiserror::Error;

#[derive(Parser, Debug)]
#[command(
    name = "claude-acp-bridge",
    about = "Agent Client Protocol bridge for the Claude CLI"
)]
struct Args {
    /// Default permission mode for new sessions
    /// (default, acceptEdits, bypassPermissions, plan).
    #[arg(long, env = "ACP_PERMISSION_MODE")]
    permission_mode: Option<String>,

    /// Path to the Claude CLI executable.
    #[arg(long, env = "ACP_PATH_TO_CLAUDE_CODE_EXECUTABLE")]
    claude_path: Option<String>,

    /// Enable debug logging (also ACP_DEBUG=true).
    #[arg(short, long)]
    debug: bool,
}

#[derive(Error, Debug)]
enum DaemonError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Layer command-line overrides on top of the environment configuration.
fn resolve_config(args: &Args, mut config: BridgeConfig) -> Result<BridgeConfig, ConfigError> {
    if let Some(mode) = args.permission_mode.as_deref().filter(|m| !m.is_empty()) {
        config.permission_mode = mode.parse::<PermissionMode>()?;
    }
    if let Some(path) = args.claude_path.as_deref().filter(|p| !p.is_empty()) {
        config.claude_executable = path.to_string();
    }
    config.debug |= args.debug;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), DaemonError> {
    let args = Args::parse();
    let config = resolve_config(&args, BridgeConfig::from_env()?)?;

    // Initialize logging
    let log_level = if config.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .target(env_logger::Target::Stderr)
        .init();

    log::info!(
        "Starting claude-acp-bridge (claude: {}, permission mode: {})",
        config.claude_executable,
        config.permission_mode
    );

    let engine: Arc<dyn Engine> = Arc::new(ClaudeProcessEngine::new(config.claude_executable));

    tokio::select! {
        result = server::serve(engine, config.permission_mode, tokio::io::stdin(), tokio::io::stdout()) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            log::info!("Interrupted, exiting");
        }
    }
    Ok(())
}
