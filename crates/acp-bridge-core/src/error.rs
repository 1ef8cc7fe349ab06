//! Error types shared across the bridge.

use thiserror::Error;

use crate::session::SessionError;

/// Failure while starting or reading the engine stream.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Failed to spawn engine: {0}")]
    Spawn(String),

    #[error("Engine I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Engine exited with code {code:?}: {stderr}")]
    Exited { code: Option<i32>, stderr: String },

    #[error("{0}")]
    Failed(String),
}

/// Failure talking to the client.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Client connection closed")]
    Closed,

    #[error("Client returned error {code}: {message}")]
    Rejected { code: i64, message: String },

    #[error("Malformed client response: {0}")]
    Malformed(String),
}

/// Error returned by the bridge's public operations.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

pub type Result<T, E = BridgeError> = std::result::Result<T, E>;
