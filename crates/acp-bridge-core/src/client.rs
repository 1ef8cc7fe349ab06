//! Client boundary.
//!
//! The bridge pushes session updates to the client and asks it for tool
//! permission. The daemon implements [`Client`] over JSON-RPC; tests use a
//! recording double.

use async_trait::async_trait;

use crate::error::ClientError;
use crate::protocol::{RequestPermissionRequest, RequestPermissionResponse, SessionNotification};

#[async_trait]
pub trait Client: Send + Sync {
    /// Deliver one session update. Resolves once the transport accepted it.
    async fn session_update(&self, notification: SessionNotification) -> Result<(), ClientError>;

    /// Ask the user to approve a tool call and wait for the outcome.
    async fn request_permission(
        &self,
        request: RequestPermissionRequest,
    ) -> Result<RequestPermissionResponse, ClientError>;
}
