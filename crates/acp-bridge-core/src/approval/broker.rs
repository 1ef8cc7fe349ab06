//! Per-turn tool permission negotiation with the client.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::agents::{PermissionDecision, ToolApprover};
use crate::client::Client;
use crate::protocol::{
    PermissionOption, PermissionOptionKind, RequestPermissionOutcome, RequestPermissionRequest,
    ToolCallRef,
};
use crate::session::{SessionId, SharedSession};

pub const ALLOW_ALWAYS: &str = "allow_always";
pub const ALLOW_ONCE: &str = "allow_once";
pub const REJECT: &str = "reject";

pub const USER_CANCELLED: &str = "User cancelled";
pub const USER_REJECTED: &str = "User rejected";

/// Asks the client before each tool use during one turn.
///
/// Choosing "Allow Always" approves every later tool use of the same turn
/// without asking again. A new turn gets a new broker, so the override never
/// outlives its turn.
pub struct PermissionBroker {
    session_id: SessionId,
    client: Arc<dyn Client>,
    session: SharedSession,
    always_allow: AtomicBool,
}

impl PermissionBroker {
    pub fn new(session_id: SessionId, client: Arc<dyn Client>, session: SharedSession) -> Self {
        Self {
            session_id,
            client,
            session,
            always_allow: AtomicBool::new(false),
        }
    }

    pub fn always_allow(&self) -> bool {
        self.always_allow.load(Ordering::SeqCst)
    }

    /// The three choices offered for every tool use, in display order.
    pub fn options() -> Vec<PermissionOption> {
        vec![
            PermissionOption {
                option_id: ALLOW_ALWAYS.to_string(),
                name: "Allow Always".to_string(),
                kind: PermissionOptionKind::AllowAlways,
            },
            PermissionOption {
                option_id: ALLOW_ONCE.to_string(),
                name: "Allow".to_string(),
                kind: PermissionOptionKind::AllowOnce,
            },
            PermissionOption {
                option_id: REJECT.to_string(),
                name: "Reject".to_string(),
                kind: PermissionOptionKind::RejectOnce,
            },
        ]
    }

    /// The engine's own id wins; the ledger only knows calls already translated.
    async fn tool_call_id(&self, tool_name: &str, tool_use_id: Option<&str>) -> String {
        if let Some(id) = tool_use_id.filter(|id| !id.is_empty()) {
            return id.to_string();
        }
        let session = self.session.lock().await;
        session
            .ledger
            .last_id_for(tool_name)
            .unwrap_or_default()
            .to_string()
    }
}

fn allow(input: &Value) -> PermissionDecision {
    PermissionDecision::Allow {
        updated_input: input.clone(),
    }
}

fn deny(message: impl Into<String>) -> PermissionDecision {
    PermissionDecision::Deny {
        message: message.into(),
    }
}

#[async_trait]
impl ToolApprover for PermissionBroker {
    async fn decide(
        &self,
        tool_name: &str,
        input: &Value,
        tool_use_id: Option<&str>,
    ) -> PermissionDecision {
        if self.always_allow() {
            log::debug!("Session {}: {} allowed (always)", self.session_id, tool_name);
            return allow(input);
        }

        let request = RequestPermissionRequest {
            session_id: self.session_id.to_string(),
            options: Self::options(),
            tool_call: ToolCallRef {
                tool_call_id: self.tool_call_id(tool_name, tool_use_id).await,
            },
        };

        let response = match self.client.request_permission(request).await {
            Ok(response) => response,
            Err(e) => {
                log::warn!(
                    "Session {}: permission request for {} failed: {}",
                    self.session_id,
                    tool_name,
                    e
                );
                return deny(format!("Permission request failed: {}", e));
            }
        };

        match response.outcome {
            RequestPermissionOutcome::Cancelled => deny(USER_CANCELLED),
            RequestPermissionOutcome::Selected { option_id } => match option_id.as_str() {
                ALLOW_ALWAYS => {
                    self.always_allow.store(true, Ordering::SeqCst);
                    allow(input)
                }
                REJECT => deny(USER_REJECTED),
                ALLOW_ONCE => allow(input),
                other => {
                    log::debug!("Unknown permission option '{}', allowing", other);
                    allow(input)
                }
            },
        }
    }
}
