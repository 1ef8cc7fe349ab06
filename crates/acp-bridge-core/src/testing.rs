//! In-memory engine and client doubles for unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Notify;

use crate::agents::{
    Engine, EngineMessage, EngineRequest, EngineStream, PermissionDecision,
};
use crate::client::Client;
use crate::error::{ClientError, EngineError};
use crate::protocol::{
    RequestPermissionOutcome, RequestPermissionRequest, RequestPermissionResponse,
    SessionNotification, SessionUpdate,
};

/// Client that records everything it is sent.
///
/// Permission requests are answered from a queue of scripted outcomes; an
/// empty queue behaves like a closed connection.
#[derive(Default)]
pub struct RecordingClient {
    notifications: Mutex<Vec<SessionNotification>>,
    permission_requests: Mutex<Vec<RequestPermissionRequest>>,
    outcomes: Mutex<VecDeque<RequestPermissionOutcome>>,
}

impl RecordingClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_outcome(&self, outcome: RequestPermissionOutcome) {
        self.outcomes.lock().unwrap().push_back(outcome);
    }

    pub fn push_selected(&self, option_id: &str) {
        self.push_outcome(RequestPermissionOutcome::Selected {
            option_id: option_id.to_string(),
        });
    }

    pub fn notifications(&self) -> Vec<SessionNotification> {
        self.notifications.lock().unwrap().clone()
    }

    pub fn updates(&self) -> Vec<SessionUpdate> {
        self.notifications()
            .into_iter()
            .map(|notification| notification.update)
            .collect()
    }

    pub fn permission_requests(&self) -> Vec<RequestPermissionRequest> {
        self.permission_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Client for RecordingClient {
    async fn session_update(&self, notification: SessionNotification) -> Result<(), ClientError> {
        self.notifications.lock().unwrap().push(notification);
        Ok(())
    }

    async fn request_permission(
        &self,
        request: RequestPermissionRequest,
    ) -> Result<RequestPermissionResponse, ClientError> {
        self.permission_requests.lock().unwrap().push(request);
        match self.outcomes.lock().unwrap().pop_front() {
            Some(outcome) => Ok(RequestPermissionResponse { outcome }),
            None => Err(ClientError::Closed),
        }
    }
}

/// One scripted step of a [`ScriptedEngine`] stream.
pub enum Step {
    Message(EngineMessage),
    Fail(String),
    /// Ask the turn's approver, as the engine does before running a tool.
    Approve { tool_name: String, input: Value },
    /// Wake a test waiting on the notifier.
    Signal(Arc<Notify>),
    /// Block until the turn is cancelled.
    WaitForCancel,
}

impl Step {
    pub fn json(value: Value) -> Self {
        Self::Message(EngineMessage::from_value(value))
    }
}

/// Engine that replays one script per started turn.
#[derive(Default)]
pub struct ScriptedEngine {
    scripts: Mutex<VecDeque<Vec<Step>>>,
    requests: Mutex<Vec<EngineRequest>>,
    decisions: Arc<Mutex<Vec<PermissionDecision>>>,
    start_error: Mutex<Option<String>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_script(&self, steps: Vec<Step>) {
        self.scripts.lock().unwrap().push_back(steps);
    }

    pub fn fail_next_start(&self, message: &str) {
        *self.start_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn requests(&self) -> Vec<EngineRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn decisions(&self) -> Vec<PermissionDecision> {
        self.decisions.lock().unwrap().clone()
    }
}

#[async_trait]
impl Engine for ScriptedEngine {
    async fn start(&self, request: EngineRequest) -> Result<Box<dyn EngineStream>, EngineError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(message) = self.start_error.lock().unwrap().take() {
            return Err(EngineError::Spawn(message));
        }
        let steps = self.scripts.lock().unwrap().pop_front().unwrap_or_default();
        Ok(Box::new(ScriptedStream {
            steps: steps.into(),
            request,
            decisions: Arc::clone(&self.decisions),
        }))
    }
}

struct ScriptedStream {
    steps: VecDeque<Step>,
    request: EngineRequest,
    decisions: Arc<Mutex<Vec<PermissionDecision>>>,
}

#[async_trait]
impl EngineStream for ScriptedStream {
    async fn next_message(&mut self) -> Option<Result<EngineMessage, EngineError>> {
        while let Some(step) = self.steps.pop_front() {
            match step {
                Step::Message(message) => return Some(Ok(message)),
                Step::Fail(message) => return Some(Err(EngineError::Failed(message))),
                Step::Approve { tool_name, input } => {
                    let decision = self.request.approver.decide(&tool_name, &input, None).await;
                    self.decisions.lock().unwrap().push(decision);
                }
                Step::Signal(notify) => notify.notify_one(),
                Step::WaitForCancel => self.request.cancel.cancelled().await,
            }
        }
        None
    }
}
