//! Prompt turn orchestration.
//!
//! A turn moves through `Idle -> Starting -> Streaming -> {Completed |
//! Cancelled | Errored} -> Idle`. [`PromptDriver::run`] owns that whole cycle
//! for one session:
//!
//! 1. build the engine message from the client's prompt blocks
//! 2. apply any permission marker in the prompt text
//! 3. install the turn on the session, cancelling a turn already running
//! 4. stream engine messages through the [`MessageTranslator`] to the client
//! 5. clear the turn, whatever the outcome
//!
//! Steps 1-3 are [`PromptDriver::begin`], the rest [`PromptDriver::finish`];
//! a transport that must order competing prompts calls them separately.
//!
//! Engine failures never escape as errors: they become an `Error: ...`
//! message chunk and a normal end of turn.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::agents::{
    Engine, EngineMessage, EngineRequest, EngineStream, ImageSource, UserContent, UserMessage,
};
use crate::approval::PermissionBroker;
use crate::client::Client;
use crate::error::{ClientError, EngineError};
use crate::protocol::{PromptBlock, SessionNotification, SessionUpdate, StopReason};
use crate::session::{ActiveTurn, PermissionMode, SessionId, SharedSession};
use crate::translate::MessageTranslator;

/// A turn installed on its session whose engine has not started yet.
pub struct StartedTurn {
    session_id: SessionId,
    session: SharedSession,
    turn: ActiveTurn,
    request: EngineRequest,
}

/// Runs prompt turns against an engine, reporting to one client.
pub struct PromptDriver {
    engine: Arc<dyn Engine>,
    client: Arc<dyn Client>,
}

impl PromptDriver {
    pub fn new(engine: Arc<dyn Engine>, client: Arc<dyn Client>) -> Self {
        Self { engine, client }
    }

    /// Run one prompt turn on `session` and report how it stopped.
    ///
    /// Only a failure to reach the client is returned as an error.
    pub async fn run(
        &self,
        session_id: &SessionId,
        session: SharedSession,
        prompt: &[PromptBlock],
    ) -> Result<StopReason, ClientError> {
        let started = self.begin(session_id, session, prompt).await;
        self.finish(started).await
    }

    /// Install a new turn on `session`, superseding any running one.
    pub async fn begin(
        &self,
        session_id: &SessionId,
        session: SharedSession,
        prompt: &[PromptBlock],
    ) -> StartedTurn {
        let message = build_user_message(prompt);
        let text = message.text();

        // Starting
        let (turn, request) = {
            let mut state = session.lock().await;
            if let Some(mode) = PermissionMode::from_control_marker(&text) {
                if state.permission_mode != mode {
                    log::info!(
                        "Session {}: permission mode {} -> {}",
                        session_id,
                        state.permission_mode,
                        mode
                    );
                }
                state.permission_mode = mode;
            }

            let turn = state.begin_turn();
            let broker = PermissionBroker::new(
                session_id.clone(),
                Arc::clone(&self.client),
                Arc::clone(&session),
            );
            let request = EngineRequest {
                message,
                permission_mode: state.permission_mode,
                resume: state.resume_token().map(str::to_string),
                working_dir: state.working_dir.clone(),
                approver: Arc::new(broker),
                cancel: turn.cancel.clone(),
            };
            (turn, request)
        };

        StartedTurn {
            session_id: session_id.clone(),
            session,
            turn,
            request,
        }
    }

    /// Stream a begun turn to its end and put the session back to idle.
    pub async fn finish(&self, started: StartedTurn) -> Result<StopReason, ClientError> {
        let StartedTurn {
            session_id,
            session,
            turn,
            request,
        } = started;
        let session_id = &session_id;
        log::info!(
            "Session {}: starting turn {} (mode {}, resume {:?})",
            session_id,
            turn.id.0,
            request.permission_mode,
            request.resume
        );

        let outcome = self
            .stream_turn(session_id, &session, request, &turn.cancel)
            .await;

        // Back to idle
        session.lock().await.finish_turn(&turn.id);
        match &outcome {
            Ok(reason) => log::info!(
                "Session {}: turn {} finished ({:?})",
                session_id,
                turn.id.0,
                reason
            ),
            Err(e) => log::warn!("Session {}: turn {} lost client: {}", session_id, turn.id.0, e),
        }
        outcome
    }

    async fn stream_turn(
        &self,
        session_id: &SessionId,
        session: &SharedSession,
        request: EngineRequest,
        cancel: &CancellationToken,
    ) -> Result<StopReason, ClientError> {
        let mut stream = match self.engine.start(request).await {
            Ok(stream) => stream,
            Err(e) => return self.fail_turn(session_id, cancel, e).await,
        };

        // Streaming
        loop {
            match next_unless_cancelled(stream.as_mut(), cancel).await {
                None => return Ok(StopReason::Cancelled),
                Some(None) => return Ok(StopReason::EndTurn),
                Some(Some(Err(e))) => return self.fail_turn(session_id, cancel, e).await,
                Some(Some(Ok(message))) => {
                    if cancel.is_cancelled() {
                        return Ok(StopReason::Cancelled);
                    }
                    self.forward(session_id, session, message).await?;
                }
            }
        }
    }

    /// Record the resume token, translate, and send the resulting updates.
    async fn forward(
        &self,
        session_id: &SessionId,
        session: &SharedSession,
        message: EngineMessage,
    ) -> Result<(), ClientError> {
        log::debug!("Session {}: engine event {}", session_id, message.event.kind());
        let updates = {
            let mut state = session.lock().await;
            if let Some(token) = message.session_id.as_deref() {
                state.record_resume_token(token);
            }
            MessageTranslator::new(&mut state.ledger).translate(&message.event)
        };

        for update in updates {
            self.send(session_id, update).await?;
        }
        Ok(())
    }

    /// Errored: cancellation wins, otherwise surface the error as a chunk.
    async fn fail_turn(
        &self,
        session_id: &SessionId,
        cancel: &CancellationToken,
        error: EngineError,
    ) -> Result<StopReason, ClientError> {
        if cancel.is_cancelled() {
            log::debug!("Session {}: engine error after cancel: {}", session_id, error);
            return Ok(StopReason::Cancelled);
        }

        log::warn!("Session {}: engine error: {}", session_id, error);
        self.send(
            session_id,
            SessionUpdate::message_chunk(format!("Error: {}", error)),
        )
        .await?;
        Ok(StopReason::EndTurn)
    }

    async fn send(&self, session_id: &SessionId, update: SessionUpdate) -> Result<(), ClientError> {
        self.client
            .session_update(SessionNotification {
                session_id: session_id.to_string(),
                update,
            })
            .await
    }
}

/// Next stream item, or `None` once the turn is cancelled.
async fn next_unless_cancelled(
    stream: &mut dyn EngineStream,
    cancel: &CancellationToken,
) -> Option<Option<Result<EngineMessage, EngineError>>> {
    if cancel.is_cancelled() {
        return None;
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        next = stream.next_message() => Some(next),
    }
}

/// Build the composite engine message from the client's prompt blocks.
///
/// Text, image placeholders and resource references are concatenated into a
/// single text entry placed after the image entries.
pub fn build_user_message(prompt: &[PromptBlock]) -> UserMessage {
    let mut text = String::new();
    let mut content = Vec::new();
    let mut images = 0;

    for block in prompt {
        match block {
            PromptBlock::Text { text: fragment } => text.push_str(fragment),
            PromptBlock::Image {
                data, mime_type, ..
            } => {
                images += 1;
                text.push_str(&format!("[Image #{}]", images));
                content.push(UserContent::Image {
                    source: ImageSource::base64(mime_type.clone(), data.clone()),
                });
            }
            PromptBlock::Resource { resource } => text.push_str(&resource_reference(&resource.uri)),
            PromptBlock::ResourceLink { uri, .. } => text.push_str(&resource_reference(uri)),
            PromptBlock::Audio { .. } => log::debug!("Dropping audio prompt block"),
            PromptBlock::Unsupported => log::debug!("Dropping unsupported prompt block"),
        }
    }

    if !text.is_empty() {
        content.push(UserContent::Text { text });
    }
    UserMessage::new(content)
}

/// `file://` URIs become `@path` mentions; anything else is kept verbatim.
fn resource_reference(uri: &str) -> String {
    match uri.strip_prefix("file://") {
        Some(path) => format!("@{}", path),
        None => uri.to_string(),
    }
}
