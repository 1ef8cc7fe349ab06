//! BridgeAgent - the operations a client can invoke.

use std::sync::Arc;

use crate::agents::Engine;
use crate::client::Client;
use crate::driver::{PromptDriver, StartedTurn};
use crate::error::Result;
use crate::protocol::{
    AgentCapabilities, AuthenticateRequest, CancelNotification, InitializeRequest,
    InitializeResponse, LoadSessionRequest, NewSessionRequest, NewSessionResponse,
    PromptCapabilities, PromptRequest, PromptResponse, PROTOCOL_VERSION,
};
use crate::session::{PermissionMode, SessionId, SessionStore};

/// Agent side of the client protocol, backed by one engine.
pub struct BridgeAgent {
    sessions: SessionStore,
    driver: PromptDriver,
}

impl BridgeAgent {
    pub fn new(
        engine: Arc<dyn Engine>,
        client: Arc<dyn Client>,
        default_permission_mode: PermissionMode,
    ) -> Self {
        Self {
            sessions: SessionStore::new(default_permission_mode),
            driver: PromptDriver::new(engine, client),
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn initialize(&self, request: InitializeRequest) -> InitializeResponse {
        log::info!(
            "Client initialized (protocol version {})",
            request.protocol_version
        );
        InitializeResponse {
            protocol_version: PROTOCOL_VERSION,
            agent_capabilities: AgentCapabilities {
                load_session: true,
                prompt_capabilities: PromptCapabilities {
                    image: true,
                    audio: false,
                    embedded_context: true,
                },
            },
            auth_methods: Vec::new(),
        }
    }

    /// Credentials belong to the engine's own login state; nothing to do here.
    pub fn authenticate(&self, request: AuthenticateRequest) -> Result<()> {
        log::debug!("Ignoring authenticate request for '{}'", request.method_id);
        Ok(())
    }

    pub async fn new_session(&self, request: NewSessionRequest) -> Result<NewSessionResponse> {
        let id = self.sessions.create(request.cwd).await;
        Ok(NewSessionResponse {
            session_id: id.to_string(),
        })
    }

    /// Re-register a session, keeping its state if it is already known.
    pub async fn load_session(&self, request: LoadSessionRequest) -> Result<()> {
        self.sessions
            .get_or_create(SessionId::from(request.session_id), request.cwd)
            .await;
        Ok(())
    }

    pub async fn prompt(&self, request: PromptRequest) -> Result<PromptResponse> {
        let turn = self.begin_prompt(request).await?;
        self.finish_prompt(turn).await
    }

    /// Install the prompt's turn on its session without streaming it yet.
    ///
    /// Prompts begun in order supersede each other in that order, however
    /// their streaming is later scheduled.
    pub async fn begin_prompt(&self, request: PromptRequest) -> Result<StartedTurn> {
        let id = SessionId::from(request.session_id);
        let session = self.sessions.get(&id).await?;
        Ok(self.driver.begin(&id, session, &request.prompt).await)
    }

    pub async fn finish_prompt(&self, turn: StartedTurn) -> Result<PromptResponse> {
        let stop_reason = self.driver.finish(turn).await?;
        Ok(PromptResponse { stop_reason })
    }

    /// Signal the session's running turn; the pending prompt reports the result.
    pub async fn cancel(&self, notification: CancelNotification) -> Result<()> {
        let id = SessionId::from(notification.session_id);
        let session = self.sessions.get(&id).await?;
        if !session.lock().await.cancel_turn() {
            log::debug!("Session {}: cancel with no active turn", id);
        }
        Ok(())
    }
}
