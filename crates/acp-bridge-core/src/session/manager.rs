//! SessionStore - the registry of live sessions.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

use super::state::{PermissionMode, Session, SessionId};

/// A session shared between the store and the turn running on it.
///
/// The lock is only held for synchronous bookkeeping, never across client I/O.
pub type SharedSession = Arc<Mutex<Session>>;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(SessionId),
}

/// In-memory registry of sessions keyed by id.
///
/// Constructed once at startup; sessions live until the process exits.
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, SharedSession>>,
    default_permission_mode: PermissionMode,
}

impl SessionStore {
    pub fn new(default_permission_mode: PermissionMode) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            default_permission_mode,
        }
    }

    pub fn default_permission_mode(&self) -> PermissionMode {
        self.default_permission_mode
    }

    /// Create a new session, returns ID for future reference.
    pub async fn create(&self, working_dir: Option<String>) -> SessionId {
        let mut sessions = self.sessions.write().await;
        let mut id = SessionId::new();
        while sessions.contains_key(&id) {
            id = SessionId::new();
        }
        let session = Session::new(id.clone(), self.default_permission_mode, working_dir);
        sessions.insert(id.clone(), Arc::new(Mutex::new(session)));
        log::info!("Created session {}", id);
        id
    }

    /// Return the session for `id`, registering a fresh one if it is unknown.
    ///
    /// An existing session is returned untouched, resume token included. A
    /// synthesized session starts with no engine state.
    pub async fn get_or_create(&self, id: SessionId, working_dir: Option<String>) -> SharedSession {
        let mut sessions = self.sessions.write().await;
        if let Some(existing) = sessions.get(&id) {
            log::debug!("Session {} already registered", id);
            return Arc::clone(existing);
        }

        log::info!("Registering unknown session {} with empty engine state", id);
        let session = Arc::new(Mutex::new(Session::new(
            id.clone(),
            self.default_permission_mode,
            working_dir,
        )));
        sessions.insert(id, Arc::clone(&session));
        session
    }

    /// Get a session by ID.
    pub async fn get(&self, id: &SessionId) -> Result<SharedSession, SessionError> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(id.clone()))
    }

    /// List all registered session IDs.
    pub async fn list(&self) -> Vec<SessionId> {
        self.sessions.read().await.keys().cloned().collect()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(PermissionMode::Default)
    }
}
