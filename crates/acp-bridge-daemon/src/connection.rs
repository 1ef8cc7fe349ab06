//! Outbound half of the JSON-RPC connection.
//!
//! Every outgoing line goes through one channel drained by a single writer
//! task, so updates reach stdout in the order they were sent. Requests to the
//! client park a oneshot sender in `pending` until the reader hands back the
//! matching response.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use acp_bridge_core::client::Client;
use acp_bridge_core::protocol::{
    RequestPermissionRequest, RequestPermissionResponse, SessionNotification,
};
use acp_bridge_core::ClientError;
use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot, Mutex};

use crate::jsonrpc::{self, Id, RpcError};

pub const SESSION_UPDATE: &str = "session/update";
pub const REQUEST_PERMISSION: &str = "session/request_permission";

type PendingResponse = oneshot::Sender<Result<Value, RpcError>>;

pub struct Connection {
    outgoing: mpsc::UnboundedSender<String>,
    /// `None` once the client is gone.
    pending: Mutex<Option<HashMap<Id, PendingResponse>>>,
    next_id: AtomicU64,
}

impl Connection {
    /// Create a connection and the receiver its writer task drains.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (outgoing, rx) = mpsc::unbounded_channel();
        let connection = Self {
            outgoing,
            pending: Mutex::new(Some(HashMap::new())),
            next_id: AtomicU64::new(1),
        };
        (connection, rx)
    }

    /// Queue one message for the writer.
    pub fn send(&self, message: Value) -> Result<(), ClientError> {
        self.outgoing
            .send(message.to_string())
            .map_err(|_| ClientError::Closed)
    }

    pub fn notify(&self, method: &str, params: Value) -> Result<(), ClientError> {
        self.send(jsonrpc::notification(method, params))
    }

    pub fn respond(&self, id: Option<&Id>, result: Result<Value, RpcError>) {
        if self.send(jsonrpc::response(id, result)).is_err() {
            log::warn!("Dropping response to {:?}: writer closed", id);
        }
    }

    /// Send a request to the client and wait for its response.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value, ClientError> {
        let id = Id::from(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = oneshot::channel();
        match self.pending.lock().await.as_mut() {
            Some(pending) => pending.insert(id.clone(), tx),
            None => return Err(ClientError::Closed),
        };

        if let Err(e) = self.send(jsonrpc::request(&id, method, params)) {
            if let Some(pending) = self.pending.lock().await.as_mut() {
                pending.remove(&id);
            }
            return Err(e);
        }

        match rx.await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(error)) => Err(ClientError::Rejected {
                code: error.code,
                message: error.message,
            }),
            Err(_) => Err(ClientError::Closed),
        }
    }

    /// Route a response from the client to the request waiting on it.
    pub async fn resolve(&self, id: Id, result: Result<Value, RpcError>) {
        let waiter = self
            .pending
            .lock()
            .await
            .as_mut()
            .and_then(|pending| pending.remove(&id));
        match waiter {
            Some(tx) => {
                let _ = tx.send(result);
            }
            None => log::warn!("Response for unknown request {:?}", id),
        }
    }

    /// Fail every outstanding and future request; used when the client goes away.
    pub async fn close(&self) {
        let abandoned = self.pending.lock().await.take().map_or(0, |pending| pending.len());
        if abandoned > 0 {
            log::info!("Abandoning {} pending client request(s)", abandoned);
        }
    }
}

#[async_trait]
impl Client for Connection {
    async fn session_update(&self, notification: SessionNotification) -> Result<(), ClientError> {
        let params = serde_json::to_value(&notification)
            .map_err(|e| ClientError::Malformed(e.to_string()))?;
        self.notify(SESSION_UPDATE, params)
    }

    async fn request_permission(
        &self,
        request: RequestPermissionRequest,
    ) -> Result<RequestPermissionResponse, ClientError> {
        let params =
            serde_json::to_value(&request).map_err(|e| ClientError::Malformed(e.to_string()))?;
        let result = self.request(REQUEST_PERMISSION, params).await?;
        serde_json::from_value(result).map_err(|e| ClientError::Malformed(e.to_string()))
    }
}

/// Drain queued lines to `writer` until every sender is gone.
pub async fn write_loop(
    mut rx: mpsc::UnboundedReceiver<String>,
    mut writer: impl AsyncWrite + Unpin,
) -> std::io::Result<()> {
    while let Some(line) = rx.recv().await {
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    Ok(())
}
