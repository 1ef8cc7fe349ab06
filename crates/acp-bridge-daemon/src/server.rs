//! Stdio JSON-RPC server wiring the client to a [`BridgeAgent`].
//!
//! The read loop never blocks on a request: each one runs in its own task so
//! a long `session/prompt` does not hold up `session/cancel` or the client's
//! answers to permission requests. A prompt's turn is installed before its
//! task is spawned, so prompts for one session supersede each other in the
//! order they were read.

use std::sync::Arc;

use acp_bridge_core::protocol::{
    AuthenticateRequest, CancelNotification, InitializeRequest, LoadSessionRequest,
    NewSessionRequest, PromptRequest,
};
use acp_bridge_core::driver::StartedTurn;
use acp_bridge_core::{BridgeAgent, BridgeError, Client, Engine, PermissionMode};
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::task::JoinSet;

use crate::connection::{self, Connection};
use crate::jsonrpc::{Incoming, RpcError, INVALID_PARAMS};

pub const INITIALIZE: &str = "initialize";
pub const AUTHENTICATE: &str = "authenticate";
pub const SESSION_NEW: &str = "session/new";
pub const SESSION_LOAD: &str = "session/load";
pub const SESSION_PROMPT: &str = "session/prompt";
pub const SESSION_CANCEL: &str = "session/cancel";

/// Serve one client over `reader`/`writer` until the reader reaches EOF.
pub async fn serve<R, W>(
    engine: Arc<dyn Engine>,
    permission_mode: PermissionMode,
    reader: R,
    writer: W,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (connection, outgoing) = Connection::new();
    let connection = Arc::new(connection);
    let writer_task = tokio::spawn(connection::write_loop(outgoing, writer));

    let agent = Arc::new(BridgeAgent::new(
        engine,
        Arc::clone(&connection) as Arc<dyn Client>,
        permission_mode,
    ));

    let mut in_flight = JoinSet::new();
    let mut lines = BufReader::new(reader).lines();
    let read_result = loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break Ok(()),
            Err(e) => break Err(e),
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match Incoming::parse(line) {
            Ok(Incoming::Request { id, method, params }) if method == SESSION_PROMPT => {
                log::debug!("<- request {:?} {}", id, method);
                match begin_prompt(&agent, params).await {
                    Ok(turn) => {
                        let agent = Arc::clone(&agent);
                        let connection = Arc::clone(&connection);
                        in_flight.spawn(async move {
                            let result = agent
                                .finish_prompt(turn)
                                .await
                                .map_err(bridge_error)
                                .and_then(to_result);
                            if let Err(error) = &result {
                                log::warn!("{} failed: {}", SESSION_PROMPT, error);
                            }
                            connection.respond(Some(&id), result);
                        });
                    }
                    Err(error) => {
                        log::warn!("{} failed: {}", SESSION_PROMPT, error);
                        connection.respond(Some(&id), Err(error));
                    }
                }
            }
            Ok(Incoming::Request { id, method, params }) => {
                log::debug!("<- request {:?} {}", id, method);
                let agent = Arc::clone(&agent);
                let connection = Arc::clone(&connection);
                in_flight.spawn(async move {
                    let result = dispatch(&agent, &method, params).await;
                    if let Err(error) = &result {
                        log::warn!("{} failed: {}", method, error);
                    }
                    connection.respond(Some(&id), result);
                });
            }
            Ok(Incoming::Notification { method, params }) => {
                log::debug!("<- notification {}", method);
                notify(&agent, &method, params).await;
            }
            Ok(Incoming::Response { id, result }) => {
                connection.resolve(id, result).await;
            }
            Err(error) => {
                log::warn!("Rejecting input line: {}", error);
                connection.respond(None, Err(error));
            }
        }

        // Reap finished requests so the set does not grow for the whole session.
        while let Some(Some(_)) = in_flight.join_next().now_or_never() {}
    };

    log::info!("Client disconnected, shutting down");
    connection.close().await;
    for id in agent.sessions().list().await {
        if let Ok(session) = agent.sessions().get(&id).await {
            session.lock().await.cancel_turn();
        }
    }
    while in_flight.join_next().await.is_some() {}

    drop(agent);
    drop(connection);
    match writer_task.await {
        Ok(Err(e)) => log::warn!("Output stream failed: {}", e),
        Err(e) => log::warn!("Writer task failed: {}", e),
        Ok(Ok(())) => {}
    }
    read_result
}

async fn begin_prompt(agent: &BridgeAgent, params: Value) -> Result<StartedTurn, RpcError> {
    let request: PromptRequest = parse_params(params)?;
    agent.begin_prompt(request).await.map_err(bridge_error)
}

/// Run one request against the agent.
pub async fn dispatch(agent: &BridgeAgent, method: &str, params: Value) -> Result<Value, RpcError> {
    match method {
        INITIALIZE => {
            let request: InitializeRequest = params_or_default(params)?;
            to_result(agent.initialize(request))
        }
        AUTHENTICATE => {
            let request: AuthenticateRequest = params_or_default(params)?;
            agent.authenticate(request).map_err(bridge_error)?;
            Ok(Value::Object(Default::default()))
        }
        SESSION_NEW => {
            let request: NewSessionRequest = params_or_default(params)?;
            to_result(agent.new_session(request).await.map_err(bridge_error)?)
        }
        SESSION_LOAD => {
            let request: LoadSessionRequest = parse_params(params)?;
            agent.load_session(request).await.map_err(bridge_error)?;
            Ok(Value::Null)
        }
        SESSION_PROMPT => {
            let request: PromptRequest = parse_params(params)?;
            to_result(agent.prompt(request).await.map_err(bridge_error)?)
        }
        _ => Err(RpcError::method_not_found(method)),
    }
}

async fn notify(agent: &BridgeAgent, method: &str, params: Value) {
    match method {
        SESSION_CANCEL => match parse_params::<CancelNotification>(params) {
            Ok(notification) => {
                if let Err(e) = agent.cancel(notification).await {
                    log::warn!("Cancel failed: {}", e);
                }
            }
            Err(e) => log::warn!("Ignoring malformed cancel: {}", e),
        },
        _ => log::debug!("Ignoring notification {}", method),
    }
}

fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, RpcError> {
    serde_json::from_value(params).map_err(|e| RpcError::invalid_params(e.to_string()))
}

fn params_or_default<T: DeserializeOwned + Default>(params: Value) -> Result<T, RpcError> {
    if params.is_null() {
        return Ok(T::default());
    }
    parse_params(params)
}

fn to_result(value: impl Serialize) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::internal(e.to_string()))
}

fn bridge_error(error: BridgeError) -> RpcError {
    match error {
        BridgeError::Session(e) => RpcError::new(INVALID_PARAMS, e.to_string()),
        other => RpcError::internal(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jsonrpc::{INTERNAL_ERROR, METHOD_NOT_FOUND, PARSE_ERROR};
    use acp_bridge_core::agents::{EngineMessage, EngineRequest, EngineStream};
    use acp_bridge_core::EngineError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::future::Future;
    use std::pin::Pin;
    use tokio::io::{AsyncWriteExt, DuplexStream, Lines};

    /// Replies to every prompt with its own text. "ask" asks for permission
    /// to run Bash first; "wait" streams nothing until the turn is cancelled.
    struct EchoEngine;

    struct EchoStream {
        messages: std::vec::IntoIter<Value>,
        until_cancelled: Option<Pin<Box<dyn Future<Output = ()> + Send>>>,
    }

    #[async_trait]
    impl Engine for EchoEngine {
        async fn start(&self, request: EngineRequest) -> Result<Box<dyn EngineStream>, EngineError> {
            let text = request.message.text();
            let mut messages = vec![
                json!({"type": "system", "subtype": "init", "session_id": "claude-echo"}),
            ];
            if text == "ask" {
                let decision = request
                    .approver
                    .decide("Bash", &json!({"command": "ls"}), None)
                    .await;
                messages.push(json!({"type": "text", "text": format!("{:?}", decision)}));
            } else if text != "wait" {
                messages.push(json!({"type": "text", "text": text}));
            }

            let until_cancelled = (text == "wait").then(|| {
                let cancel = request.cancel.clone();
                Box::pin(async move { cancel.cancelled().await })
                    as Pin<Box<dyn Future<Output = ()> + Send>>
            });
            Ok(Box::new(EchoStream {
                messages: messages.into_iter(),
                until_cancelled,
            }))
        }
    }

    #[async_trait]
    impl EngineStream for EchoStream {
        async fn next_message(&mut self) -> Option<Result<EngineMessage, EngineError>> {
            if let Some(value) = self.messages.next() {
                return Some(Ok(EngineMessage::from_value(value)));
            }
            if let Some(cancelled) = self.until_cancelled.take() {
                cancelled.await;
            }
            None
        }
    }

    struct Peer {
        input: DuplexStream,
        output: Lines<BufReader<DuplexStream>>,
        server: tokio::task::JoinHandle<std::io::Result<()>>,
    }

    impl Peer {
        fn start() -> Self {
            let (input, server_in) = tokio::io::duplex(64 * 1024);
            let (server_out, output) = tokio::io::duplex(64 * 1024);
            let server = tokio::spawn(serve(
                Arc::new(EchoEngine),
                PermissionMode::Default,
                server_in,
                server_out,
            ));
            Self {
                input,
                output: BufReader::new(output).lines(),
                server,
            }
        }

        async fn send(&mut self, message: Value) {
            self.send_raw(&message.to_string()).await;
        }

        async fn send_raw(&mut self, line: &str) {
            self.input.write_all(line.as_bytes()).await.unwrap();
            self.input.write_all(b"\n").await.unwrap();
        }

        async fn recv(&mut self) -> Value {
            let line = self.output.next_line().await.unwrap().expect("server output");
            serde_json::from_str(&line).unwrap()
        }

        async fn call(&mut self, id: u64, method: &str, params: Value) -> Value {
            self.send(json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}))
                .await;
            loop {
                let message = self.recv().await;
                if message["id"] == json!(id) {
                    return message;
                }
            }
        }
    }

    #[tokio::test]
    async fn initialize_returns_capabilities() {
        let mut peer = Peer::start();
        let response = peer.call(1, "initialize", json!({"protocolVersion": 1})).await;

        assert_eq!(response["result"]["protocolVersion"], 1);
        assert_eq!(response["result"]["agentCapabilities"]["loadSession"], true);
    }

    #[tokio::test]
    async fn prompt_streams_updates_before_response() {
        let mut peer = Peer::start();
        let created = peer.call(1, "session/new", json!({"cwd": "/repo", "mcpServers": []})).await;
        let session_id = created["result"]["sessionId"].as_str().unwrap().to_string();

        peer.send(json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "session/prompt",
            "params": {"sessionId": session_id, "prompt": [{"type": "text", "text": "hello"}]}
        }))
        .await;

        let update = peer.recv().await;
        assert_eq!(update["method"], "session/update");
        assert_eq!(update["params"]["sessionId"], session_id.as_str());
        assert_eq!(update["params"]["update"]["content"]["text"], "hello");

        let response = peer.recv().await;
        assert_eq!(response["id"], 2);
        assert_eq!(response["result"]["stopReason"], "end_turn");
    }

    #[tokio::test]
    async fn permission_request_is_answered_by_client() {
        let mut peer = Peer::start();
        let created = peer.call(1, "session/new", json!({})).await;
        let session_id = created["result"]["sessionId"].as_str().unwrap().to_string();

        peer.send(json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "session/prompt",
            "params": {"sessionId": session_id, "prompt": [{"type": "text", "text": "ask"}]}
        }))
        .await;

        let request = peer.recv().await;
        assert_eq!(request["method"], "session/request_permission");
        assert_eq!(request["params"]["options"][1]["optionId"], "allow_once");
        peer.send(json!({
            "jsonrpc": "2.0",
            "id": request["id"],
            "result": {"outcome": {"outcome": "selected", "optionId": "allow_once"}}
        }))
        .await;

        let update = peer.recv().await;
        let text = update["params"]["update"]["content"]["text"].as_str().unwrap();
        assert!(text.contains("Allow"), "unexpected decision: {}", text);

        let response = peer.recv().await;
        assert_eq!(response["result"]["stopReason"], "end_turn");
    }

    #[tokio::test]
    async fn back_to_back_prompts_supersede_in_read_order() {
        let mut peer = Peer::start();
        let created = peer.call(1, "session/new", json!({})).await;
        let session_id = created["result"]["sessionId"].as_str().unwrap().to_string();

        let prompt = |id: u64, text: &str| {
            json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": "session/prompt",
                "params": {"sessionId": session_id, "prompt": [{"type": "text", "text": text}]}
            })
        };
        peer.send_raw(&format!("{}\n{}", prompt(2, "wait"), prompt(3, "later")))
            .await;

        let mut stop_reasons = HashMap::new();
        while stop_reasons.len() < 2 {
            let message = peer.recv().await;
            if let Some(id) = message["id"].as_u64() {
                stop_reasons.insert(id, message["result"]["stopReason"].clone());
            }
        }
        assert_eq!(stop_reasons[&2], "cancelled");
        assert_eq!(stop_reasons[&3], "end_turn");
    }

    #[tokio::test]
    async fn unknown_session_is_invalid_params() {
        let mut peer = Peer::start();
        let response = peer
            .call(
                1,
                "session/prompt",
                json!({"sessionId": "missing", "prompt": []}),
            )
            .await;

        assert_eq!(response["error"]["code"], INVALID_PARAMS);
        assert!(response["error"]["message"]
            .as_str()
            .unwrap()
            .contains("missing"));
    }

    #[tokio::test]
    async fn malformed_params_are_invalid_params() {
        let mut peer = Peer::start();
        let response = peer.call(1, "session/prompt", json!({"prompt": "nope"})).await;
        assert_eq!(response["error"]["code"], INVALID_PARAMS);
    }

    #[tokio::test]
    async fn unknown_method_is_reported() {
        let mut peer = Peer::start();
        let response = peer.call(1, "session/fork", json!({})).await;
        assert_eq!(response["error"]["code"], METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn garbage_line_gets_parse_error_with_null_id() {
        let mut peer = Peer::start();
        peer.send_raw("not json").await;

        let response = peer.recv().await;
        assert_eq!(response["error"]["code"], PARSE_ERROR);
        assert_eq!(response["id"], Value::Null);
    }

    #[tokio::test]
    async fn server_stops_at_end_of_input() {
        let mut peer = Peer::start();
        peer.call(1, "initialize", json!({})).await;
        drop(peer.input);

        peer.server.await.unwrap().unwrap();
        assert!(peer.output.next_line().await.unwrap().is_none());
    }

    #[test]
    fn engine_failures_map_to_internal_error() {
        let error = bridge_error(BridgeError::Engine(EngineError::Failed("boom".to_string())));
        assert_eq!(error.code, INTERNAL_ERROR);
        assert_eq!(error.message, "boom");
    }
}
