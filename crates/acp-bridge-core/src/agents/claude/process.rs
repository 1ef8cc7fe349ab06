//! Claude CLI process engine.
//!
//! Each turn spawns one `claude` process in stream-json mode. A pump task owns
//! the child: it forwards stream messages to the turn, answers permission
//! control requests through the turn's [`ToolApprover`], and kills the child
//! when the turn is cancelled.

use std::process::ExitStatus;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::agents::{
    Engine, EngineEvent, EngineMessage, EngineRequest, EngineStream, PermissionDecision,
    ToolApprover,
};
use crate::error::EngineError;

use super::parser::{ClaudeOutput, ClaudeParser};
use super::spawn::ClaudeConfig;
use super::types::{control_response, user_envelope, ControlRequest};

/// Buffered messages between the pump task and the turn.
const CHANNEL_CAPACITY: usize = 64;

/// Stderr kept for the exit error.
const STDERR_TAIL_BYTES: usize = 4096;

type MessageSender = mpsc::Sender<Result<EngineMessage, EngineError>>;

/// [`Engine`] backed by the Claude CLI.
#[derive(Debug, Clone)]
pub struct ClaudeProcessEngine {
    binary_path: String,
}

impl ClaudeProcessEngine {
    pub fn new(binary_path: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }

    pub fn binary_path(&self) -> &str {
        &self.binary_path
    }
}

#[async_trait]
impl Engine for ClaudeProcessEngine {
    async fn start(&self, request: EngineRequest) -> Result<Box<dyn EngineStream>, EngineError> {
        let config = ClaudeConfig {
            binary_path: self.binary_path.clone(),
            working_dir: request.working_dir.clone(),
            permission_mode: request.permission_mode,
            resume: request.resume.clone(),
        };
        log::info!(
            "Spawning {} (mode {}, resume {:?})",
            config.binary_path,
            config.permission_mode,
            config.resume
        );

        let mut child = config
            .command()
            .spawn()
            .map_err(|e| EngineError::Spawn(format!("{}: {}", config.binary_path, e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::Spawn("Failed to capture stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Spawn("Failed to capture stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::Spawn("Failed to capture stderr".to_string()))?;

        write_line(&mut stdin, &user_envelope(&request.message)).await?;

        let stderr_task = tokio::spawn(collect_stderr(stderr));
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(pump(
            child,
            stdin,
            stdout,
            stderr_task,
            request.approver,
            request.cancel,
            tx,
        ));

        Ok(Box::new(ClaudeStream { rx }))
    }
}

/// Receiving half handed to the turn.
struct ClaudeStream {
    rx: mpsc::Receiver<Result<EngineMessage, EngineError>>,
}

#[async_trait]
impl EngineStream for ClaudeStream {
    async fn next_message(&mut self) -> Option<Result<EngineMessage, EngineError>> {
        self.rx.recv().await
    }
}

/// Drive one Claude process until it exits or the turn is cancelled.
async fn pump(
    mut child: Child,
    stdin: ChildStdin,
    stdout: impl AsyncRead + Unpin,
    stderr_task: JoinHandle<String>,
    approver: Arc<dyn ToolApprover>,
    cancel: CancellationToken,
    tx: MessageSender,
) {
    let mut reader = BufReader::new(stdout);
    let mut parser = ClaudeParser::new();
    // Dropped after the result message so Claude sees EOF and exits.
    let mut stdin = Some(stdin);
    let mut saw_result = false;

    loop {
        let mut line = String::new();
        let read = tokio::select! {
            _ = cancel.cancelled() => {
                terminate(&mut child).await;
                return;
            }
            read = reader.read_line(&mut line) => read,
        };

        let outputs = match read {
            Ok(0) => {
                let remaining = parser.flush();
                if remaining.is_empty() {
                    break;
                }
                remaining
            }
            Ok(_) => parser.feed(&line),
            Err(e) => {
                let _ = tx.send(Err(EngineError::Io(e))).await;
                terminate(&mut child).await;
                return;
            }
        };

        for output in outputs {
            match output {
                ClaudeOutput::Message(message) => {
                    if matches!(message.event, EngineEvent::Result { .. }) {
                        saw_result = true;
                        stdin = None;
                    }
                    if tx.send(Ok(message)).await.is_err() {
                        log::debug!("Turn dropped its stream, stopping engine");
                        terminate(&mut child).await;
                        return;
                    }
                }
                ClaudeOutput::ControlRequest {
                    request_id,
                    request,
                } => {
                    let decision = tokio::select! {
                        _ = cancel.cancelled() => {
                            terminate(&mut child).await;
                            return;
                        }
                        decision = answer(approver.as_ref(), &request) => decision,
                    };
                    match stdin.as_mut() {
                        Some(stdin) => {
                            let response = control_response(&request_id, &decision);
                            if let Err(e) = write_line(stdin, &response).await {
                                log::warn!("Failed to answer control request {}: {}", request_id, e);
                            }
                        }
                        None => log::warn!(
                            "Control request {} arrived after stdin closed",
                            request_id
                        ),
                    }
                }
            }
        }
    }

    drop(stdin);
    let status = child.wait().await;
    let stderr = stderr_task.await.unwrap_or_default();
    if let Some(error) = exit_error(status, saw_result, stderr) {
        let _ = tx.send(Err(error)).await;
    }
}

/// Resolve a control request to a decision.
async fn answer(approver: &dyn ToolApprover, request: &ControlRequest) -> PermissionDecision {
    if !request.is_tool_permission() {
        log::warn!("Denying unsupported control request '{}'", request.subtype);
        return PermissionDecision::Deny {
            message: format!("Unsupported control request: {}", request.subtype),
        };
    }

    let input = request.input.clone().unwrap_or(Value::Null);
    let decision = approver
        .decide(&request.tool_name, &input, request.tool_use_id.as_deref())
        .await;
    log::debug!(
        "Tool {} ({:?}) -> {}",
        request.tool_name,
        request.tool_use_id,
        if decision.is_allow() { "allow" } else { "deny" }
    );
    decision
}

/// Map the process exit onto a stream error, if it warrants one.
///
/// A process that already reported its result ended its turn normally
/// whatever the exit code.
fn exit_error(
    status: std::io::Result<ExitStatus>,
    saw_result: bool,
    stderr: String,
) -> Option<EngineError> {
    match status {
        Ok(status) if status.success() || saw_result => None,
        Ok(status) => Some(EngineError::Exited {
            code: status.code(),
            stderr,
        }),
        Err(e) => Some(EngineError::Io(e)),
    }
}

async fn terminate(child: &mut Child) {
    if let Err(e) = child.kill().await {
        log::debug!("Engine process already gone: {}", e);
    }
}

async fn write_line(stdin: &mut (impl AsyncWrite + Unpin), value: &Value) -> std::io::Result<()> {
    let mut line = value.to_string();
    line.push('\n');
    stdin.write_all(line.as_bytes()).await?;
    stdin.flush().await
}

/// Log stderr as it arrives and keep its tail for error reporting.
async fn collect_stderr(stderr: impl AsyncRead + Unpin) -> String {
    let mut lines = BufReader::new(stderr).lines();
    let mut tail = String::new();
    while let Ok(Some(line)) = lines.next_line().await {
        log::warn!("engine stderr: {}", line);
        if !tail.is_empty() {
            tail.push('\n');
        }
        tail.push_str(&line);
        if tail.len() > STDERR_TAIL_BYTES {
            let mut cut = tail.len() - STDERR_TAIL_BYTES;
            while !tail.is_char_boundary(cut) {
                cut += 1;
            }
            tail.drain(..cut);
        }
    }
    tail
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DenyAll;

    #[async_trait]
    impl ToolApprover for DenyAll {
        async fn decide(
            &self,
            tool_name: &str,
            _input: &Value,
            _tool_use_id: Option<&str>,
        ) -> PermissionDecision {
            PermissionDecision::Deny {
                message: format!("no {}", tool_name),
            }
        }
    }

    mod answer {
        use super::*;

        #[tokio::test]
        async fn can_use_tool_goes_to_approver() {
            let request = ControlRequest {
                subtype: "can_use_tool".to_string(),
                tool_name: "Bash".to_string(),
                input: Some(serde_json::json!({"command": "ls"})),
                tool_use_id: None,
            };
            let decision = answer(&DenyAll, &request).await;
            assert_eq!(
                decision,
                PermissionDecision::Deny {
                    message: "no Bash".to_string()
                }
            );
        }

        #[tokio::test]
        async fn unsupported_subtype_is_denied() {
            let request = ControlRequest {
                subtype: "hook_callback".to_string(),
                tool_name: String::new(),
                input: None,
                tool_use_id: None,
            };
            let decision = answer(&DenyAll, &request).await;
            assert!(!decision.is_allow());
        }
    }

    mod stderr {
        use super::*;

        #[tokio::test]
        async fn collects_lines() {
            let data: &[u8] = b"warning: one\nerror: two\n";
            assert_eq!(collect_stderr(data).await, "warning: one\nerror: two");
        }

        #[tokio::test]
        async fn keeps_only_the_tail() {
            let data = "x".repeat(STDERR_TAIL_BYTES * 2) + "\nlast line\n";
            let tail = collect_stderr(data.as_bytes()).await;
            assert!(tail.len() <= STDERR_TAIL_BYTES);
            assert!(tail.ends_with("last line"));
        }
    }

    mod write_line {
        use super::*;

        #[tokio::test]
        async fn appends_newline() {
            let mut out: Vec<u8> = Vec::new();
            write_line(&mut out, &serde_json::json!({"type": "user"}))
                .await
                .unwrap();
            assert_eq!(out, b"{\"type\":\"user\"}\n");
        }
    }

    /// Runs whole turns against a shell script standing in for the CLI.
    #[cfg(unix)]
    mod scripted_cli {
        use super::*;
        use crate::client::Client;
        use crate::driver::PromptDriver;
        use crate::protocol::{PromptBlock, StopReason};
        use crate::session::SessionStore;
        use crate::testing::RecordingClient;
        use std::os::unix::fs::PermissionsExt;

        /// Announces a Bash call, asks permission for it straight away, then
        /// finishes once the answer arrives.
        const TOOL_THEN_PERMISSION: &str = r#"#!/bin/sh
read -r prompt
echo '{"type":"system","subtype":"init","session_id":"claude-1"}'
echo '{"type":"assistant","message":{"role":"assistant","content":[{"type":"tool_use","id":"toolu_1","name":"Bash","input":{"command":"ls"}}]}}'
echo '{"type":"control_request","request_id":"req-1","request":{"subtype":"can_use_tool","tool_name":"Bash","input":{"command":"ls"},"tool_use_id":"toolu_1"}}'
read -r answer
echo '{"type":"result","subtype":"success","result":"done","session_id":"claude-1"}'
"#;

        fn fake_claude(dir: &tempfile::TempDir, script: &str) -> String {
            let path = dir.path().join("claude");
            std::fs::write(&path, script).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path.to_string_lossy().into_owned()
        }

        #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
        async fn permission_request_carries_the_requested_call_id() {
            let dir = tempfile::tempdir().unwrap();
            let engine = Arc::new(ClaudeProcessEngine::new(fake_claude(
                &dir,
                TOOL_THEN_PERMISSION,
            )));
            let client = Arc::new(RecordingClient::new());
            let driver = PromptDriver::new(engine, Arc::clone(&client) as Arc<dyn Client>);
            let store = SessionStore::default();

            const TURNS: usize = 20;
            for _ in 0..TURNS {
                client.push_selected("allow_once");
                // Fresh session each time so the ledger holds no earlier call.
                let id = store.create(None).await;
                let session = store.get(&id).await.unwrap();
                let reason = driver
                    .run(
                        &id,
                        session,
                        &[PromptBlock::Text {
                            text: "list files".to_string(),
                        }],
                    )
                    .await
                    .unwrap();
                assert_eq!(reason, StopReason::EndTurn);
            }

            let requests = client.permission_requests();
            assert_eq!(requests.len(), TURNS);
            for request in requests {
                assert_eq!(request.tool_call.tool_call_id, "toolu_1");
            }
        }
    }

    #[tokio::test]
    async fn missing_binary_fails_to_spawn() {
        use crate::agents::{UserContent, UserMessage};
        use crate::session::PermissionMode;

        let engine = ClaudeProcessEngine::new("/nonexistent/claude-binary");
        let request = EngineRequest {
            message: UserMessage::new(vec![UserContent::Text {
                text: "hi".to_string(),
            }]),
            permission_mode: PermissionMode::Default,
            resume: None,
            working_dir: None,
            approver: Arc::new(DenyAll),
            cancel: CancellationToken::new(),
        };

        match engine.start(request).await {
            Err(EngineError::Spawn(message)) => {
                assert!(message.contains("/nonexistent/claude-binary"))
            }
            Err(other) => panic!("Expected spawn error, got {}", other),
            Ok(_) => panic!("Expected spawn error"),
        }
    }
}
