//! Claude CLI spawn configuration.

use std::process::Stdio;

use tokio::process::Command;

use crate::session::PermissionMode;

/// Options for one Claude CLI invocation.
#[derive(Debug, Clone)]
pub struct ClaudeConfig {
    pub binary_path: String,
    pub working_dir: Option<String>,
    pub permission_mode: PermissionMode,
    /// Claude session to resume.
    pub resume: Option<String>,
}

impl ClaudeConfig {
    pub fn new(binary_path: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
            working_dir: None,
            permission_mode: PermissionMode::Default,
            resume: None,
        }
    }

    /// Arguments for a stream-json session with stdio permission prompts.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "--output-format".to_string(),
            "stream-json".to_string(),
            "--input-format".to_string(),
            "stream-json".to_string(),
            "--verbose".to_string(),
            "--permission-prompt-tool".to_string(),
            "stdio".to_string(),
            "--permission-mode".to_string(),
            self.permission_mode.as_str().to_string(),
        ];

        if let Some(ref id) = self.resume {
            if !id.is_empty() {
                args.push("--resume".to_string());
                args.push(id.clone());
            }
        }

        args
    }

    /// Build the command with all three standard streams piped.
    ///
    /// The child is killed when its handle is dropped.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary_path);
        cmd.args(self.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(ref dir) = self.working_dir {
            if !dir.is_empty() {
                cmd.current_dir(dir);
            }
        }

        cmd
    }
}
