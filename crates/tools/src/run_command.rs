//! `run_command` — execute a shell command inside the workspace.
//!
//! The working directory is confined to the workspace; the command string is
//! not. A non-zero exit is a normal result, only spawn failures and timeouts
//! are errors.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use ssalmuk_core::error::ToolError;
use ssalmuk_core::tool::{Tool, ToolOutput};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::guard_path;

const TOOL_NAME: &str = "run_command";

/// Default command timeout.
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunCommandArgs {
    command: String,
    #[serde(default)]
    cwd: Option<String>,
    #[serde(default)]
    timeout_ms: Option<f64>,
}

/// Runs shell commands with the workspace (or a sub-directory) as cwd.
pub struct RunCommandTool {
    default_timeout_ms: u64,
}

impl RunCommandTool {
    pub fn new() -> Self {
        Self {
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    /// Override the timeout used when a call does not pass `timeoutMs`.
    pub fn with_default_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.default_timeout_ms = timeout_ms;
        self
    }

    fn timeout_ms(&self, requested: Option<f64>) -> Result<u64, ToolError> {
        match requested {
            None => Ok(self.default_timeout_ms),
            Some(ms) if ms.is_finite() && ms > 0.0 => Ok(ms.ceil() as u64),
            Some(ms) => Err(ToolError::InvalidArguments(format!(
                "timeoutMs must be a positive number, got {ms}"
            ))),
        }
    }

    fn shell(command: &str) -> Command {
        if cfg!(target_os = "windows") {
            let mut cmd = Command::new("cmd");
            cmd.args(["/C", command]);
            cmd
        } else {
            let mut cmd = Command::new("sh");
            cmd.args(["-c", command]);
            cmd
        }
    }
}

impl Default for RunCommandTool {
    fn default() -> Self {
        Self::new()
    }
}

fn strip_final_newline(mut text: String) -> String {
    if text.ends_with('\n') {
        text.pop();
        if text.ends_with('\r') {
            text.pop();
        }
    }
    text
}

#[async_trait]
impl Tool for RunCommandTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Execute a shell command in the workspace (or optional cwd). Returns stdout and stderr."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Shell command to run, e.g. cargo test, ls, npm test."
                },
                "cwd": {
                    "type": "string",
                    "description": "Optional working directory (relative to workspace). Default is workspace root."
                },
                "timeoutMs": {
                    "type": "number",
                    "description": "Optional timeout in milliseconds. Default 60000."
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(
        &self,
        workspace: &Path,
        arguments: serde_json::Value,
    ) -> Result<ToolOutput, ToolError> {
        let args: RunCommandArgs = serde_json::from_value(arguments)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        let timeout_ms = self.timeout_ms(args.timeout_ms)?;

        let cwd = match args.cwd.as_deref() {
            Some(dir) => guard_path(workspace, dir)?,
            None => workspace.to_path_buf(),
        };

        debug!(command = %args.command, cwd = %cwd.display(), timeout_ms, "Executing shell command");

        let child = Self::shell(&args.command)
            .current_dir(&cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: TOOL_NAME.into(),
                reason: format!("Failed to spawn command: {e}"),
            })?;

        // Dropping the child on timeout kills it.
        let output = tokio::time::timeout(Duration::from_millis(timeout_ms), child.wait_with_output())
            .await
            .map_err(|_| {
                warn!(command = %args.command, timeout_ms, "Command timed out");
                ToolError::Timeout {
                    tool_name: TOOL_NAME.into(),
                    timeout_ms,
                }
            })?
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: TOOL_NAME.into(),
                reason: e.to_string(),
            })?;

        let exit_code = output.status.code().unwrap_or(-1);
        if exit_code != 0 {
            debug!(command = %args.command, exit_code, "Command exited non-zero");
        }

        Ok(ToolOutput::Command {
            stdout: strip_final_newline(String::from_utf8_lossy(&output.stdout).into_owned()),
            stderr: strip_final_newline(String::from_utf8_lossy(&output.stderr).into_owned()),
            exit_code,
        })
    }
}
