//! Timeout-enforced shell tool.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::definition::{ToolParameter, ToolResult};
use crate::{Arguments, Tool, ToolKind};

/// Default command timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// How much stderr to quote in the error message on non-zero exit.
const STDERR_PREVIEW_CHARS: usize = 200;

/// Built-in tool for executing shell commands.
///
/// Commands run under `sh -c` with captured stdout/stderr and a hard
/// timeout; a timed-out process is killed. Optional allow/deny
/// command-prefix filters gate what may run at all.
pub struct ShellTool {
    timeout: Duration,
    allowed_commands: Option<Vec<String>>,
    denied_commands: Vec<String>,
    working_directory: Option<PathBuf>,
}

impl ShellTool {
    /// Create a tool with the default 60-second timeout and no command
    /// filters.
    #[must_use]
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            allowed_commands: None,
            denied_commands: Vec::new(),
            working_directory: None,
        }
    }

    /// Override the default timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Only allow commands starting with one of these prefixes.
    #[must_use]
    pub fn allowed_commands(mut self, prefixes: Vec<String>) -> Self {
        self.allowed_commands = Some(prefixes);
        self
    }

    /// Deny commands starting with one of these prefixes.
    #[must_use]
    pub fn denied_commands(mut self, prefixes: Vec<String>) -> Self {
        self.denied_commands = prefixes;
        self
    }

    /// Default working directory for commands.
    #[must_use]
    pub fn working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    fn validate_command(&self, command: &str) -> Result<(), String> {
        for denied in &self.denied_commands {
            if command.starts_with(denied.as_str()) {
                return Err(format!("Command denied: starts with '{denied}'"));
            }
        }
        if let Some(allowed) = &self.allowed_commands
            && !allowed.iter().any(|prefix| command.starts_with(prefix.as_str()))
        {
            return Err("Command not in allowed list".into());
        }
        Ok(())
    }
}

impl Default for ShellTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Execute shell commands and capture their output. \
         Returns stdout, stderr, and exit code."
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Builtin
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::new("command", "string", "The shell command to execute").required(true),
            ToolParameter::new(
                "working_directory",
                "string",
                "Working directory for the command (optional)",
            ),
            ToolParameter::new(
                "timeout",
                "number",
                "Command timeout in seconds (optional, overrides default)",
            ),
        ]
    }

    async fn execute(&self, arguments: Arguments) -> ToolResult {
        let command = arguments
            .get("command")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let working_dir = arguments
            .get("working_directory")
            .and_then(|v| v.as_str())
            .map(PathBuf::from)
            .or_else(|| self.working_directory.clone());
        let timeout = arguments
            .get("timeout")
            .and_then(|v| v.as_f64())
            .map(Duration::from_secs_f64)
            .unwrap_or(self.timeout);

        if let Err(message) = self.validate_command(&command) {
            return ToolResult::error(self.name(), message);
        }

        tracing::info!(command = %command, "executing shell command");

        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c")
            .arg(&command)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Timing out drops the output future, which must take the
            // process down with it.
            .kill_on_drop(true);
        if let Some(dir) = &working_dir {
            cmd.current_dir(dir);
        }

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return ToolResult::error(self.name(), format!("Command execution failed: {e}"));
            }
        };

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return ToolResult::error(self.name(), format!("Command execution failed: {e}"));
            }
            Err(_elapsed) => {
                tracing::error!(command = %command, timeout_s = timeout.as_secs_f64(), "shell command timed out");
                return ToolResult::error(
                    self.name(),
                    format!("Command timed out after {} seconds", timeout.as_secs_f64()),
                )
                .with_metadata("command", json!(command))
                .with_metadata("timeout", json!(timeout.as_secs_f64()));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let exit_code = output.status.code().unwrap_or(-1);

        tracing::info!(
            exit_code,
            stdout_len = stdout.len(),
            stderr_len = stderr.len(),
            "shell command completed"
        );

        let body = json!({
            "stdout": stdout,
            "stderr": stderr,
            "exit_code": exit_code,
        });

        let mut result = if exit_code == 0 {
            ToolResult::success(self.name(), body)
        } else {
            let mut message = format!("Command exited with code {exit_code}");
            if !stderr.is_empty() {
                let preview: String = stderr.chars().take(STDERR_PREVIEW_CHARS).collect();
                message.push_str(&format!(": {preview}"));
            }
            let mut error = ToolResult::error(self.name(), message);
            error.output = Some(body);
            error
        };

        result = result
            .with_metadata("command", json!(command))
            .with_metadata("exit_code", json!(exit_code));
        if let Some(dir) = &working_dir {
            result = result.with_metadata("working_directory", json!(dir.display().to_string()));
        }
        result
    }
}
