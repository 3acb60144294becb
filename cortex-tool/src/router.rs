//! The tool router: a single registry with validated, timeout-enforced
//! dispatch.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;

use crate::definition::{ToolDefinition, ToolResult};
use crate::{Arguments, Tool, ToolKind};

/// Default per-call timeout enforced by the router.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(300);

/// Registration errors. Execution never errors — failures come back as
/// [`ToolResult`]s.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A tool with this name is already registered.
    #[error("tool '{0}' is already registered")]
    DuplicateTool(String),
}

/// Registered tool counts by kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolCounts {
    /// All registered tools.
    pub total: usize,
    /// Built-in tools.
    pub builtin: usize,
    /// Remote (MCP) tools.
    pub mcp: usize,
}

/// Routes tool calls to registered tools, built-in and remote alike.
pub struct ToolRouter {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl ToolRouter {
    /// Create an empty router.
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
        }
    }

    /// Register a tool. The namespace is global; a duplicate name is an
    /// error for the caller to handle (remote-tool sync treats it as a
    /// soft conflict and skips the tool).
    pub fn register(&self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        let mut tools = self.tools.write().expect("tool registry lock poisoned");
        let name = tool.name().to_string();
        if tools.contains_key(&name) {
            return Err(RegistryError::DuplicateTool(name));
        }
        tracing::info!(tool = %name, kind = ?tool.kind(), "registered tool");
        tools.insert(name, tool);
        Ok(())
    }

    /// Unregister a tool. Returns whether it was present.
    pub fn unregister(&self, name: &str) -> bool {
        let mut tools = self.tools.write().expect("tool registry lock poisoned");
        let removed = tools.remove(name).is_some();
        if removed {
            tracing::info!(tool = %name, "unregistered tool");
        }
        removed
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools
            .read()
            .expect("tool registry lock poisoned")
            .get(name)
            .cloned()
    }

    /// Whether a tool is registered.
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools
            .read()
            .expect("tool registry lock poisoned")
            .contains_key(name)
    }

    /// All registered tools, optionally filtered by kind. Sorted by name
    /// for stable output.
    pub fn list(&self, kind: Option<ToolKind>) -> Vec<Arc<dyn Tool>> {
        let tools = self.tools.read().expect("tool registry lock poisoned");
        let mut listed: Vec<Arc<dyn Tool>> = tools
            .values()
            .filter(|t| kind.is_none_or(|k| t.kind() == k))
            .cloned()
            .collect();
        listed.sort_by(|a, b| a.name().cmp(b.name()));
        listed
    }

    /// Definitions for LLM consumption, filtered by an enabled-tool
    /// allowlist (`None` = all tools).
    pub fn definitions(&self, enabled_tools: Option<&[String]>) -> Vec<ToolDefinition> {
        self.list(None)
            .into_iter()
            .filter(|t| enabled_tools.is_none_or(|names| names.iter().any(|n| n == t.name())))
            .map(|t| t.definition())
            .collect()
    }

    /// Registered tool counts by kind.
    pub fn counts(&self) -> ToolCounts {
        let tools = self.tools.read().expect("tool registry lock poisoned");
        let builtin = tools.values().filter(|t| t.kind() == ToolKind::Builtin).count();
        ToolCounts {
            total: tools.len(),
            builtin,
            mcp: tools.len() - builtin,
        }
    }

    /// Execute a tool: locate, validate, run under a timeout.
    ///
    /// Unknown tool, validation failure, and timeout all come back as
    /// error results — never as panics or Rust errors — so the
    /// orchestrator can relay them to the model.
    pub async fn execute(
        &self,
        tool_name: &str,
        arguments: Arguments,
        timeout: Option<Duration>,
    ) -> ToolResult {
        let started_at = Utc::now();
        let timeout = timeout.unwrap_or(DEFAULT_TOOL_TIMEOUT);

        let Some(tool) = self.get(tool_name) else {
            return finish(
                ToolResult::error(tool_name, format!("Tool '{tool_name}' not found")),
                started_at,
            );
        };

        if let Err(message) = tool.definition().validate(&arguments) {
            return finish(
                ToolResult::error(tool_name, format!("Invalid arguments: {message}")),
                started_at,
            );
        }

        tracing::info!(tool = %tool_name, "executing tool");

        let mut result = match tokio::time::timeout(timeout, tool.execute(arguments)).await {
            Ok(result) => result,
            Err(_elapsed) => {
                tracing::error!(tool = %tool_name, timeout_s = timeout.as_secs(), "tool timed out");
                ToolResult::error(
                    tool_name,
                    format!(
                        "Tool execution timed out after {} seconds",
                        timeout.as_secs()
                    ),
                )
            }
        };

        // Fill in timing the tool didn't set itself.
        if result.started_at.is_none() {
            result.started_at = Some(started_at);
        }
        if result.completed_at.is_none() {
            result.completed_at = Some(Utc::now());
        }
        if result.duration_ms.is_none()
            && let (Some(start), Some(end)) = (result.started_at, result.completed_at)
        {
            result.duration_ms = Some((end - start).num_milliseconds().max(0) as u64);
        }

        tracing::info!(
            tool = %tool_name,
            status = result.status.as_str(),
            duration_ms = result.duration_ms,
            "tool completed"
        );

        result
    }
}

impl Default for ToolRouter {
    fn default() -> Self {
        Self::new()
    }
}

fn finish(mut result: ToolResult, started_at: chrono::DateTime<Utc>) -> ToolResult {
    result.started_at = Some(started_at);
    result.completed_at = Some(Utc::now());
    result.duration_ms = Some(0);
    result
}
