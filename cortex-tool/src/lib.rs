#![deny(missing_docs)]
//! Tool contract and registry for the cortex runtime.
//!
//! Every tool source — built-in implementations and remote JSON-RPC
//! servers — implements the [`Tool`] trait. [`ToolRouter`] is the single
//! registry with a global namespace; its `execute` validates arguments,
//! enforces a timeout, and reports every failure mode as a
//! [`ToolResult`] with error status so the orchestrator can relay it to
//! the model as a tool-result message instead of crashing the turn.

pub mod builtin;
mod definition;
mod router;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use definition::{ToolDefinition, ToolParameter, ToolResult, ToolStatus};
pub use router::{RegistryError, ToolCounts, ToolRouter, DEFAULT_TOOL_TIMEOUT};

/// Tool arguments as parsed by the model: a JSON object.
pub type Arguments = serde_json::Map<String, serde_json::Value>;

/// Where a tool is implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    /// Implemented in this process.
    Builtin,
    /// Hosted by a remote MCP server.
    Mcp,
}

/// A tool callable by the model.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name (global namespace across all sources).
    fn name(&self) -> &str;

    /// What the tool does, for the model's benefit.
    fn description(&self) -> &str;

    /// Where the tool is implemented.
    fn kind(&self) -> ToolKind;

    /// The parameters the tool accepts.
    fn parameters(&self) -> Vec<ToolParameter>;

    /// The complete definition (name + description + parameters).
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }

    /// Execute with validated arguments. Tools never return a Rust error;
    /// failures are [`ToolResult`]s with error status.
    async fn execute(&self, arguments: Arguments) -> ToolResult;
}
