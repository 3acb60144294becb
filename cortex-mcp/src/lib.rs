#![deny(missing_docs)]
//! Remote tool client for the Model Context Protocol.
//!
//! [`McpClient`] spawns an external tool server as a child process and
//! speaks newline-framed JSON-RPC 2.0 over its stdin/stdout: `initialize`
//! handshake, `notifications/initialized`, `tools/list`, `tools/call`.
//! [`McpManager`] owns one client per server id and composes every
//! connected server's tools into the common [`Tool`](cortex_tool::Tool)
//! interface via [`McpTool`].
//!
//! Protocol version: `2024-11-05`.
//!
//! Reference: <https://modelcontextprotocol.io/>

mod client;
mod error;
mod manager;
mod tool;
mod types;

pub use client::McpClient;
pub use error::McpError;
pub use manager::{McpManager, McpServerStatus};
pub use tool::McpTool;
pub use types::{McpServerInfo, McpToolDef};

/// The protocol version this client negotiates.
pub const PROTOCOL_VERSION: &str = "2024-11-05";
