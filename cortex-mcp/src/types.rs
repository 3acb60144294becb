//! Types for MCP integration.

use serde::{Deserialize, Serialize};

/// Identity and capabilities a server reports during the handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerInfo {
    /// Server name from `serverInfo.name`.
    pub name: String,
    /// Server version from `serverInfo.version`.
    pub version: String,
    /// Negotiated protocol version.
    pub protocol_version: String,
    /// Capabilities the server advertised.
    pub capabilities: serde_json::Value,
}

/// A tool definition advertised by a server via `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpToolDef {
    /// Tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// JSON Schema for the tool's input.
    #[serde(default, rename = "inputSchema")]
    pub input_schema: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_def_parses_input_schema_field() {
        let def: McpToolDef = serde_json::from_value(serde_json::json!({
            "name": "ping",
            "description": "Ping the server",
            "inputSchema": {"type": "object", "properties": {}}
        }))
        .unwrap();
        assert_eq!(def.name, "ping");
        assert_eq!(def.input_schema["type"], "object");
    }

    #[test]
    fn tool_def_tolerates_missing_optionals() {
        let def: McpToolDef = serde_json::from_value(serde_json::json!({"name": "bare"})).unwrap();
        assert!(def.description.is_empty());
        assert!(def.input_schema.is_null());
    }
}
