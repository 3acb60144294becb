//! Adapter from a remote tool definition to the common [`Tool`] trait.

use std::sync::Arc;

use async_trait::async_trait;
use cortex_tool::{Arguments, Tool, ToolKind, ToolParameter, ToolResult};
use serde_json::Value;

use crate::client::McpClient;
use crate::error::McpError;
use crate::types::McpToolDef;

/// A remote tool, callable through the router like any built-in.
pub struct McpTool {
    client: Arc<McpClient>,
    def: McpToolDef,
    parameters: Vec<ToolParameter>,
}

impl McpTool {
    /// Wrap a tool definition from the given client.
    #[must_use]
    pub fn new(client: Arc<McpClient>, def: McpToolDef) -> Self {
        let parameters = parse_parameters(&def.input_schema);
        Self {
            client,
            def,
            parameters,
        }
    }
}

#[async_trait]
impl Tool for McpTool {
    fn name(&self) -> &str {
        &self.def.name
    }

    fn description(&self) -> &str {
        &self.def.description
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Mcp
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        self.parameters.clone()
    }

    async fn execute(&self, arguments: Arguments) -> ToolResult {
        let result = self
            .client
            .call_tool(&self.def.name, Value::Object(arguments))
            .await;

        match result {
            Ok(result) => {
                let output = flatten_content(&result);
                let is_error = result["isError"].as_bool().unwrap_or(false);
                let mut tool_result = if is_error {
                    let mut r = ToolResult::error(self.name(), "MCP tool reported error");
                    r.output = Some(output);
                    r
                } else {
                    ToolResult::success(self.name(), output)
                };
                tool_result = tool_result.with_metadata("mcp_result", result);
                tool_result
            }
            Err(e @ McpError::Timeout { .. }) => ToolResult::error(self.name(), e.to_string()),
            Err(e) => {
                ToolResult::error(self.name(), format!("MCP tool execution failed: {e}"))
            }
        }
    }
}

/// Flatten an MCP `content` array to a single text output; non-text
/// results pass through as raw JSON.
fn flatten_content(result: &Value) -> Value {
    let Some(content) = result["content"].as_array() else {
        return result.clone();
    };
    let texts: Vec<&str> = content
        .iter()
        .filter(|item| item["type"] == "text")
        .filter_map(|item| item["text"].as_str())
        .collect();
    if texts.is_empty() {
        result.clone()
    } else {
        Value::String(texts.join("\n"))
    }
}

/// Parse a JSON-schema input description into parameter descriptors.
fn parse_parameters(schema: &Value) -> Vec<ToolParameter> {
    if schema["type"] != "object" {
        return Vec::new();
    }
    let required: Vec<&str> = schema["required"]
        .as_array()
        .map(|a| a.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();

    let Some(properties) = schema["properties"].as_object() else {
        return Vec::new();
    };

    let mut parameters: Vec<ToolParameter> = properties
        .iter()
        .map(|(name, prop)| {
            let mut param = ToolParameter::new(
                name,
                prop["type"].as_str().unwrap_or("string"),
                prop["description"].as_str().unwrap_or_default(),
            )
            .required(required.contains(&name.as_str()));
            if let Some(values) = prop["enum"].as_array() {
                param = param.enum_values(values.clone());
            }
            if let Some(default) = prop.get("default") {
                param = param.default_value(default.clone());
            }
            if !prop["items"].is_null() {
                param.items = Some(prop["items"].clone());
            }
            if !prop["properties"].is_null() {
                param.properties = Some(prop["properties"].clone());
            }
            param
        })
        .collect();
    parameters.sort_by(|a, b| a.name.cmp(&b.name));
    parameters
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_parameters_extracts_required_and_types() {
        let schema = json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Search query"},
                "limit": {"type": "number", "description": "Max results", "default": 10},
            },
            "required": ["query"],
        });
        let params = parse_parameters(&schema);
        assert_eq!(params.len(), 2);

        let query = params.iter().find(|p| p.name == "query").unwrap();
        assert!(query.required);
        assert_eq!(query.param_type, "string");

        let limit = params.iter().find(|p| p.name == "limit").unwrap();
        assert!(!limit.required);
        assert_eq!(limit.default, Some(json!(10)));
    }

    #[test]
    fn non_object_schema_has_no_parameters() {
        assert!(parse_parameters(&json!({"type": "string"})).is_empty());
        assert!(parse_parameters(&json!(null)).is_empty());
    }

    #[test]
    fn flatten_content_joins_text_items() {
        let result = json!({
            "content": [
                {"type": "text", "text": "line one"},
                {"type": "image", "data": "..."},
                {"type": "text", "text": "line two"},
            ],
        });
        assert_eq!(flatten_content(&result), json!("line one\nline two"));
    }

    #[test]
    fn flatten_content_passes_through_non_text_results() {
        let result = json!({"content": [{"type": "image", "data": "..."}]});
        assert_eq!(flatten_content(&result), result);

        let result = json!({"value": 42});
        assert_eq!(flatten_content(&result), result);
    }
}
