//! Tool definitions, schemas, and execution results.

use chrono::{DateTime, Utc};
use cortex_types::ToolSpec;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::Arguments;

/// Parameter descriptor for a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameter {
    /// Parameter name.
    pub name: String,
    /// JSON Schema type: `string`, `number`, `boolean`, `object`, `array`.
    pub param_type: String,
    /// Human-readable description.
    pub description: String,
    /// Whether the parameter must be present.
    pub required: bool,
    /// Default value advertised in the schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Enumerated allowed values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
    /// Item schema for array parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Value>,
    /// Property schemas for object parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Value>,
}

impl ToolParameter {
    /// Create a parameter with the given name, type, and description.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        param_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            description: description.into(),
            required: false,
            default: None,
            enum_values: None,
            items: None,
            properties: None,
        }
    }

    /// Mark the parameter required (or not).
    #[must_use]
    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Restrict the parameter to an enumerated set of values.
    #[must_use]
    pub fn enum_values(mut self, values: Vec<Value>) -> Self {
        self.enum_values = Some(values);
        self
    }

    /// Advertise a default value.
    #[must_use]
    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }
}

/// A complete tool definition for LLM consumption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Accepted parameters.
    pub parameters: Vec<ToolParameter>,
}

impl ToolDefinition {
    /// Render the parameters as a JSON Schema object.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();

        for param in &self.parameters {
            let mut schema = json!({
                "type": param.param_type,
                "description": param.description,
            });
            if let Some(values) = &param.enum_values {
                schema["enum"] = Value::Array(values.clone());
            }
            if let Some(items) = &param.items {
                schema["items"] = items.clone();
            }
            if let Some(props) = &param.properties {
                schema["properties"] = props.clone();
            }
            if let Some(default) = &param.default {
                schema["default"] = default.clone();
            }
            properties.insert(param.name.clone(), schema);
            if param.required {
                required.push(Value::String(param.name.clone()));
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Render as the adapter-facing tool spec.
    pub fn to_spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.to_json_schema(),
        }
    }

    /// Validate arguments: every required parameter present, no unknown
    /// parameters. The error message names the offending field.
    pub fn validate(&self, arguments: &Arguments) -> Result<(), String> {
        for param in &self.parameters {
            if param.required && !arguments.contains_key(&param.name) {
                return Err(format!("Missing required parameter: {}", param.name));
            }
        }
        for name in arguments.keys() {
            if !self.parameters.iter().any(|p| &p.name == name) {
                return Err(format!("Unknown parameter: {name}"));
            }
        }
        Ok(())
    }
}

/// Tool execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    /// Execution succeeded.
    Success,
    /// Execution failed.
    Error,
}

impl ToolStatus {
    /// The lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolStatus::Success => "success",
            ToolStatus::Error => "error",
        }
    }
}

/// Result of one tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Which tool ran.
    pub tool_name: String,
    /// Outcome.
    pub status: ToolStatus,
    /// Tool output on success (any JSON value).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Error message on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock duration in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Tool-specific metadata.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, Value>,
    /// When execution started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When execution finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ToolResult {
    /// A successful result with the given output.
    #[must_use]
    pub fn success(tool_name: impl Into<String>, output: Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            status: ToolStatus::Success,
            output: Some(output),
            error: None,
            duration_ms: None,
            metadata: serde_json::Map::new(),
            started_at: None,
            completed_at: None,
        }
    }

    /// A failed result with the given error message.
    #[must_use]
    pub fn error(tool_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            status: ToolStatus::Error,
            output: None,
            error: Some(error.into()),
            duration_ms: None,
            metadata: serde_json::Map::new(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Attach a metadata field.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Whether execution succeeded.
    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }

    /// Whether execution failed.
    pub fn is_error(&self) -> bool {
        self.status == ToolStatus::Error
    }

    /// The result as message content: the stringified output, or the
    /// error message.
    pub fn content_string(&self) -> String {
        match (&self.output, &self.error) {
            (Some(Value::String(s)), _) => s.clone(),
            (Some(value), _) => value.to_string(),
            (None, Some(error)) => error.clone(),
            (None, None) => String::new(),
        }
    }
}
