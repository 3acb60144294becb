//! Request mapping to the Messages API JSON format.

use cortex_types::{ChatRequest, Role};
use serde_json::{json, Value};

/// Build the Messages API request body.
///
/// The system prompt travels in the top-level `system` field (the last
/// system message wins). Tool results become `tool_result` content blocks
/// on user turns, referenced by the originating `tool_use` id.
pub(crate) fn to_api_request(request: &ChatRequest, model: &str) -> Value {
    let mut system: Option<String> = None;
    let mut messages: Vec<Value> = Vec::new();

    for message in &request.messages {
        match message.role {
            Role::System => system = Some(message.content.clone()),
            Role::Tool => messages.push(json!({
                "role": "user",
                "content": [{
                    "type": "tool_result",
                    "tool_use_id": message.tool_call_id.clone().unwrap_or_default(),
                    "content": message.content,
                }],
            })),
            Role::User | Role::Assistant => messages.push(json!({
                "role": if message.role == Role::User { "user" } else { "assistant" },
                "content": message.content,
            })),
        }
    }

    let mut body = json!({
        "model": model,
        "messages": messages,
        "max_tokens": request.max_tokens,
        "temperature": request.temperature,
    });

    if let Some(system) = system {
        body["system"] = Value::String(system);
    }

    if !request.tools.is_empty() {
        body["tools"] = Value::Array(
            request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.parameters,
                    })
                })
                .collect(),
        );
    }

    body
}
