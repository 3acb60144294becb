//! Request mapping to the Ollama chat format.

use cortex_types::{ChatRequest, Role};
use serde_json::{json, Value};

/// Build the `/api/chat` request body.
///
/// Sampling goes through `options` (`num_predict` is Ollama's output
/// token limit). Tool results keep `role = tool` with their call id.
pub(crate) fn to_api_request(request: &ChatRequest, model: &str) -> Value {
    let messages: Vec<Value> = request
        .messages
        .iter()
        .map(|message| {
            let mut msg = json!({
                "role": role_name(message.role),
                "content": message.content,
            });
            if let Some(tool_call_id) = &message.tool_call_id {
                msg["tool_call_id"] = Value::String(tool_call_id.clone());
            }
            msg
        })
        .collect();

    let mut body = json!({
        "model": model,
        "messages": messages,
        "stream": true,
        "options": {
            "temperature": request.temperature,
            "num_predict": request.max_tokens,
        },
    });

    if !request.tools.is_empty() {
        body["tools"] = Value::Array(
            request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        },
                    })
                })
                .collect(),
        );
    }

    body
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}
