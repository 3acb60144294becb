//! Request mapping to the chat-completions JSON format.

use cortex_types::{ChatRequest, Role};
use serde_json::{json, Value};

/// Build the chat-completions request body.
///
/// `role = tool` is first-class: the message keeps its role and carries
/// `tool_call_id` and (when known) the tool `name`.
pub(crate) fn to_api_request(request: &ChatRequest, model: &str) -> Value {
    let messages: Vec<Value> = request
        .messages
        .iter()
        .map(|message| match message.role {
            Role::Tool => {
                let mut msg = json!({
                    "role": "tool",
                    "content": message.content,
                    "tool_call_id": message.tool_call_id.clone().unwrap_or_default(),
                });
                if let Some(name) = &message.tool_name {
                    msg["name"] = Value::String(name.clone());
                }
                msg
            }
            role => json!({
                "role": role_name(role),
                "content": message.content,
            }),
        })
        .collect();

    let mut body = json!({
        "model": model,
        "messages": messages,
        "max_tokens": request.max_tokens,
        "temperature": request.temperature,
        "stream": true,
        "stream_options": {"include_usage": true},
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
