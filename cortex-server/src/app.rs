//! The axum application: the streaming message endpoint and health
//! checks. Everything else (agent/conversation/memory CRUD) lives in
//! separate services.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use cortex_runtime::Runtime;
use cortex_store::Store;
use cortex_types::{Backend, Chunk, TokenUsage};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;

/// Build the API router.
pub fn router(runtime: Arc<Runtime>) -> Router {
    Router::new()
        .route("/conversations/{id}/messages", post(send_message))
        .route("/health", get(health))
        .route("/health/llm", get(health_llm))
        .with_state(runtime)
}

#[derive(Debug, Deserialize)]
struct MessageRequest {
    content: String,
    #[serde(default = "default_stream")]
    stream: bool,
}

fn default_stream() -> bool {
    true
}

/// `POST /conversations/{id}/messages` — run one turn.
///
/// With `stream: true` the response is Server-Sent Events: each chunk
/// becomes one event whose name is the chunk type and whose data is the
/// chunk JSON. With `stream: false` the chunks are collected server-side
/// into `{content, tool_calls, usage}`.
async fn send_message(
    State(runtime): State<Arc<Runtime>>,
    Path(conversation_id): Path<String>,
    Json(body): Json<MessageRequest>,
) -> Response {
    let stream = runtime
        .orchestrator
        .process_message(&conversation_id, &body.content);

    if body.stream {
        let events = stream.receiver.map(|chunk| {
            Ok::<_, Infallible>(
                Event::default()
                    .event(chunk.kind())
                    .data(serde_json::to_string(&chunk).unwrap_or_else(|_| "{}".into())),
            )
        });
        return Sse::new(events).keep_alive(KeepAlive::default()).into_response();
    }

    let mut receiver = stream.receiver;
    let mut content = String::new();
    let mut tool_calls = Vec::new();
    let mut usage = TokenUsage::default();
    let mut error: Option<String> = None;

    while let Some(chunk) = receiver.next().await {
        match chunk {
            Chunk::Text { content: text } => content.push_str(&text),
            Chunk::ToolCall { tool_call } => tool_calls.push(tool_call),
            Chunk::Done { usage: turn_usage } => usage = turn_usage,
            Chunk::Error { error: message } => error = Some(message),
        }
    }

    if let Some(error) = error
        && content.is_empty()
    {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": error})),
        )
            .into_response();
    }

    Json(json!({
        "content": content,
        "tool_calls": tool_calls,
        "usage": usage,
    }))
    .into_response()
}

/// `GET /health` — overall status plus a DB ping. Causes no state change.
async fn health(State(runtime): State<Arc<Runtime>>) -> Response {
    let (status, database) = match runtime.store.ping().await {
        Ok(()) => ("healthy", "connected".to_string()),
        Err(e) => ("unhealthy", format!("error: {e}")),
    };

    Json(json!({
        "status": status,
        "version": env!("CARGO_PKG_VERSION"),
        "database": database,
        "timestamp": Utc::now(),
    }))
    .into_response()
}

/// `GET /health/llm` — per-backend availability.
async fn health_llm(State(runtime): State<Arc<Runtime>>) -> Response {
    let statuses: Vec<_> = Backend::ALL
        .iter()
        .map(|&backend| {
            let (available, reason) = runtime.llm.is_available(backend);
            json!({
                "backend": backend,
                "available": available,
                "reason": reason,
            })
        })
        .collect();
    Json(statuses).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use cortex_runtime::RuntimeConfig;
    use cortex_store::InMemoryStore;
    use http_body_util::BodyExt;
    use tower::util::ServiceExt;

    fn test_app() -> Router {
        let runtime = Arc::new(Runtime::new(
            Arc::new(InMemoryStore::new()),
            RuntimeConfig::default(),
        ));
        router(runtime)
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_connected_store() {
        let response = test_app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response.into_response()).await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["database"], "connected");
    }

    #[tokio::test]
    async fn health_llm_lists_all_backends() {
        let response = test_app()
            .oneshot(Request::get("/health/llm").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response.into_response()).await;
        let statuses = json.as_array().unwrap();
        assert_eq!(statuses.len(), 4);

        let ollama = statuses.iter().find(|s| s["backend"] == "ollama").unwrap();
        assert_eq!(ollama["available"], true);
        let anthropic = statuses
            .iter()
            .find(|s| s["backend"] == "anthropic")
            .unwrap();
        assert_eq!(anthropic["available"], false);
    }

    #[tokio::test]
    async fn non_streaming_unknown_conversation_is_500() {
        let request = Request::post("/conversations/missing/messages")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"content": "hi", "stream": false}"#))
            .unwrap();
        let response = test_app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let json = body_json(response.into_response()).await;
        assert_eq!(json["error"], "Conversation not found");
    }

    #[tokio::test]
    async fn streaming_unknown_conversation_emits_error_event() {
        let request = Request::post("/conversations/missing/messages")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"content": "hi", "stream": true}"#))
            .unwrap();
        let response = test_app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/event-stream"));

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("event: error"));
        assert!(text.contains("Conversation not found"));
    }
}
