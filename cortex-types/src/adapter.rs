//! The adapter trait every LLM backend implements.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chat::ChatRequest;
use crate::stream::{drain, ChunkStream, Completion};

/// The recognized LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Local HTTP server (no credential required).
    Ollama,
    /// Anthropic Messages API.
    Anthropic,
    /// OpenAI chat completions API.
    OpenAi,
    /// OpenRouter aggregator (OpenAI-compatible).
    OpenRouter,
}

impl Backend {
    /// All recognized backends, in probe order.
    pub const ALL: [Backend; 4] = [
        Backend::Ollama,
        Backend::Anthropic,
        Backend::OpenAi,
        Backend::OpenRouter,
    ];

    /// The lowercase wire name of the backend.
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Ollama => "ollama",
            Backend::Anthropic => "anthropic",
            Backend::OpenAi => "openai",
            Backend::OpenRouter => "openrouter",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ollama" => Ok(Backend::Ollama),
            "anthropic" => Ok(Backend::Anthropic),
            "openai" => Ok(Backend::OpenAi),
            "openrouter" => Ok(Backend::OpenRouter),
            other => Err(format!(
                "unknown backend: {other} (supported: ollama, anthropic, openai, openrouter)"
            )),
        }
    }
}

/// Errors from LLM adapters.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum AdapterError {
    /// HTTP or network request failed before streaming began.
    #[error("request failed: {0}")]
    RequestFailed(String),

    /// Authentication or authorization failed.
    #[error("auth failed: {0}")]
    AuthFailed(String),

    /// The backend's response could not be parsed.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The stream terminated with an error chunk.
    #[error("stream error: {0}")]
    Stream(String),

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// An LLM backend driver.
///
/// Adapters are object-safe so the manager can cache them as
/// `Arc<dyn LlmAdapter>` keyed by `(backend, model)`. Implementations must
/// be safe for concurrent `stream` calls; each call owns its own HTTP
/// response body.
#[async_trait]
pub trait LlmAdapter: Send + Sync {
    /// The backend name, e.g. `"ollama"`.
    fn name(&self) -> &'static str;

    /// Stream a completion.
    ///
    /// Failures before the stream is established return `Err`; failures
    /// mid-stream arrive as a terminal [`Chunk::Error`](crate::Chunk::Error).
    async fn stream(&self, request: ChatRequest) -> Result<ChunkStream, AdapterError>;

    /// Non-streaming completion, emulated by draining [`Self::stream`].
    async fn complete(&self, request: ChatRequest) -> Result<Completion, AdapterError> {
        let stream = self.stream(request).await?;
        drain(stream).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{ChatMessage, Role, TokenUsage};
    use crate::stream::Chunk;

    #[test]
    fn backend_parse_roundtrip() {
        for backend in Backend::ALL {
            let parsed: Backend = backend.as_str().parse().unwrap();
            assert_eq!(parsed, backend);
        }
    }

    #[test]
    fn backend_parse_rejects_unknown() {
        let err = "llamacpp".parse::<Backend>().unwrap_err();
        assert!(err.contains("unknown backend"));
    }

    #[test]
    fn backend_serde_is_lowercase() {
        assert_eq!(
            serde_json::to_string(&Backend::OpenRouter).unwrap(),
            "\"openrouter\""
        );
        let back: Backend = serde_json::from_str("\"anthropic\"").unwrap();
        assert_eq!(back, Backend::Anthropic);
    }

    struct CannedAdapter;

    #[async_trait]
    impl LlmAdapter for CannedAdapter {
        fn name(&self) -> &'static str {
            "canned"
        }

        async fn stream(&self, _request: ChatRequest) -> Result<ChunkStream, AdapterError> {
            Ok(ChunkStream::from_chunks(vec![
                Chunk::text("hi"),
                Chunk::Done {
                    usage: TokenUsage {
                        input_tokens: 1,
                        output_tokens: 1,
                    },
                },
            ]))
        }
    }

    #[tokio::test]
    async fn complete_drains_the_stream() {
        let adapter = CannedAdapter;
        let request = ChatRequest::new(vec![ChatMessage::new(Role::User, "hi")]);
        let completion = adapter.complete(request).await.unwrap();
        assert_eq!(completion.content, "hi");
        assert_eq!(completion.usage.input_tokens, 1);
    }

    #[test]
    fn adapter_is_object_safe() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<std::sync::Arc<dyn LlmAdapter>>();
    }
}
