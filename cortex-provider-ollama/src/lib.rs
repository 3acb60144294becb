#![deny(missing_docs)]
//! Ollama adapter for local models.
//!
//! Talks to the `/api/chat` endpoint of a local Ollama server. Unlike the
//! cloud backends, responses stream as newline-delimited JSON and no
//! credential is required.
//!
//! Reference: <https://github.com/ollama/ollama/blob/main/docs/api.md#generate-a-chat-completion>

mod mapping;
mod streaming;

use async_trait::async_trait;
use cortex_types::{AdapterError, ChatRequest, ChunkStream, LlmAdapter};

use crate::mapping::to_api_request;
use crate::streaming::stream_completion;

/// Client for a local Ollama server.
pub struct Ollama {
    pub(crate) base_url: String,
    pub(crate) model: String,
    pub(crate) client: reqwest::Client,
}

impl Ollama {
    /// Create a client for the given server URL and model.
    #[must_use]
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            client: reqwest::Client::new(),
        }
    }

    pub(crate) fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }
}

#[async_trait]
impl LlmAdapter for Ollama {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn stream(&self, request: ChatRequest) -> Result<ChunkStream, AdapterError> {
        let url = self.chat_url();
        let body = to_api_request(&request, &self.model);

        tracing::debug!(url = %url, model = %self.model, "sending streaming completion request");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AdapterError::RequestFailed(format!("ollama request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(AdapterError::RequestFailed(format!(
                "ollama returned {status}: {body_text}"
            )));
        }

        Ok(stream_completion(response))
    }
}
