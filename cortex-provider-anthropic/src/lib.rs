#![deny(missing_docs)]
//! Anthropic Messages API adapter.
//!
//! The Messages API separates the system prompt from the dialog turns and
//! carries tool results as dedicated `tool_result` content blocks attached
//! to user turns. Streaming uses Server-Sent Events.
//!
//! Reference: <https://docs.anthropic.com/en/api/messages-streaming>

mod mapping;
mod streaming;

use async_trait::async_trait;
use cortex_types::{AdapterError, ChatRequest, ChunkStream, LlmAdapter};

use crate::mapping::to_api_request;
use crate::streaming::stream_completion;

/// Default Anthropic API base URL.
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

/// Anthropic API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Client for the Anthropic Messages API.
///
/// # Example
///
/// ```no_run
/// use cortex_provider_anthropic::Anthropic;
///
/// let adapter = Anthropic::new("sk-ant-...", "claude-sonnet-4-20250514");
/// ```
pub struct Anthropic {
    pub(crate) api_key: String,
    pub(crate) model: String,
    pub(crate) base_url: String,
    pub(crate) client: reqwest::Client,
}

impl Anthropic {
    /// Create a client for the given API key and model.
    #[must_use]
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Override the API base URL (for testing or proxies).
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub(crate) fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }
}

#[async_trait]
impl LlmAdapter for Anthropic {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    /// Send a streaming request to the Messages API and parse the SSE
    /// response into chunks.
    async fn stream(&self, request: ChatRequest) -> Result<ChunkStream, AdapterError> {
        let url = self.messages_url();
        let mut body = to_api_request(&request, &self.model);
        body["stream"] = serde_json::Value::Bool(true);

        tracing::debug!(url = %url, model = %body["model"], "sending streaming completion request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| AdapterError::RequestFailed(format!("anthropic request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(map_http_status(status, &body_text));
        }

        Ok(stream_completion(response))
    }
}

/// Map an HTTP status code from the Messages API to an [`AdapterError`].
fn map_http_status(status: reqwest::StatusCode, body: &str) -> AdapterError {
    match status.as_u16() {
        401 | 403 => AdapterError::AuthFailed(body.to_string()),
        _ => AdapterError::RequestFailed(format!("anthropic returned {status}: {body}")),
    }
}
