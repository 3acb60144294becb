#![deny(missing_docs)]
//! OpenAI chat-completions adapter, plus the OpenRouter variant.
//!
//! Both backends speak the same wire format: `role = tool` is a
//! first-class message carrying `tool_call_id`, tool-call arguments stream
//! as JSON fragments indexed per call, and usage arrives in a trailing
//! chunk when `stream_options.include_usage` is set. OpenRouter differs
//! only in base URL and two optional attribution headers.
//!
//! Reference: <https://platform.openai.com/docs/api-reference/chat/streaming>

mod mapping;
mod streaming;

use async_trait::async_trait;
use cortex_types::{AdapterError, ChatRequest, ChunkStream, LlmAdapter};

use crate::mapping::to_api_request;
use crate::streaming::stream_completion;

/// Default OpenAI API base URL (includes the version segment).
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenRouter API base URL.
const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Client for the OpenAI chat completions API.
pub struct OpenAi {
    pub(crate) api_key: String,
    pub(crate) model: String,
    pub(crate) base_url: String,
    pub(crate) client: reqwest::Client,
}

impl OpenAi {
    /// Create a client for the given API key and model.
    #[must_use]
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: OPENAI_BASE_URL.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Override the API base URL (for testing or proxies).
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub(crate) fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl LlmAdapter for OpenAi {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn stream(&self, request: ChatRequest) -> Result<ChunkStream, AdapterError> {
        let body = to_api_request(&request, &self.model);
        let builder = self
            .client
            .post(self.chat_url())
            .header("authorization", format!("Bearer {}", self.api_key));
        send_streaming(builder, &self.chat_url(), body).await
    }
}

/// Client for the OpenRouter aggregator.
///
/// OpenRouter is OpenAI-compatible; the optional `HTTP-Referer` and
/// `X-Title` headers attribute traffic to a site.
pub struct OpenRouter {
    pub(crate) api_key: String,
    pub(crate) model: String,
    pub(crate) base_url: String,
    pub(crate) site_url: Option<String>,
    pub(crate) site_name: Option<String>,
    pub(crate) client: reqwest::Client,
}

impl OpenRouter {
    /// Create a client for the given API key and model.
    #[must_use]
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: OPENROUTER_BASE_URL.into(),
            site_url: None,
            site_name: None,
            client: reqwest::Client::new(),
        }
    }

    /// Override the API base URL (for testing or proxies).
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the `HTTP-Referer` attribution header.
    #[must_use]
    pub fn site_url(mut self, url: impl Into<String>) -> Self {
        self.site_url = Some(url.into());
        self
    }

    /// Set the `X-Title` attribution header.
    #[must_use]
    pub fn site_name(mut self, name: impl Into<String>) -> Self {
        self.site_name = Some(name.into());
        self
    }

    pub(crate) fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl LlmAdapter for OpenRouter {
    fn name(&self) -> &'static str {
        "openrouter"
    }

    async fn stream(&self, request: ChatRequest) -> Result<ChunkStream, AdapterError> {
        let body = to_api_request(&request, &self.model);
        let mut builder = self
            .client
            .post(self.chat_url())
            .header("authorization", format!("Bearer {}", self.api_key));
        if let Some(site_url) = &self.site_url {
            builder = builder.header("HTTP-Referer", site_url);
        }
        if let Some(site_name) = &self.site_name {
            builder = builder.header("X-Title", site_name);
        }
        send_streaming(builder, &self.chat_url(), body).await
    }
}

/// Send a streaming chat-completions request and wrap the SSE body.
async fn send_streaming(
    builder: reqwest::RequestBuilder,
    url: &str,
    body: serde_json::Value,
) -> Result<ChunkStream, AdapterError> {
    tracing::debug!(url = %url, model = %body["model"], "sending streaming completion request");

    let response = builder
        .header("content-type", "application/json")
        .json(&body)
        .send()
        .await
        .map_err(|e| AdapterError::RequestFailed(format!("request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        return Err(map_http_status(status, &body_text));
    }

    Ok(stream_completion(response))
}

/// Map an HTTP status code to an [`AdapterError`].
fn map_http_status(status: reqwest::StatusCode, body: &str) -> AdapterError {
    match status.as_u16() {
        401 | 403 => AdapterError::AuthFailed(body.to_string()),
        _ => AdapterError::RequestFailed(format!("backend returned {status}: {body}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openai_default_url() {
        let adapter = OpenAi::new("sk-test", "gpt-4o");
        assert_eq!(adapter.chat_url(), "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn openai_base_url_override() {
        let adapter = OpenAi::new("sk-test", "gpt-4o").base_url("http://localhost:9999/v1");
        assert_eq!(adapter.chat_url(), "http://localhost:9999/v1/chat/completions");
    }

    #[test]
    fn openrouter_default_url() {
        let adapter = OpenRouter::new("sk-or-test", "meta-llama/llama-3.3-70b");
        assert_eq!(
            adapter.chat_url(),
            "https://openrouter.ai/api/v1/chat/completions"
        );
    }

    #[test]
    fn openrouter_attribution_builders() {
        let adapter = OpenRouter::new("sk-or-test", "m")
            .site_url("https://example.com")
            .site_name("Example");
        assert_eq!(adapter.site_url.as_deref(), Some("https://example.com"));
        assert_eq!(adapter.site_name.as_deref(), Some("Example"));
    }

    #[test]
    fn adapter_names() {
        assert_eq!(OpenAi::new("k", "m").name(), "openai");
        assert_eq!(OpenRouter::new("k", "m").name(), "openrouter");
    }

    #[test]
    fn map_403_to_auth_failed() {
        assert!(matches!(
            map_http_status(reqwest::StatusCode::FORBIDDEN, "no"),
            AdapterError::AuthFailed(_)
        ));
    }
}
