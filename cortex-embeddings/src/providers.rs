//! HTTP embedding providers.

use async_trait::async_trait;

use crate::{Embedder, EmbeddingError};

/// Embeddings via the local Ollama API.
///
/// POSTs to `{base_url}/api/embeddings` with `{model, prompt}` and reads
/// the `embedding` array from the response.
pub struct OllamaEmbeddings {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaEmbeddings {
    /// Create a client for the given server URL and model.
    #[must_use]
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            client: reqwest::Client::new(),
        }
    }

    fn embeddings_url(&self) -> String {
        format!("{}/api/embeddings", self.base_url)
    }
}

#[async_trait]
impl Embedder for OllamaEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let url = self.embeddings_url();
        let body = serde_json::json!({
            "model": self.model,
            "prompt": text,
        });

        tracing::debug!(url = %url, model = %self.model, "sending embedding request");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| EmbeddingError::Provider(format!("ollama request failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| EmbeddingError::Provider(format!("ollama read failed: {e}")))?;

        if !status.is_success() {
            return Err(EmbeddingError::Provider(format!(
                "ollama returned {status}: {text}"
            )));
        }

        let json: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| EmbeddingError::Provider(format!("invalid JSON response: {e}")))?;

        parse_vector(&json["embedding"])
    }
}

/// Embeddings via the Voyage AI API.
///
/// POSTs to `https://api.voyageai.com/v1/embeddings` with Bearer auth and
/// `{input: [text], model}`, reading `data[0].embedding`.
pub struct VoyageEmbeddings {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

/// Default Voyage model used for quality-critical fallback embeddings.
const DEFAULT_VOYAGE_MODEL: &str = "voyage-3-large";

const VOYAGE_BASE_URL: &str = "https://api.voyageai.com";

impl VoyageEmbeddings {
    /// Create a client with the given API key and the default model.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_VOYAGE_MODEL.into(),
            base_url: VOYAGE_BASE_URL.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Override the model.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Override the API base URL (for testing or proxies).
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn embeddings_url(&self) -> String {
        format!("{}/v1/embeddings", self.base_url)
    }
}

#[async_trait]
impl Embedder for VoyageEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let url = self.embeddings_url();
        let body = serde_json::json!({
            "input": [text],
            "model": self.model,
        });

        tracing::debug!(url = %url, model = %self.model, "sending embedding request");

        let response = self
            .client
            .post(&url)
            .header("authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| EmbeddingError::Provider(format!("voyage request failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| EmbeddingError::Provider(format!("voyage read failed: {e}")))?;

        if !status.is_success() {
            return Err(EmbeddingError::Provider(format!(
                "voyage returned {status}: {text}"
            )));
        }

        let json: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| EmbeddingError::Provider(format!("invalid JSON response: {e}")))?;

        parse_vector(&json["data"][0]["embedding"])
    }
}

/// Parse a JSON number array into an f32 vector.
fn parse_vector(value: &serde_json::Value) -> Result<Vec<f32>, EmbeddingError> {
    value
        .as_array()
        .ok_or_else(|| EmbeddingError::Provider("missing embedding array".into()))?
        .iter()
        .map(|v| {
            v.as_f64().map(|f| f as f32).ok_or_else(|| {
                EmbeddingError::Provider("non-numeric value in embedding".into())
            })
        })
        .collect()
}
