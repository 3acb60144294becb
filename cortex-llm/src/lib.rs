#![deny(missing_docs)]
//! LLM backend management.
//!
//! [`LlmManager`] owns one adapter per `(backend, model)` pair, built
//! lazily on first use and shared across requests. Cloud backends are
//! credential-gated at construction time; [`LlmManager::is_available`] is
//! the non-throwing probe used by the fallback logic and the health
//! endpoint.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use cortex_provider_anthropic::Anthropic;
use cortex_provider_ollama::Ollama;
use cortex_provider_openai::{OpenAi, OpenRouter};
use cortex_types::{Backend, LlmAdapter};
use thiserror::Error;
use tokio::sync::RwLock;

/// Something that yields an adapter for a `(backend, model)` pair.
///
/// [`LlmManager`] is the production implementation; tests substitute
/// scripted sources to drive the orchestrator's fallback logic.
#[async_trait]
pub trait AdapterSource: Send + Sync {
    /// Get or construct the adapter for `(backend, model)`.
    async fn adapter(
        &self,
        backend: Backend,
        model: &str,
    ) -> Result<Arc<dyn LlmAdapter>, ConfigError>;
}

/// Configuration errors from adapter construction.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The backend requires an API key that is not configured.
    #[error("{backend} API key not configured. Set the {env_var} environment variable.")]
    MissingCredential {
        /// The credential-gated backend.
        backend: Backend,
        /// The environment variable that would supply the key.
        env_var: &'static str,
    },
}

/// Credentials and endpoints for the recognized backends.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    /// Local Ollama server URL.
    pub ollama_url: String,
    /// Anthropic API key.
    pub anthropic_api_key: Option<String>,
    /// OpenAI API key.
    pub openai_api_key: Option<String>,
    /// OpenRouter API key.
    pub openrouter_api_key: Option<String>,
    /// OpenRouter `HTTP-Referer` attribution.
    pub openrouter_site_url: Option<String>,
    /// OpenRouter `X-Title` attribution.
    pub openrouter_site_name: Option<String>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            ollama_url: "http://localhost:11434".into(),
            anthropic_api_key: None,
            openai_api_key: None,
            openrouter_api_key: None,
            openrouter_site_url: None,
            openrouter_site_name: None,
        }
    }
}

/// Keyed cache of LLM adapters.
pub struct LlmManager {
    settings: LlmSettings,
    adapters: RwLock<HashMap<(Backend, String), Arc<dyn LlmAdapter>>>,
}

impl LlmManager {
    /// Create a manager over the given settings.
    pub fn new(settings: LlmSettings) -> Self {
        Self {
            settings,
            adapters: RwLock::new(HashMap::new()),
        }
    }

    /// Get or lazily construct the adapter for `(backend, model)`.
    ///
    /// Cloud backends fail with [`ConfigError::MissingCredential`] when
    /// their API key is absent; nothing is cached on failure.
    pub async fn get_adapter(
        &self,
        backend: Backend,
        model: &str,
    ) -> Result<Arc<dyn LlmAdapter>, ConfigError> {
        let key = (backend, model.to_string());

        if let Some(adapter) = self.adapters.read().await.get(&key) {
            return Ok(adapter.clone());
        }

        let adapter = self.build_adapter(backend, model)?;
        tracing::info!(backend = %backend, model, "created LLM adapter");

        let mut adapters = self.adapters.write().await;
        // A concurrent caller may have built the same adapter; keep the
        // first one so every request shares a single instance.
        Ok(adapters.entry(key).or_insert(adapter).clone())
    }

    /// Non-throwing availability probe: `(available, reason)`.
    pub fn is_available(&self, backend: Backend) -> (bool, String) {
        match backend {
            Backend::Ollama => (true, "Ollama is always available (local)".into()),
            Backend::Anthropic => probe_key(&self.settings.anthropic_api_key, "Anthropic"),
            Backend::OpenAi => probe_key(&self.settings.openai_api_key, "OpenAI"),
            Backend::OpenRouter => probe_key(&self.settings.openrouter_api_key, "OpenRouter"),
        }
    }

    fn build_adapter(
        &self,
        backend: Backend,
        model: &str,
    ) -> Result<Arc<dyn LlmAdapter>, ConfigError> {
        match backend {
            Backend::Ollama => Ok(Arc::new(Ollama::new(&self.settings.ollama_url, model))),
            Backend::Anthropic => {
                let api_key = require_key(&self.settings.anthropic_api_key, backend, "ANTHROPIC_API_KEY")?;
                Ok(Arc::new(Anthropic::new(api_key, model)))
            }
            Backend::OpenAi => {
                let api_key = require_key(&self.settings.openai_api_key, backend, "OPENAI_API_KEY")?;
                Ok(Arc::new(OpenAi::new(api_key, model)))
            }
            Backend::OpenRouter => {
                let api_key =
                    require_key(&self.settings.openrouter_api_key, backend, "OPENROUTER_API_KEY")?;
                let mut adapter = OpenRouter::new(api_key, model);
                if let Some(site_url) = &self.settings.openrouter_site_url {
                    adapter = adapter.site_url(site_url);
                }
                if let Some(site_name) = &self.settings.openrouter_site_name {
                    adapter = adapter.site_name(site_name);
                }
                Ok(Arc::new(adapter))
            }
        }
    }
}

#[async_trait]
impl AdapterSource for LlmManager {
    async fn adapter(
        &self,
        backend: Backend,
        model: &str,
    ) -> Result<Arc<dyn LlmAdapter>, ConfigError> {
        self.get_adapter(backend, model).await
    }
}

fn require_key(
    key: &Option<String>,
    backend: Backend,
    env_var: &'static str,
) -> Result<String, ConfigError> {
    match key {
        Some(key) if !key.is_empty() => Ok(key.clone()),
        _ => Err(ConfigError::MissingCredential { backend, env_var }),
    }
}

fn probe_key(key: &Option<String>, label: &str) -> (bool, String) {
    match key {
        Some(key) if !key.is_empty() => (true, format!("{label} API configured")),
        _ => (false, format!("{label} API key not configured")),
    }
}
