//! Process configuration from environment variables.
//!
//! Every key has a default except the cloud credentials.

use cortex_llm::LlmSettings;
use cortex_runtime::RuntimeConfig;

/// Application settings loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Document database URI (consumed by pluggable store backends).
    pub db_uri: String,
    /// Document database name.
    pub db_name: String,
    /// Local Ollama server URL.
    pub ollama_url: String,
    /// Anthropic API key.
    pub anthropic_api_key: Option<String>,
    /// OpenAI API key.
    pub openai_api_key: Option<String>,
    /// OpenRouter API key.
    pub openrouter_api_key: Option<String>,
    /// Embedding model name on the primary provider.
    pub embedding_model: String,
    /// Embedding dimension D.
    pub embedding_dimension: usize,
    /// Voyage AI key for the embedding fallback.
    pub voyage_api_key: Option<String>,
    /// API bind host.
    pub api_host: String,
    /// API bind port.
    pub api_port: u16,
    /// Verbose logging.
    pub debug: bool,
}

impl Config {
    /// Load configuration from the environment.
    pub fn from_env() -> Self {
        Self {
            db_uri: var_or("CORTEX_DB_URI", "mongodb://localhost:27017"),
            db_name: var_or("CORTEX_DB_NAME", "cortex"),
            ollama_url: var_or("OLLAMA_URL", "http://localhost:11434"),
            anthropic_api_key: var_opt("ANTHROPIC_API_KEY"),
            openai_api_key: var_opt("OPENAI_API_KEY"),
            openrouter_api_key: var_opt("OPENROUTER_API_KEY"),
            embedding_model: var_or("EMBEDDING_MODEL", "qwen3-embedding:0.6b"),
            embedding_dimension: var_or("EMBEDDING_DIMENSION", "1024")
                .parse()
                .unwrap_or(1024),
            voyage_api_key: var_opt("VOYAGE_API_KEY"),
            api_host: var_or("API_HOST", "0.0.0.0"),
            api_port: var_or("API_PORT", "8000").parse().unwrap_or(8000),
            debug: parse_bool(&var_or("DEBUG", "false")),
        }
    }

    /// The runtime-facing slice of this configuration.
    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            llm: LlmSettings {
                ollama_url: self.ollama_url.clone(),
                anthropic_api_key: self.anthropic_api_key.clone(),
                openai_api_key: self.openai_api_key.clone(),
                openrouter_api_key: self.openrouter_api_key.clone(),
                openrouter_site_url: None,
                openrouter_site_name: None,
            },
            embedding_model: self.embedding_model.clone(),
            embedding_dimension: self.embedding_dimension,
            voyage_api_key: self.voyage_api_key.clone(),
        }
    }
}

fn var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn var_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn parse_bool(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
