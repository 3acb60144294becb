//! The composition root.

use std::collections::HashSet;
use std::sync::Arc;

use cortex_embeddings::{Embedder, EmbeddingService, OllamaEmbeddings, VoyageEmbeddings};
use cortex_llm::{LlmManager, LlmSettings};
use cortex_memory::{LongTermMemory, MemoryExtractor, ShortTermMemory};
use cortex_store::Store;
use cortex_tool::builtin::{FilesystemTool, ShellTool, WebFetchTool};
use cortex_tool::{RegistryError, ToolKind, ToolRouter};
use cortex_mcp::McpManager;

use crate::context::ContextBuilder;
use crate::orchestrator::Orchestrator;

/// Configuration for building a [`Runtime`].
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// LLM backend credentials and endpoints.
    pub llm: LlmSettings,
    /// Embedding model served by the local provider.
    pub embedding_model: String,
    /// Embedding dimension `D`; every stored vector is `4 * D` bytes.
    pub embedding_dimension: usize,
    /// Optional Voyage AI key enabling the embedding fallback provider.
    pub voyage_api_key: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            llm: LlmSettings::default(),
            embedding_model: "qwen3-embedding:0.6b".into(),
            embedding_dimension: 1024,
            voyage_api_key: None,
        }
    }
}

/// The one value owning every collaborator: store handle, embedding
/// service, memory layers, LLM manager, tool router, and MCP manager.
/// Constructed once at startup and shared behind `Arc`s.
pub struct Runtime {
    /// The document store.
    pub store: Arc<dyn Store>,
    /// Embedding generation.
    pub embeddings: Arc<EmbeddingService>,
    /// Long-term memory over the store.
    pub long_term: Arc<LongTermMemory>,
    /// LLM adapter cache.
    pub llm: Arc<LlmManager>,
    /// The tool registry.
    pub tools: Arc<ToolRouter>,
    /// Remote tool servers.
    pub mcp: Arc<McpManager>,
    /// The pipeline.
    pub orchestrator: Arc<Orchestrator>,
}

impl Runtime {
    /// Wire a runtime over the given store.
    pub fn new(store: Arc<dyn Store>, config: RuntimeConfig) -> Self {
        let primary = Arc::new(OllamaEmbeddings::new(
            &config.llm.ollama_url,
            &config.embedding_model,
        ));
        let fallback = config
            .voyage_api_key
            .as_ref()
            .filter(|key| !key.is_empty())
            .map(|key| Arc::new(VoyageEmbeddings::new(key)) as Arc<dyn Embedder>);
        let embeddings = Arc::new(EmbeddingService::new(
            primary,
            fallback,
            config.embedding_dimension,
        ));

        let long_term = Arc::new(LongTermMemory::new(
            store.clone(),
            embeddings.clone(),
            config.embedding_model.clone(),
        ));
        let short_term = ShortTermMemory::new(store.clone());
        let context = Arc::new(ContextBuilder::new(short_term, long_term.clone()));
        let extractor = Arc::new(MemoryExtractor::new(store.clone(), long_term.clone()));

        let llm = Arc::new(LlmManager::new(config.llm));
        let tools = Arc::new(ToolRouter::new());
        let mcp = Arc::new(McpManager::new());

        let orchestrator = Arc::new(Orchestrator::new(
            store.clone(),
            context,
            llm.clone(),
            Some(tools.clone()),
            Some(extractor),
        ));

        Self {
            store,
            embeddings,
            long_term,
            llm,
            tools,
            mcp,
            orchestrator,
        }
    }

    /// Register the built-in filesystem, shell, and web-fetch tools.
    pub fn register_builtin_tools(&self) -> Result<(), RegistryError> {
        self.tools.register(Arc::new(FilesystemTool::new()))?;
        self.tools.register(Arc::new(ShellTool::new()))?;
        self.tools.register(Arc::new(WebFetchTool::new()))?;
        Ok(())
    }

    /// Reconcile the router's remote-tool surface with the connected MCP
    /// servers: register newly advertised tools (a name collision is a
    /// soft conflict, logged and skipped) and evict remote tools that are
    /// no longer advertised. Returns `(added, removed)`.
    pub async fn sync_mcp_tools(&self) -> (usize, usize) {
        let remote = self.mcp.all_tools().await;
        let remote_names: HashSet<String> =
            remote.iter().map(|t| t.name().to_string()).collect();

        let mut removed = 0;
        for tool in self.tools.list(Some(ToolKind::Mcp)) {
            if !remote_names.contains(tool.name()) && self.tools.unregister(tool.name()) {
                removed += 1;
            }
        }

        let mut added = 0;
        for tool in remote {
            match self.tools.register(tool) {
                Ok(()) => added += 1,
                Err(RegistryError::DuplicateTool(name)) => {
                    tracing::debug!(tool = %name, "remote tool already registered, skipping");
                }
                Err(_) => {}
            }
        }
        (added, removed)
    }

    /// Shut down remote tool servers. Call on process exit.
    pub async fn shutdown(&self) {
        self.mcp.shutdown_all().await;
    }
}
