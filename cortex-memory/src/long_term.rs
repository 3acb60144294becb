//! Long-term memory store with hybrid search.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use cortex_embeddings::{EmbeddingError, EmbeddingService};
use cortex_store::{MemoryFilter, MemoryPatch, MemoryStore, StoreError};
use cortex_types::embedding::vector_to_binary;
use cortex_types::{ContentType, MemoryDoc, MemorySource, MemoryStatus};
use thiserror::Error;
use uuid::Uuid;

/// RRF constant `k`: each list contributes `1 / (k + rank)` per document,
/// with 1-based ranks.
pub const RRF_K: u64 = 60;

/// Errors from long-term memory operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum MemoryError {
    /// The underlying store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Embedding generation failed.
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
}

/// Public field updates for a memory.
///
/// Changing `content` regenerates the embedding; the new embedding and its
/// model tag travel in the same store patch as the content, so no reader
/// can observe content with a stale embedding.
#[derive(Debug, Clone, Default)]
pub struct MemoryUpdate {
    /// New memory text.
    pub content: Option<String>,
    /// New content type.
    pub content_type: Option<ContentType>,
    /// New category tags.
    pub categories: Option<Vec<String>>,
    /// New importance.
    pub importance: Option<f64>,
    /// New confidence (`Some(None)` clears it).
    pub confidence: Option<Option<f64>>,
    /// New verified flag.
    pub verified: Option<bool>,
}

/// Semantic retrieval over the memories collection using hybrid vector +
/// lexical search fused with reciprocal rank fusion.
pub struct LongTermMemory {
    store: Arc<dyn MemoryStore>,
    embeddings: Arc<EmbeddingService>,
    embedding_model: String,
}

impl LongTermMemory {
    /// Create a long-term memory over the given store and embedding
    /// service. `embedding_model` tags every stored vector.
    pub fn new(
        store: Arc<dyn MemoryStore>,
        embeddings: Arc<EmbeddingService>,
        embedding_model: impl Into<String>,
    ) -> Self {
        Self {
            store,
            embeddings,
            embedding_model: embedding_model.into(),
        }
    }

    /// Create a new memory with a freshly generated embedding. Returns the
    /// new document id.
    pub async fn create(
        &self,
        content: impl Into<String>,
        content_type: ContentType,
        categories: Vec<String>,
        importance: f64,
        confidence: Option<f64>,
        source: MemorySource,
    ) -> Result<String, MemoryError> {
        let content = content.into();
        let vector = self.embeddings.embed(&content).await?;
        let now = Utc::now();
        let doc = MemoryDoc {
            id: Uuid::new_v4().to_string(),
            content,
            content_type,
            categories,
            importance,
            confidence,
            verified: false,
            status: MemoryStatus::Active,
            embedding: vector_to_binary(&vector),
            embedding_model: self.embedding_model.clone(),
            source,
            created_at: now,
            updated_at: now,
            last_accessed_at: now,
            access_count: 0,
        };
        let id = doc.id.clone();
        self.store.insert_memory(doc).await?;
        Ok(id)
    }

    /// Update a memory. Returns whether a document was modified.
    pub async fn update(&self, id: &str, update: MemoryUpdate) -> Result<bool, MemoryError> {
        let mut patch = MemoryPatch {
            content_type: update.content_type,
            categories: update.categories,
            importance: update.importance,
            confidence: update.confidence,
            verified: update.verified,
            ..Default::default()
        };

        if let Some(content) = update.content {
            let vector = self.embeddings.embed(&content).await?;
            patch.embedding = Some(vector_to_binary(&vector));
            patch.embedding_model = Some(self.embedding_model.clone());
            patch.content = Some(content);
        }

        Ok(self.store.patch_memory(id, patch).await?)
    }

    /// Soft-delete a memory. Returns whether a document was modified.
    pub async fn soft_delete(&self, id: &str) -> Result<bool, MemoryError> {
        Ok(self.store.soft_delete_memory(id).await?)
    }

    /// Bump a memory's access counter.
    pub async fn increment_access(&self, id: &str) -> Result<(), MemoryError> {
        Ok(self.store.increment_access(id).await?)
    }

    /// Fetch a memory by id, regardless of status.
    pub async fn get(&self, id: &str) -> Result<Option<MemoryDoc>, MemoryError> {
        Ok(self.store.memory(id).await?)
    }

    /// Hybrid search: vector and lexical lanes run concurrently over
    /// `2 * limit` candidates each, then reciprocal rank fusion picks the
    /// top `limit`. A failed lane degrades to the other lane's ranking.
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        filter: &MemoryFilter,
    ) -> Result<Vec<MemoryDoc>, MemoryError> {
        let query_vector = self.embeddings.embed(query).await?;
        let candidates = limit * 2;

        let (vector_results, lexical_results) = tokio::join!(
            self.store.vector_search(&query_vector, filter, candidates),
            self.store.text_search(query, filter, candidates),
        );

        let vector_results = vector_results.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "vector search failed, degrading to lexical only");
            Vec::new()
        });
        let lexical_results = lexical_results.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "lexical search failed, degrading to vector only");
            Vec::new()
        });

        let mut fused = rrf_fusion(vector_results, lexical_results, RRF_K);
        fused.truncate(limit);
        Ok(fused)
    }
}

/// Reciprocal rank fusion over two ranked lists.
///
/// Each document scores `Σ 1 / (k + rank)` over the lists it appears in,
/// ranks 1-based. Ties keep first-appearance order (vector list first),
/// making the output a strict function of the input rankings.
fn rrf_fusion(
    vector_results: Vec<(MemoryDoc, f64)>,
    lexical_results: Vec<(MemoryDoc, f64)>,
    k: u64,
) -> Vec<MemoryDoc> {
    let mut order: Vec<String> = Vec::new();
    let mut entries: HashMap<String, (MemoryDoc, f64)> = HashMap::new();

    for list in [vector_results, lexical_results] {
        for (rank, (doc, _)) in list.into_iter().enumerate() {
            let contribution = 1.0 / (k as f64 + rank as f64 + 1.0);
            match entries.get_mut(&doc.id) {
                Some((_, score)) => *score += contribution,
                None => {
                    order.push(doc.id.clone());
                    entries.insert(doc.id.clone(), (doc, contribution));
                }
            }
        }
    }

    let mut fused: Vec<(MemoryDoc, f64)> = order
        .into_iter()
        .filter_map(|id| entries.remove(&id))
        .collect();
    // Stable sort: equal scores keep first-appearance order.
    fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    fused.into_iter().map(|(doc, _)| doc).collect()
}
