#![deny(missing_docs)]
//! Embedding generation for the cortex memory layer.
//!
//! [`EmbeddingService`] composes a primary provider (the local Ollama
//! embeddings endpoint) with an optional cloud fallback (Voyage AI). Every
//! vector is checked against the configured dimension `D` — a provider
//! returning the wrong dimension is a hard error, because stored
//! embeddings must all decode to the same length.

mod providers;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

pub use providers::{OllamaEmbeddings, VoyageEmbeddings};

/// Errors from embedding generation.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// A single provider call failed (network, HTTP status, or parse).
    #[error("embedding provider failed: {0}")]
    Provider(String),

    /// Both the primary and the fallback provider failed.
    #[error("embeddings unavailable: primary: {primary}; fallback: {fallback}")]
    Unavailable {
        /// Why the primary failed.
        primary: String,
        /// Why the fallback failed (or "not configured").
        fallback: String,
    },

    /// A provider returned a vector of the wrong dimension.
    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    Dimension {
        /// Configured dimension D.
        expected: usize,
        /// What the provider returned.
        got: usize,
    },

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// A single embedding provider.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Produce a dense vector for `text`.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Primary-plus-fallback embedding client.
pub struct EmbeddingService {
    primary: Arc<dyn Embedder>,
    fallback: Option<Arc<dyn Embedder>>,
    dimension: usize,
}

impl EmbeddingService {
    /// Compose a service from a primary provider, an optional fallback,
    /// and the configured dimension `D`.
    pub fn new(
        primary: Arc<dyn Embedder>,
        fallback: Option<Arc<dyn Embedder>>,
        dimension: usize,
    ) -> Self {
        Self {
            primary,
            fallback,
            dimension,
        }
    }

    /// The configured vector dimension.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Embed one text. The primary provider is attempted first; on any
    /// failure the fallback is used if configured.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let primary_err = match self.primary.embed(text).await {
            Ok(vector) => return self.check_dimension(vector),
            Err(e) => e,
        };

        let Some(fallback) = &self.fallback else {
            return Err(EmbeddingError::Unavailable {
                primary: primary_err.to_string(),
                fallback: "not configured".into(),
            });
        };

        tracing::warn!(error = %primary_err, "primary embedding provider failed, using fallback");

        match fallback.embed(text).await {
            Ok(vector) => self.check_dimension(vector),
            Err(fallback_err) => Err(EmbeddingError::Unavailable {
                primary: primary_err.to_string(),
                fallback: fallback_err.to_string(),
            }),
        }
    }

    /// Embed many texts, up to `batch_size` in parallel per batch.
    ///
    /// The returned vectors are in input order. Any single failure fails
    /// the whole batch.
    pub async fn embed_batch(
        &self,
        texts: &[String],
        batch_size: usize,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let batch_size = batch_size.max(1);
        let mut results = Vec::with_capacity(texts.len());
        for window in texts.chunks(batch_size) {
            let batch =
                futures::future::try_join_all(window.iter().map(|text| self.embed(text))).await?;
            results.extend(batch);
        }
        Ok(results)
    }

    fn check_dimension(&self, vector: Vec<f32>) -> Result<Vec<f32>, EmbeddingError> {
        if vector.len() != self.dimension {
            return Err(EmbeddingError::Dimension {
                expected: self.dimension,
                got: vector.len(),
            });
        }
        Ok(vector)
    }
}
