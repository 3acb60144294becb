//! Store error type.

use thiserror::Error;

/// Errors from document-store operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum StoreError {
    /// The referenced document does not exist.
    #[error("not found: {collection}/{id}")]
    NotFound {
        /// Collection name.
        collection: &'static str,
        /// Document id.
        id: String,
    },

    /// A search lane is not available on this backend (e.g. no vector
    /// index configured). Callers degrade to the other lane.
    #[error("search unavailable: {0}")]
    SearchUnavailable(String),

    /// A write was rejected by the backend.
    #[error("write failed: {0}")]
    WriteFailed(String),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Catch-all for backend-specific failures.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    /// Convenience constructor for [`StoreError::NotFound`].
    pub fn not_found(collection: &'static str, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            collection,
            id: id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        assert_eq!(
            StoreError::not_found("conversations", "c1").to_string(),
            "not found: conversations/c1"
        );
    }

    #[test]
    fn search_unavailable_display() {
        assert_eq!(
            StoreError::SearchUnavailable("no vector index".into()).to_string(),
            "search unavailable: no vector index"
        );
    }
}
