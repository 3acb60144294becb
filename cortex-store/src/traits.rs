//! Collection traits implemented by store backends.

use async_trait::async_trait;
use cortex_types::{AgentDoc, ContentType, ConversationDoc, MemoryDoc, MessageDoc};

use crate::error::StoreError;

/// Counter increments applied atomically with a message append.
///
/// `message_count` is always incremented by one per append and is not part
/// of the delta.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatsDelta {
    /// Tokens to add to `stats.total_tokens`.
    pub total_tokens: u64,
    /// Tool calls to add to `stats.tool_calls`.
    pub tool_calls: u64,
}

/// Field updates applied to a memory in one atomic write.
///
/// When `content` changes, the caller is responsible for supplying the
/// regenerated `embedding` + `embedding_model` in the same patch so no
/// reader can observe content with a stale embedding.
#[derive(Debug, Clone, Default)]
pub struct MemoryPatch {
    /// New memory text.
    pub content: Option<String>,
    /// New content type.
    pub content_type: Option<ContentType>,
    /// New category tags.
    pub categories: Option<Vec<String>>,
    /// New importance.
    pub importance: Option<f64>,
    /// New confidence.
    pub confidence: Option<Option<f64>>,
    /// New verified flag.
    pub verified: Option<bool>,
    /// Regenerated packed embedding (paired with `embedding_model`).
    pub embedding: Option<Vec<u8>>,
    /// Model tag for the regenerated embedding.
    pub embedding_model: Option<String>,
}

impl MemoryPatch {
    /// Whether the patch changes anything.
    pub fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.content_type.is_none()
            && self.categories.is_none()
            && self.importance.is_none()
            && self.confidence.is_none()
            && self.verified.is_none()
            && self.embedding.is_none()
            && self.embedding_model.is_none()
    }
}

/// Filter applied to both memory search lanes. Status is always pinned to
/// `active` by the search implementations.
#[derive(Debug, Clone, Default)]
pub struct MemoryFilter {
    /// Restrict to one content type.
    pub content_type: Option<ContentType>,
    /// Restrict to memories tagged with any of these categories.
    pub categories: Option<Vec<String>>,
    /// Restrict by verified flag.
    pub verified: Option<bool>,
}

/// The `agents` collection.
#[async_trait]
pub trait AgentStore: Send + Sync {
    /// Insert an agent document.
    async fn insert_agent(&self, agent: AgentDoc) -> Result<(), StoreError>;

    /// Fetch an agent by id.
    async fn agent(&self, id: &str) -> Result<Option<AgentDoc>, StoreError>;

    /// Fetch an agent by slug.
    async fn agent_by_slug(&self, slug: &str) -> Result<Option<AgentDoc>, StoreError>;

    /// Fetch the agent carrying `is_default = true`.
    async fn default_agent(&self) -> Result<Option<AgentDoc>, StoreError>;
}

/// The `conversations` collection.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Insert a conversation document.
    async fn insert_conversation(&self, conversation: ConversationDoc) -> Result<(), StoreError>;

    /// Fetch a conversation (with all messages) by id.
    async fn conversation(&self, id: &str) -> Result<Option<ConversationDoc>, StoreError>;

    /// The last `max_messages` messages in chronological order.
    ///
    /// Missing conversations yield an empty list, mirroring a projection
    /// query on an absent document.
    async fn recent_messages(
        &self,
        id: &str,
        max_messages: usize,
    ) -> Result<Vec<MessageDoc>, StoreError>;

    /// Append a message atomically: push to `messages`, bump `updated_at`,
    /// increment `stats.message_count`, and apply `delta`. Never
    /// load-modify-writes the whole document.
    async fn append_message(
        &self,
        id: &str,
        message: MessageDoc,
        delta: StatsDelta,
    ) -> Result<(), StoreError>;

    /// Set `memory_processed = true` on every message whose id is in
    /// `message_ids`.
    async fn mark_messages_processed(
        &self,
        id: &str,
        message_ids: &[String],
    ) -> Result<(), StoreError>;
}

/// The `memories` collection, including the two search lanes.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Insert a memory document.
    async fn insert_memory(&self, memory: MemoryDoc) -> Result<(), StoreError>;

    /// Fetch a memory by id, regardless of status.
    async fn memory(&self, id: &str) -> Result<Option<MemoryDoc>, StoreError>;

    /// Apply a patch atomically, bumping `updated_at`. Returns whether a
    /// document was modified.
    async fn patch_memory(&self, id: &str, patch: MemoryPatch) -> Result<bool, StoreError>;

    /// Soft-delete: set `status = deleted`. Never removes the document.
    async fn soft_delete_memory(&self, id: &str) -> Result<bool, StoreError>;

    /// Bump `access_count` and `last_accessed_at`.
    async fn increment_access(&self, id: &str) -> Result<(), StoreError>;

    /// Vector lane: top `limit` active memories matching `filter`, ranked
    /// by cosine similarity to `query`, best first.
    async fn vector_search(
        &self,
        query: &[f32],
        filter: &MemoryFilter,
        limit: usize,
    ) -> Result<Vec<(MemoryDoc, f64)>, StoreError>;

    /// Lexical lane: top `limit` active memories matching `filter`, ranked
    /// by full-text relevance over content and categories with single-edit
    /// fuzzy tolerance, best first.
    async fn text_search(
        &self,
        query: &str,
        filter: &MemoryFilter,
        limit: usize,
    ) -> Result<Vec<(MemoryDoc, f64)>, StoreError>;
}

/// A complete store backend.
#[async_trait]
pub trait Store: AgentStore + ConversationStore + MemoryStore {
    /// Liveness probe for the health endpoint. Causes no state change.
    async fn ping(&self) -> Result<(), StoreError>;
}
