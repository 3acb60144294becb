//! In-memory store backend.
//!
//! One `RwLock<HashMap>` per collection. The vector lane brute-force ranks
//! by cosine similarity (permitted for small corpora); the lexical lane
//! scores fuzzy token overlap over content and categories. Insertion order
//! is preserved per collection so equal-score results rank stably.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use cortex_types::embedding::binary_to_vector;
use cortex_types::{AgentDoc, ConversationDoc, MemoryDoc, MemoryStatus, MessageDoc};
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::traits::{
    AgentStore, ConversationStore, MemoryFilter, MemoryPatch, MemoryStore, StatsDelta, Store,
};

/// A collection preserving insertion order alongside keyed access.
struct Collection<T> {
    docs: HashMap<String, T>,
    order: Vec<String>,
}

impl<T> Collection<T> {
    fn new() -> Self {
        Self {
            docs: HashMap::new(),
            order: Vec::new(),
        }
    }

    fn insert(&mut self, id: String, doc: T) {
        if !self.docs.contains_key(&id) {
            self.order.push(id.clone());
        }
        self.docs.insert(id, doc);
    }

    fn iter_ordered(&self) -> impl Iterator<Item = &T> {
        self.order.iter().filter_map(|id| self.docs.get(id))
    }
}

/// In-memory reference backend for all three collections.
pub struct InMemoryStore {
    agents: RwLock<Collection<AgentDoc>>,
    conversations: RwLock<Collection<ConversationDoc>>,
    memories: RwLock<Collection<MemoryDoc>>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            agents: RwLock::new(Collection::new()),
            conversations: RwLock::new(Collection::new()),
            memories: RwLock::new(Collection::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentStore for InMemoryStore {
    async fn insert_agent(&self, agent: AgentDoc) -> Result<(), StoreError> {
        let mut agents = self.agents.write().await;
        agents.insert(agent.id.clone(), agent);
        Ok(())
    }

    async fn agent(&self, id: &str) -> Result<Option<AgentDoc>, StoreError> {
        Ok(self.agents.read().await.docs.get(id).cloned())
    }

    async fn agent_by_slug(&self, slug: &str) -> Result<Option<AgentDoc>, StoreError> {
        let agents = self.agents.read().await;
        Ok(agents.iter_ordered().find(|a| a.slug == slug).cloned())
    }

    async fn default_agent(&self) -> Result<Option<AgentDoc>, StoreError> {
        let agents = self.agents.read().await;
        Ok(agents.iter_ordered().find(|a| a.is_default).cloned())
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn insert_conversation(&self, conversation: ConversationDoc) -> Result<(), StoreError> {
        let mut conversations = self.conversations.write().await;
        conversations.insert(conversation.id.clone(), conversation);
        Ok(())
    }

    async fn conversation(&self, id: &str) -> Result<Option<ConversationDoc>, StoreError> {
        Ok(self.conversations.read().await.docs.get(id).cloned())
    }

    async fn recent_messages(
        &self,
        id: &str,
        max_messages: usize,
    ) -> Result<Vec<MessageDoc>, StoreError> {
        let conversations = self.conversations.read().await;
        let Some(conversation) = conversations.docs.get(id) else {
            return Ok(Vec::new());
        };
        let skip = conversation.messages.len().saturating_sub(max_messages);
        Ok(conversation.messages[skip..].to_vec())
    }

    async fn append_message(
        &self,
        id: &str,
        message: MessageDoc,
        delta: StatsDelta,
    ) -> Result<(), StoreError> {
        let mut conversations = self.conversations.write().await;
        let conversation = conversations
            .docs
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("conversations", id))?;
        conversation.messages.push(message);
        conversation.updated_at = Utc::now();
        conversation.stats.message_count += 1;
        conversation.stats.total_tokens += delta.total_tokens;
        conversation.stats.tool_calls += delta.tool_calls;
        Ok(())
    }

    async fn mark_messages_processed(
        &self,
        id: &str,
        message_ids: &[String],
    ) -> Result<(), StoreError> {
        let mut conversations = self.conversations.write().await;
        let conversation = conversations
            .docs
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("conversations", id))?;
        for message in &mut conversation.messages {
            if message_ids.contains(&message.id) {
                message.memory_processed = true;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn insert_memory(&self, memory: MemoryDoc) -> Result<(), StoreError> {
        let mut memories = self.memories.write().await;
        memories.insert(memory.id.clone(), memory);
        Ok(())
    }

    async fn memory(&self, id: &str) -> Result<Option<MemoryDoc>, StoreError> {
        Ok(self.memories.read().await.docs.get(id).cloned())
    }

    async fn patch_memory(&self, id: &str, patch: MemoryPatch) -> Result<bool, StoreError> {
        let mut memories = self.memories.write().await;
        let Some(memory) = memories.docs.get_mut(id) else {
            return Ok(false);
        };
        if patch.is_empty() {
            return Ok(false);
        }
        if let Some(content) = patch.content {
            memory.content = content;
        }
        if let Some(content_type) = patch.content_type {
            memory.content_type = content_type;
        }
        if let Some(categories) = patch.categories {
            memory.categories = categories;
        }
        if let Some(importance) = patch.importance {
            memory.importance = importance;
        }
        if let Some(confidence) = patch.confidence {
            memory.confidence = confidence;
        }
        if let Some(verified) = patch.verified {
            memory.verified = verified;
        }
        if let Some(embedding) = patch.embedding {
            memory.embedding = embedding;
        }
        if let Some(embedding_model) = patch.embedding_model {
            memory.embedding_model = embedding_model;
        }
        memory.updated_at = Utc::now();
        Ok(true)
    }

    async fn soft_delete_memory(&self, id: &str) -> Result<bool, StoreError> {
        let mut memories = self.memories.write().await;
        let Some(memory) = memories.docs.get_mut(id) else {
            return Ok(false);
        };
        memory.status = MemoryStatus::Deleted;
        memory.updated_at = Utc::now();
        Ok(true)
    }

    async fn increment_access(&self, id: &str) -> Result<(), StoreError> {
        let mut memories = self.memories.write().await;
        if let Some(memory) = memories.docs.get_mut(id) {
            memory.access_count += 1;
            memory.last_accessed_at = Utc::now();
        }
        Ok(())
    }

    async fn vector_search(
        &self,
        query: &[f32],
        filter: &MemoryFilter,
        limit: usize,
    ) -> Result<Vec<(MemoryDoc, f64)>, StoreError> {
        let memories = self.memories.read().await;
        let mut scored: Vec<(MemoryDoc, f64)> = memories
            .iter_ordered()
            .filter(|m| m.status == MemoryStatus::Active && matches_filter(m, filter))
            .map(|m| {
                let embedding = binary_to_vector(&m.embedding);
                (m.clone(), cosine_similarity(query, &embedding))
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn text_search(
        &self,
        query: &str,
        filter: &MemoryFilter,
        limit: usize,
    ) -> Result<Vec<(MemoryDoc, f64)>, StoreError> {
        let query_tokens = tokenize(query);
        if query_tokens.is_empty() {
            return Ok(Vec::new());
        }

        let memories = self.memories.read().await;
        let mut scored: Vec<(MemoryDoc, f64)> = memories
            .iter_ordered()
            .filter(|m| m.status == MemoryStatus::Active && matches_filter(m, filter))
            .filter_map(|m| {
                let mut doc_tokens = tokenize(&m.content);
                for category in &m.categories {
                    doc_tokens.extend(tokenize(category));
                }
                let score = lexical_score(&query_tokens, &doc_tokens);
                (score > 0.0).then(|| (m.clone(), score))
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

fn matches_filter(memory: &MemoryDoc, filter: &MemoryFilter) -> bool {
    if let Some(content_type) = filter.content_type
        && memory.content_type != content_type
    {
        return false;
    }
    if let Some(categories) = &filter.categories
        && !categories.iter().any(|c| memory.categories.contains(c))
    {
        return false;
    }
    if let Some(verified) = filter.verified
        && memory.verified != verified
    {
        return false;
    }
    true
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;
    for (x, y) in a.iter().zip(b) {
        dot += f64::from(*x) * f64::from(*y);
        norm_a += f64::from(*x) * f64::from(*x);
        norm_b += f64::from(*y) * f64::from(*y);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Number of query tokens that match a document token exactly or within a
/// single edit (the lexical lane's fuzzy tolerance).
fn lexical_score(query_tokens: &[String], doc_tokens: &[String]) -> f64 {
    query_tokens
        .iter()
        .filter(|q| doc_tokens.iter().any(|d| within_one_edit(q, d)))
        .count() as f64
}

/// Whether `a` and `b` are equal or differ by at most one insertion,
/// deletion, or substitution.
fn within_one_edit(a: &str, b: &str) -> bool {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (short, long) = if a.len() <= b.len() { (&a, &b) } else { (&b, &a) };
    match long.len() - short.len() {
        0 => short.iter().zip(long.iter()).filter(|(x, y)| x != y).count() <= 1,
        1 => {
            // One insertion: skip the first mismatching char of the longer
            // word and require the rest to line up.
            let mut i = 0;
            while i < short.len() && short[i] == long[i] {
                i += 1;
            }
            short[i..] == long[i + 1..]
        }
        _ => false,
    }
}
