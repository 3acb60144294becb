//! Short-term memory: the bounded window of recent conversation turns.

use std::sync::Arc;

use cortex_store::{ConversationStore, StoreError};
use cortex_types::MessageDoc;

/// Approximate characters per token for budget trimming.
const CHARS_PER_TOKEN: usize = 4;

/// Fast retrieval of recent context. No embeddings involved.
pub struct ShortTermMemory {
    store: Arc<dyn ConversationStore>,
}

impl ShortTermMemory {
    /// Create a short-term memory over the given conversation store.
    pub fn new(store: Arc<dyn ConversationStore>) -> Self {
        Self { store }
    }

    /// Up to `max_messages` most-recent messages in chronological order.
    /// A missing conversation yields an empty window.
    pub async fn recent_messages(
        &self,
        conversation_id: &str,
        max_messages: usize,
    ) -> Result<Vec<MessageDoc>, StoreError> {
        self.store
            .recent_messages(conversation_id, max_messages)
            .await
    }

    /// Trim messages to an approximate token budget, keeping the newest
    /// messages that fit (`tokens ≈ chars / 4`).
    pub fn trim_to_token_budget(messages: Vec<MessageDoc>, max_tokens: usize) -> Vec<MessageDoc> {
        let max_chars = max_tokens * CHARS_PER_TOKEN;
        let mut total_chars = 0;
        let mut kept = Vec::new();

        for message in messages.into_iter().rev() {
            let chars = message.content.len();
            if total_chars + chars > max_chars {
                break;
            }
            total_chars += chars;
            kept.push(message);
        }

        kept.reverse();
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_store::{InMemoryStore, StatsDelta};
    use cortex_types::ConversationDoc;

    #[tokio::test]
    async fn window_returns_newest_in_order() {
        let store = Arc::new(InMemoryStore::new());
        let conversation = ConversationDoc::new("agent-1", "test");
        let id = conversation.id.clone();
        store.insert_conversation(conversation).await.unwrap();
        for i in 0..4 {
            store
                .append_message(&id, MessageDoc::user(format!("m{i}")), StatsDelta::default())
                .await
                .unwrap();
        }

        let short_term = ShortTermMemory::new(store);
        let window = short_term.recent_messages(&id, 2).await.unwrap();
        let contents: Vec<&str> = window.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["m2", "m3"]);
    }

    #[tokio::test]
    async fn missing_conversation_yields_empty_window() {
        let short_term = ShortTermMemory::new(Arc::new(InMemoryStore::new()));
        assert!(short_term.recent_messages("nope", 10).await.unwrap().is_empty());
    }

    #[test]
    fn trim_keeps_newest_that_fit() {
        let messages = vec![
            MessageDoc::user("a".repeat(40)),
            MessageDoc::user("b".repeat(40)),
            MessageDoc::user("c".repeat(40)),
        ];
        // Budget of 20 tokens = 80 chars: the two newest fit.
        let trimmed = ShortTermMemory::trim_to_token_budget(messages, 20);
        assert_eq!(trimmed.len(), 2);
        assert!(trimmed[0].content.starts_with('b'));
        assert!(trimmed[1].content.starts_with('c'));
    }

    #[test]
    fn trim_with_generous_budget_keeps_all() {
        let messages = vec![MessageDoc::user("short"), MessageDoc::user("messages")];
        let trimmed = ShortTermMemory::trim_to_token_budget(messages, 1000);
        assert_eq!(trimmed.len(), 2);
    }

    #[test]
    fn trim_with_zero_budget_keeps_none() {
        let messages = vec![MessageDoc::user("anything")];
        assert!(ShortTermMemory::trim_to_token_budget(messages, 0).is_empty());
    }
}
