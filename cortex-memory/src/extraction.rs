//! Background memory extraction from finished conversation turns.

use std::sync::Arc;

use chrono::Utc;
use cortex_store::ConversationStore;
use cortex_types::{
    ChatMessage, ChatRequest, ContentType, LlmAdapter, MemorySource, MessageDoc, Role,
};

use crate::long_term::LongTermMemory;

/// Default number of messages per extraction batch.
pub(crate) const DEFAULT_BATCH_SIZE: usize = 10;

/// Confidence assigned to auto-extracted memories.
const EXTRACTED_CONFIDENCE: f64 = 0.8;

const EXTRACTION_PROMPT: &str = r#"You are a memory extraction assistant. Your job is to analyze conversation messages and extract important facts, preferences, and information that should be remembered long-term.

Review the following conversation messages and extract any memories worth saving. Focus on:
- User preferences and likes/dislikes
- Important facts about the user
- Significant decisions or plans
- Skills or expertise mentioned
- Important context that would be useful in future conversations

For each memory, provide:
1. content: The memory text (concise but complete)
2. content_type: One of: fact, preference, event, skill, document
3. categories: List of relevant categories/tags
4. importance: Score from 0.0 to 1.0

Return your response as a JSON array of memory objects. If no significant memories are found, return an empty array.

Example output:
[
  {
    "content": "User prefers Rust over Go for systems work",
    "content_type": "preference",
    "categories": ["coding", "preferences"],
    "importance": 0.7
  }
]

Conversation messages:
{messages}

Extract memories (return JSON array only):"#;

/// Mines unprocessed conversation messages for long-term memories.
///
/// Runs as a background task after a turn completes. Messages are
/// processed in batches; a batch whose LLM output fails to parse is left
/// unmarked so the next invocation retries it.
pub struct MemoryExtractor {
    store: Arc<dyn ConversationStore>,
    long_term: Arc<LongTermMemory>,
}

impl MemoryExtractor {
    /// Create an extractor over the given conversation store and
    /// long-term memory.
    pub fn new(store: Arc<dyn ConversationStore>, long_term: Arc<LongTermMemory>) -> Self {
        Self { store, long_term }
    }

    /// Extract memories from every unprocessed message in the
    /// conversation, using `adapter` for the extraction calls. Returns the
    /// number of memories created.
    pub async fn extract(&self, conversation_id: &str, adapter: Arc<dyn LlmAdapter>) -> usize {
        self.extract_batched(conversation_id, adapter, DEFAULT_BATCH_SIZE)
            .await
    }

    /// [`Self::extract`] with an explicit batch size.
    pub async fn extract_batched(
        &self,
        conversation_id: &str,
        adapter: Arc<dyn LlmAdapter>,
        batch_size: usize,
    ) -> usize {
        let conversation = match self.store.conversation(conversation_id).await {
            Ok(Some(conversation)) => conversation,
            Ok(None) => return 0,
            Err(e) => {
                tracing::warn!(error = %e, conversation_id, "extraction could not load conversation");
                return 0;
            }
        };

        let unprocessed: Vec<MessageDoc> = conversation
            .messages
            .into_iter()
            .filter(|m| !m.memory_processed)
            .collect();
        if unprocessed.is_empty() {
            return 0;
        }

        let mut total = 0;
        for batch in unprocessed.chunks(batch_size.max(1)) {
            total += self
                .extract_batch(conversation_id, batch, adapter.clone())
                .await;
        }
        total
    }

    async fn extract_batch(
        &self,
        conversation_id: &str,
        batch: &[MessageDoc],
        adapter: Arc<dyn LlmAdapter>,
    ) -> usize {
        let transcript = batch
            .iter()
            .map(|m| format!("{}: {}", role_label(m.role), m.content))
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = EXTRACTION_PROMPT.replace("{messages}", &transcript);

        let request = ChatRequest::new(vec![ChatMessage::new(Role::User, prompt)])
            .with_temperature(0.3)
            .with_max_tokens(2048);

        let completion = match adapter.complete(request).await {
            Ok(completion) => completion,
            Err(e) => {
                tracing::warn!(error = %e, conversation_id, "extraction LLM call failed, batch left unmarked");
                return 0;
            }
        };

        let Some(memories) = parse_extraction_output(&completion.content) else {
            tracing::warn!(
                conversation_id,
                response = %completion.content,
                "extraction output was not a JSON array, batch left unmarked"
            );
            return 0;
        };

        let message_ids: Vec<String> = batch.iter().map(|m| m.id.clone()).collect();
        let mut created = 0;

        for entry in memories {
            let Some(content) = entry.get("content").and_then(|v| v.as_str()) else {
                continue;
            };
            let content_type = entry
                .get("content_type")
                .cloned()
                .and_then(|v| serde_json::from_value::<ContentType>(v).ok())
                .unwrap_or(ContentType::Fact);
            let categories = entry
                .get("categories")
                .and_then(|v| v.as_array())
                .map(|a| {
                    a.iter()
                        .filter_map(|c| c.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default();
            let importance = entry
                .get("importance")
                .and_then(|v| v.as_f64())
                .unwrap_or(0.5);

            let source = MemorySource::Conversation {
                conversation_id: conversation_id.to_string(),
                message_ids: message_ids.clone(),
                extracted_at: Utc::now(),
            };

            match self
                .long_term
                .create(
                    content,
                    content_type,
                    categories,
                    importance,
                    Some(EXTRACTED_CONFIDENCE),
                    source,
                )
                .await
            {
                Ok(_) => created += 1,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to create extracted memory");
                }
            }
        }

        if let Err(e) = self
            .store
            .mark_messages_processed(conversation_id, &message_ids)
            .await
        {
            tracing::warn!(error = %e, conversation_id, "failed to mark messages processed");
        }

        created
    }
}

fn role_label(role: Role) -> &'static str {
    match role {
        Role::System => "SYSTEM",
        Role::User => "USER",
        Role::Assistant => "ASSISTANT",
        Role::Tool => "TOOL",
    }
}

/// Parse the extraction LLM's output into memory objects.
///
/// Tolerates surrounding whitespace and a Markdown code fence. Returns
/// `None` when the output is not a JSON array of objects.
fn parse_extraction_output(output: &str) -> Option<Vec<serde_json::Map<String, serde_json::Value>>> {
    let trimmed = strip_code_fence(output.trim());
    let value: serde_json::Value = serde_json::from_str(trimmed).ok()?;
    let array = value.as_array()?;
    Some(
        array
            .iter()
            .filter_map(|v| v.as_object().cloned())
            .collect(),
    )
}

fn strip_code_fence(s: &str) -> &str {
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    // Drop the fence line (which may carry a language tag) and the
    // closing fence.
    let rest = rest.split_once('\n').map_or("", |(_, body)| body);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cortex_embeddings::{Embedder, EmbeddingError, EmbeddingService};
    use cortex_store::{ConversationStore, InMemoryStore, MemoryFilter, MemoryStore, StatsDelta};
    use cortex_types::{AdapterError, Chunk, ChunkStream, ConversationDoc, TokenUsage};

    struct FixedEmbedder;

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Ok(vec![0.5, 0.5])
        }
    }

    struct ScriptedAdapter(String);

    #[async_trait]
    impl LlmAdapter for ScriptedAdapter {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn stream(&self, _request: ChatRequest) -> Result<ChunkStream, AdapterError> {
            Ok(ChunkStream::from_chunks(vec![
                Chunk::text(self.0.clone()),
                Chunk::Done {
                    usage: TokenUsage::default(),
                },
            ]))
        }
    }

    async fn setup(response: &str) -> (Arc<InMemoryStore>, MemoryExtractor, Arc<dyn LlmAdapter>, String) {
        let store = Arc::new(InMemoryStore::new());
        let embeddings = Arc::new(EmbeddingService::new(Arc::new(FixedEmbedder), None, 2));
        let long_term = Arc::new(LongTermMemory::new(store.clone(), embeddings, "test-model"));
        let extractor = MemoryExtractor::new(store.clone(), long_term);

        let conversation = ConversationDoc::new("agent-1", "test");
        let id = conversation.id.clone();
        store.insert_conversation(conversation).await.unwrap();
        store
            .append_message(&id, MessageDoc::user("I love dark roast"), StatsDelta::default())
            .await
            .unwrap();
        store
            .append_message(&id, MessageDoc::user("and I live in Berlin"), StatsDelta::default())
            .await
            .unwrap();

        let adapter: Arc<dyn LlmAdapter> = Arc::new(ScriptedAdapter(response.to_string()));
        (store, extractor, adapter, id)
    }

    #[tokio::test]
    async fn extraction_creates_memories_and_marks_messages() {
        let response = r#"[
            {"content": "User prefers dark roast coffee", "content_type": "preference",
             "categories": ["coffee"], "importance": 0.7}
        ]"#;
        let (store, extractor, adapter, id) = setup(response).await;

        let created = extractor.extract(&id, adapter).await;
        assert_eq!(created, 1);

        let hits = store
            .text_search("coffee", &MemoryFilter::default(), 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        let doc = &hits[0].0;
        assert_eq!(doc.content_type, ContentType::Preference);
        assert_eq!(doc.confidence, Some(0.8));
        assert!(matches!(
            &doc.source,
            MemorySource::Conversation { conversation_id, message_ids, .. }
                if conversation_id == &id && message_ids.len() == 2
        ));

        let conversation = store.conversation(&id).await.unwrap().unwrap();
        assert!(conversation.messages.iter().all(|m| m.memory_processed));
    }

    #[tokio::test]
    async fn parse_failure_leaves_batch_unmarked() {
        let (store, extractor, adapter, id) = setup("I couldn't find any memories, sorry!").await;

        let created = extractor.extract(&id, adapter).await;
        assert_eq!(created, 0);

        let conversation = store.conversation(&id).await.unwrap().unwrap();
        assert!(conversation.messages.iter().all(|m| !m.memory_processed));
    }

    #[tokio::test]
    async fn empty_array_marks_batch_without_creating() {
        let (store, extractor, adapter, id) = setup("[]").await;

        let created = extractor.extract(&id, adapter).await;
        assert_eq!(created, 0);

        let conversation = store.conversation(&id).await.unwrap().unwrap();
        assert!(conversation.messages.iter().all(|m| m.memory_processed));
    }

    #[tokio::test]
    async fn second_pass_skips_processed_messages() {
        let response = r#"[{"content": "x", "content_type": "fact", "categories": [], "importance": 0.5}]"#;
        let (_, extractor, adapter, id) = setup(response).await;

        assert_eq!(extractor.extract(&id, adapter.clone()).await, 1);
        // Everything is marked now; a second pass extracts nothing.
        assert_eq!(extractor.extract(&id, adapter).await, 0);
    }

    #[tokio::test]
    async fn unknown_content_type_defaults_to_fact() {
        let response = r#"[{"content": "x", "content_type": "wisdom", "importance": 0.5}]"#;
        let (store, extractor, adapter, id) = setup(response).await;
        extractor.extract(&id, adapter).await;

        let hits = store
            .vector_search(&[0.5, 0.5], &MemoryFilter::default(), 10)
            .await
            .unwrap();
        assert_eq!(hits[0].0.content_type, ContentType::Fact);
    }

    #[tokio::test]
    async fn missing_conversation_is_a_noop() {
        let (_, extractor, adapter, _) = setup("[]").await;
        assert_eq!(extractor.extract("missing", adapter).await, 0);
    }

    #[test]
    fn strip_code_fence_variants() {
        assert_eq!(strip_code_fence("[]"), "[]");
        assert_eq!(strip_code_fence("```json\n[]\n```"), "[]");
        assert_eq!(strip_code_fence("```\n[1, 2]\n```"), "[1, 2]");
    }

    #[test]
    fn parse_extraction_output_rejects_non_arrays() {
        assert!(parse_extraction_output("{\"content\": \"x\"}").is_none());
        assert!(parse_extraction_output("not json").is_none());
        assert!(parse_extraction_output("[]").unwrap().is_empty());
    }
}
