//! Context assembly for LLM requests.

use std::sync::Arc;

use cortex_memory::{LongTermMemory, ShortTermMemory};
use cortex_store::{MemoryFilter, StoreError};
use cortex_types::{AgentDoc, ChatMessage, MemoryDoc, Role};

/// Assembles the message list for one turn: system prompt (with a
/// retrieved-memory block when enabled), recent conversation history, and
/// the new user message last.
pub struct ContextBuilder {
    short_term: ShortTermMemory,
    long_term: Arc<LongTermMemory>,
}

impl ContextBuilder {
    /// Create a builder over the two memory layers.
    pub fn new(short_term: ShortTermMemory, long_term: Arc<LongTermMemory>) -> Self {
        Self {
            short_term,
            long_term,
        }
    }

    /// Build the complete message list for an LLM request.
    ///
    /// Long-term retrieval runs on every turn (no cache) and each
    /// returned memory's access counter is bumped. Retrieval failures
    /// degrade to a memory-less context rather than failing the turn.
    pub async fn build(
        &self,
        conversation_id: &str,
        user_message: &str,
        agent: &AgentDoc,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let mut messages = Vec::new();

        let mut system_prompt = agent.system_prompt.clone();
        if agent.capabilities.memory_enabled {
            let memories = self
                .relevant_memories(user_message, agent.memory_config.long_term_results)
                .await;
            if !memories.is_empty() {
                system_prompt.push_str(&format_memory_block(&memories));
            }
        }
        messages.push(ChatMessage::new(Role::System, system_prompt));

        let recent = self
            .short_term
            .recent_messages(conversation_id, agent.memory_config.short_term_messages)
            .await?;
        for message in recent {
            let mut chat = ChatMessage::new(message.role, message.content);
            chat.tool_call_id = message.tool_call_id;
            chat.tool_name = message.tool_name;
            messages.push(chat);
        }

        messages.push(ChatMessage::new(Role::User, user_message));
        Ok(messages)
    }

    async fn relevant_memories(&self, query: &str, limit: usize) -> Vec<MemoryDoc> {
        let memories = match self
            .long_term
            .search(query, limit, &MemoryFilter::default())
            .await
        {
            Ok(memories) => memories,
            Err(e) => {
                tracing::warn!(error = %e, "memory retrieval failed, building context without memories");
                return Vec::new();
            }
        };

        for memory in &memories {
            if let Err(e) = self.long_term.increment_access(&memory.id).await {
                tracing::warn!(error = %e, memory_id = %memory.id, "failed to bump access count");
            }
        }
        memories
    }
}

fn format_memory_block(memories: &[MemoryDoc]) -> String {
    let lines: Vec<String> = memories
        .iter()
        .map(|m| format!("- [{}] {}", m.content_type.as_str(), m.content))
        .collect();
    format!(
        "\n\n## Relevant Long-Term Memories\n\n{}\n\nUse these memories to provide personalized and contextual responses.\n",
        lines.join("\n")
    )
}
