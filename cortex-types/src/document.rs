//! Persistent document shapes for the agents, conversations, and memories
//! collections.
//!
//! These are the store-facing types. Conversations own their messages as an
//! append-only array; memories are independent documents referenced only by
//! a source descriptor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::adapter::Backend;
use crate::chat::{Role, TokenUsage, ToolCall};

/// One `(backend, model, temperature, max_tokens)` selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmTriple {
    /// Which backend to use.
    pub backend: Backend,
    /// Model identifier on that backend.
    pub model: String,
    /// Sampling temperature in `[0, 1]`.
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Maximum output tokens.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_temperature() -> f64 {
    0.7
}

fn default_max_tokens() -> u32 {
    4096
}

/// Conditions gating the use of a fallback entry.
///
/// `on_context_overflow` and `max_input_tokens` are recognized in
/// configuration but not yet honored by the orchestrator; only `on_error`
/// is consulted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackConditions {
    /// Use this entry when the previous adapter failed.
    #[serde(default = "default_true")]
    pub on_error: bool,
    /// Use this entry when the context exceeds the primary's window.
    #[serde(default)]
    pub on_context_overflow: bool,
    /// Input-token ceiling associated with `on_context_overflow`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_input_tokens: Option<u32>,
}

fn default_true() -> bool {
    true
}

impl Default for FallbackConditions {
    fn default() -> Self {
        Self {
            on_error: true,
            on_context_overflow: false,
            max_input_tokens: None,
        }
    }
}

/// One entry in an agent's ordered fallback chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackEntry {
    /// The alternate LLM selection.
    #[serde(flatten)]
    pub llm: LlmTriple,
    /// When this entry applies.
    #[serde(default)]
    pub conditions: FallbackConditions,
}

/// Capability flags on an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Whether long-term memory retrieval feeds the context.
    #[serde(default)]
    pub memory_enabled: bool,
    /// Whether tools are offered to the model.
    #[serde(default)]
    pub tools_enabled: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            memory_enabled: true,
            tools_enabled: false,
        }
    }
}

/// Memory knobs on an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Schedule background extraction after each turn.
    #[serde(default)]
    pub auto_extract: bool,
    /// Recent messages included in the context.
    #[serde(default = "default_short_term")]
    pub short_term_messages: usize,
    /// Long-term memories retrieved per turn.
    #[serde(default = "default_long_term")]
    pub long_term_results: usize,
}

fn default_short_term() -> usize {
    20
}

fn default_long_term() -> usize {
    10
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            auto_extract: false,
            short_term_messages: default_short_term(),
            long_term_results: default_long_term(),
        }
    }
}

/// An agent: immutable-after-create configuration for a persona.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDoc {
    /// Document id.
    pub id: String,
    /// Unique human-readable slug.
    pub slug: String,
    /// Display name.
    pub name: String,
    /// System prompt text.
    pub system_prompt: String,
    /// Primary LLM selection.
    pub llm: LlmTriple,
    /// Ordered fallback chain.
    #[serde(default)]
    pub fallback_chain: Vec<FallbackEntry>,
    /// Capability flags.
    #[serde(default)]
    pub capabilities: Capabilities,
    /// Memory knobs.
    #[serde(default)]
    pub memory_config: MemoryConfig,
    /// Tool-name allowlist (empty = no tools).
    #[serde(default)]
    pub enabled_tools: Vec<String>,
    /// Exactly one agent per database carries this flag.
    #[serde(default)]
    pub is_default: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

impl AgentDoc {
    /// Create an agent with the given slug, prompt, and primary LLM.
    pub fn new(slug: impl Into<String>, system_prompt: impl Into<String>, llm: LlmTriple) -> Self {
        let now = Utc::now();
        let slug = slug.into();
        Self {
            id: Uuid::new_v4().to_string(),
            name: slug.clone(),
            slug,
            system_prompt: system_prompt.into(),
            llm,
            fallback_chain: Vec::new(),
            capabilities: Capabilities::default(),
            memory_config: MemoryConfig::default(),
            enabled_tools: Vec::new(),
            is_default: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Conversation lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    /// Open for new turns.
    Active,
    /// Read-only.
    Archived,
}

/// Running counters on a conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationStats {
    /// Number of messages (all roles).
    pub message_count: u64,
    /// Sum of token usage across turns.
    pub total_tokens: u64,
    /// Number of tool calls emitted.
    pub tool_calls: u64,
}

/// A persisted message inside a conversation.
///
/// Messages are immutable once appended, except for the
/// `memory_processed` flag which the extractor flips to `true`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDoc {
    /// Stable opaque id.
    pub id: String,
    /// Author role.
    pub role: Role,
    /// Message text.
    pub content: String,
    /// Tool calls emitted by an assistant message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// For `role = tool`: the answered tool call id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// For `role = tool`: the tool name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// For `role = tool`: execution status (`success` / `error`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Model that produced an assistant message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Token usage for an assistant message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<TokenUsage>,
    /// Append time.
    pub created_at: DateTime<Utc>,
    /// Whether the extractor has consumed this message.
    #[serde(default)]
    pub memory_processed: bool,
}

impl MessageDoc {
    /// A fresh user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::bare(Role::User, content)
    }

    /// A fresh assistant message with model and usage attribution.
    pub fn assistant(
        content: impl Into<String>,
        model: impl Into<String>,
        tool_calls: Vec<ToolCall>,
        tokens: TokenUsage,
    ) -> Self {
        let mut msg = Self::bare(Role::Assistant, content);
        msg.model = Some(model.into());
        msg.tokens = Some(tokens);
        if !tool_calls.is_empty() {
            msg.tool_calls = Some(tool_calls);
        }
        msg
    }

    /// A fresh tool-result message.
    pub fn tool(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        status: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let mut msg = Self::bare(Role::Tool, content);
        msg.tool_call_id = Some(tool_call_id.into());
        msg.tool_name = Some(tool_name.into());
        msg.status = Some(status.into());
        msg
    }

    fn bare(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
            tool_name: None,
            status: None,
            model: None,
            tokens: None,
            created_at: Utc::now(),
            memory_processed: false,
        }
    }
}

/// A conversation owning an append-only message sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationDoc {
    /// Document id.
    pub id: String,
    /// Owning agent id.
    pub agent_id: String,
    /// Display title.
    pub title: String,
    /// Lifecycle status.
    pub status: ConversationStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time; `updated_at >= max(message.created_at)`.
    pub updated_at: DateTime<Utc>,
    /// Ordered messages.
    #[serde(default)]
    pub messages: Vec<MessageDoc>,
    /// Running counters.
    #[serde(default)]
    pub stats: ConversationStats,
}

impl ConversationDoc {
    /// Create an empty active conversation for the given agent.
    pub fn new(agent_id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            agent_id: agent_id.into(),
            title: title.into(),
            status: ConversationStatus::Active,
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
            stats: ConversationStats::default(),
        }
    }
}

/// What kind of knowledge a memory holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    /// A fact about the user or the world.
    Fact,
    /// A user preference.
    Preference,
    /// Something that happened.
    Event,
    /// A skill or area of expertise.
    Skill,
    /// A reference document.
    Document,
}

impl ContentType {
    /// The lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Fact => "fact",
            ContentType::Preference => "preference",
            ContentType::Event => "event",
            ContentType::Skill => "skill",
            ContentType::Document => "document",
        }
    }
}

/// Memory lifecycle status. Deletion is always soft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryStatus {
    /// Visible to search.
    Active,
    /// Soft-deleted; retrievable by id, excluded from search.
    Deleted,
}

/// Where a memory came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MemorySource {
    /// Created by hand through the API.
    Manual,
    /// Extracted from a conversation.
    Conversation {
        /// The source conversation.
        conversation_id: String,
        /// The messages the memory was extracted from.
        message_ids: Vec<String>,
        /// When extraction ran.
        extracted_at: DateTime<Utc>,
    },
}

/// A durable, searchable, embedded piece of knowledge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryDoc {
    /// Document id.
    pub id: String,
    /// The memory text.
    pub content: String,
    /// Kind of knowledge.
    pub content_type: ContentType,
    /// Category tags.
    #[serde(default)]
    pub categories: Vec<String>,
    /// Importance in `[0, 1]`.
    pub importance: f64,
    /// Extraction confidence in `[0, 1]`, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Whether a human confirmed this memory.
    #[serde(default)]
    pub verified: bool,
    /// Lifecycle status.
    pub status: MemoryStatus,
    /// Packed little-endian f32 embedding, `4 * D` bytes.
    #[serde(with = "serde_bytes_base64")]
    pub embedding: Vec<u8>,
    /// Model that produced the embedding.
    pub embedding_model: String,
    /// Origin descriptor.
    pub source: MemorySource,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
    /// Last time search returned this memory.
    pub last_accessed_at: DateTime<Utc>,
    /// How many times search returned this memory.
    #[serde(default)]
    pub access_count: u64,
}

/// Base64 (de)serialization for the packed embedding bytes, so memory
/// documents stay valid JSON without inflating into number arrays.
mod serde_bytes_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triple() -> LlmTriple {
        LlmTriple {
            backend: Backend::Ollama,
            model: "llama3.2:latest".into(),
            temperature: 0.7,
            max_tokens: 4096,
        }
    }

    #[test]
    fn agent_defaults() {
        let agent = AgentDoc::new("default", "You are helpful.", triple());
        assert!(agent.capabilities.memory_enabled);
        assert!(!agent.capabilities.tools_enabled);
        assert_eq!(agent.memory_config.short_term_messages, 20);
        assert_eq!(agent.memory_config.long_term_results, 10);
        assert!(!agent.is_default);
    }

    #[test]
    fn fallback_conditions_default_to_on_error() {
        let entry: FallbackEntry = serde_json::from_value(serde_json::json!({
            "backend": "ollama",
            "model": "llama3.2:latest"
        }))
        .unwrap();
        assert!(entry.conditions.on_error);
        assert!(!entry.conditions.on_context_overflow);
        assert!(entry.conditions.max_input_tokens.is_none());
        assert_eq!(entry.llm.temperature, 0.7);
    }

    #[test]
    fn message_doc_constructors() {
        let user = MessageDoc::user("hello");
        assert_eq!(user.role, Role::User);
        assert!(!user.memory_processed);

        let assistant = MessageDoc::assistant(
            "hi",
            "llama3.2:latest",
            Vec::new(),
            TokenUsage {
                input_tokens: 1,
                output_tokens: 2,
            },
        );
        assert!(assistant.tool_calls.is_none());
        assert_eq!(assistant.model.as_deref(), Some("llama3.2:latest"));

        let tool = MessageDoc::tool("tc_1", "shell", "success", "ok");
        assert_eq!(tool.role, Role::Tool);
        assert_eq!(tool.status.as_deref(), Some("success"));
    }

    #[test]
    fn message_ids_are_unique() {
        assert_ne!(MessageDoc::user("a").id, MessageDoc::user("a").id);
    }

    #[test]
    fn memory_source_tagged_serde() {
        let source = MemorySource::Conversation {
            conversation_id: "c1".into(),
            message_ids: vec!["m1".into()],
            extracted_at: Utc::now(),
        };
        let json = serde_json::to_value(&source).unwrap();
        assert_eq!(json["type"], "conversation");

        let manual = serde_json::to_value(MemorySource::Manual).unwrap();
        assert_eq!(manual["type"], "manual");
    }

    #[test]
    fn memory_doc_embedding_roundtrips_through_json() {
        let doc = MemoryDoc {
            id: "m1".into(),
            content: "prefers dark roast coffee".into(),
            content_type: ContentType::Preference,
            categories: vec!["coffee".into()],
            importance: 0.7,
            confidence: Some(0.8),
            verified: false,
            status: MemoryStatus::Active,
            embedding: vec![0, 0, 128, 63, 0, 0, 0, 64],
            embedding_model: "qwen3-embedding:0.6b".into(),
            source: MemorySource::Manual,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            last_accessed_at: Utc::now(),
            access_count: 0,
        };
        let json = serde_json::to_value(&doc).unwrap();
        assert!(json["embedding"].is_string());
        let back: MemoryDoc = serde_json::from_value(json).unwrap();
        assert_eq!(back.embedding, doc.embedding);
    }

    #[test]
    fn conversation_starts_empty_and_active() {
        let conv = ConversationDoc::new("agent-1", "New Conversation");
        assert_eq!(conv.status, ConversationStatus::Active);
        assert!(conv.messages.is_empty());
        assert_eq!(conv.stats.message_count, 0);
    }
}
