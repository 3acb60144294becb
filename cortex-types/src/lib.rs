#![deny(missing_docs)]
//! Core types for the cortex agent runtime.
//!
//! Defines the chat data model ([`ChatMessage`], [`ToolCall`]), the
//! streaming contract between adapters and the orchestrator ([`Chunk`],
//! [`ChunkStream`]), the persistent document shapes ([`AgentDoc`],
//! [`ConversationDoc`], [`MemoryDoc`]), and the [`LlmAdapter`] trait that
//! every backend implements.

mod adapter;
mod chat;
mod document;
pub mod embedding;
mod stream;

pub use adapter::{AdapterError, Backend, LlmAdapter};
pub use chat::{ChatMessage, ChatRequest, Role, TokenUsage, ToolCall, ToolSpec};
pub use document::{
    AgentDoc, Capabilities, ContentType, ConversationDoc, ConversationStats, ConversationStatus,
    FallbackConditions, FallbackEntry, LlmTriple, MemoryConfig, MemoryDoc, MemorySource,
    MemoryStatus, MessageDoc,
};
pub use stream::{drain, Chunk, ChunkStream, Completion};
