//! Streaming chunk types for incremental LLM responses.

use std::fmt;
use std::pin::Pin;

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::adapter::AdapterError;
use crate::chat::{TokenUsage, ToolCall};

/// A tagged event on the streaming channel between an adapter and its caller.
///
/// Ordering contract: any number of `Text` chunks may interleave; every
/// `ToolCall` chunk for a turn arrives before the terminal chunk; exactly
/// one terminal chunk (`Done` or `Error`) ends the stream, and nothing
/// follows an `Error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Chunk {
    /// Incremental assistant text.
    Text {
        /// The text fragment.
        content: String,
    },
    /// A completed tool invocation request.
    ToolCall {
        /// The tool call.
        tool_call: ToolCall,
    },
    /// Successful end of stream with token usage.
    Done {
        /// Token usage for the turn.
        usage: TokenUsage,
    },
    /// Terminal failure.
    Error {
        /// Human-readable error message.
        error: String,
    },
}

impl Chunk {
    /// Shorthand for a text chunk.
    pub fn text(content: impl Into<String>) -> Self {
        Chunk::Text {
            content: content.into(),
        }
    }

    /// Shorthand for an error chunk.
    pub fn error(message: impl Into<String>) -> Self {
        Chunk::Error {
            error: message.into(),
        }
    }

    /// The chunk's tag, as used for SSE event names.
    pub fn kind(&self) -> &'static str {
        match self {
            Chunk::Text { .. } => "text",
            Chunk::ToolCall { .. } => "tool_call",
            Chunk::Done { .. } => "done",
            Chunk::Error { .. } => "error",
        }
    }

    /// Whether this chunk terminates the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Chunk::Done { .. } | Chunk::Error { .. })
    }
}

/// Handle to a streaming completion.
pub struct ChunkStream {
    /// The stream of chunks. Consume with `StreamExt::next()`.
    pub receiver: Pin<Box<dyn Stream<Item = Chunk> + Send>>,
}

impl ChunkStream {
    /// Wrap a stream of chunks.
    pub fn new(stream: impl Stream<Item = Chunk> + Send + 'static) -> Self {
        Self {
            receiver: Box::pin(stream),
        }
    }

    /// A stream that yields the given chunks in order.
    pub fn from_chunks(chunks: Vec<Chunk>) -> Self {
        Self::new(futures::stream::iter(chunks))
    }
}

impl fmt::Debug for ChunkStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkStream").finish_non_exhaustive()
    }
}

/// A fully drained completion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    /// Concatenated assistant text.
    pub content: String,
    /// Tool calls emitted during the turn.
    pub tool_calls: Vec<ToolCall>,
    /// Token usage from the terminal `Done` chunk.
    pub usage: TokenUsage,
}

/// Drain a [`ChunkStream`] into a [`Completion`].
///
/// An `Error` chunk aborts the drain and surfaces as
/// [`AdapterError::Stream`]. This is how non-streaming callers get the
/// same contract as streaming ones.
pub async fn drain(mut stream: ChunkStream) -> Result<Completion, AdapterError> {
    let mut completion = Completion::default();

    while let Some(chunk) = stream.receiver.next().await {
        match chunk {
            Chunk::Text { content } => completion.content.push_str(&content),
            Chunk::ToolCall { tool_call } => completion.tool_calls.push(tool_call),
            Chunk::Done { usage } => completion.usage = usage,
            Chunk::Error { error } => return Err(AdapterError::Stream(error)),
        }
    }

    Ok(completion)
}
