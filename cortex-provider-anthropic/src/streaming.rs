//! SSE streaming support for the Anthropic Messages API.
//!
//! Parses the Server-Sent Events stream produced by Anthropic and maps
//! events to [`Chunk`]s. Tool-input JSON arrives as fragments per content
//! block; fragments are accumulated per block index and parsed once when
//! the block stops — a parse failure yields empty-map arguments, not an
//! error.

use std::collections::HashMap;

use cortex_types::{Chunk, ChunkStream, TokenUsage, ToolCall};
use futures::{Stream, StreamExt};
use reqwest::Response;

/// Wrap an HTTP response body into a [`ChunkStream`].
pub(crate) fn stream_completion(response: Response) -> ChunkStream {
    ChunkStream::new(parse_sse_stream(response.bytes_stream()))
}

/// Parse a raw byte stream into a stream of [`Chunk`]s.
///
/// SSE frames are `event:` / `data:` line pairs terminated by a blank
/// line. Partial lines are buffered across byte chunks.
fn parse_sse_stream(
    byte_stream: impl Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
) -> impl Stream<Item = Chunk> + Send + 'static {
    async_stream::stream! {
        let mut state = SseParserState::new();
        let mut bytes_stream = std::pin::pin!(byte_stream);
        let mut line_buf = String::new();

        while let Some(chunk_result) = bytes_stream.next().await {
            let bytes = match chunk_result {
                Ok(b) => b,
                Err(e) => {
                    yield Chunk::error(format!("stream read error: {e}"));
                    return;
                }
            };

            let chunk_str = match std::str::from_utf8(&bytes) {
                Ok(s) => s,
                Err(e) => {
                    yield Chunk::error(format!("UTF-8 decode error: {e}"));
                    return;
                }
            };

            line_buf.push_str(chunk_str);

            while let Some(newline_pos) = line_buf.find('\n') {
                let line = line_buf[..newline_pos].trim_end_matches('\r').to_string();
                line_buf.drain(..=newline_pos);

                for chunk in state.process_line(&line) {
                    let terminal = chunk.is_terminal();
                    yield chunk;
                    if terminal {
                        return;
                    }
                }
            }
        }

        // Flush any buffered final frame, then close the contract: exactly
        // one terminal chunk per stream.
        for chunk in state.process_line("") {
            let terminal = chunk.is_terminal();
            yield chunk;
            if terminal {
                return;
            }
        }
        yield Chunk::error("stream ended before message_stop");
    }
}

/// In-progress tool use block during streaming.
struct ToolUseInProgress {
    id: String,
    name: String,
    input_buf: String,
}

/// Tracks in-progress streaming state across SSE events.
struct SseParserState {
    /// The current SSE event type (from `event:` lines).
    current_event: Option<String>,
    /// The current SSE data (from `data:` lines; may be multi-line).
    current_data: String,
    /// Map from content block index to in-progress tool use.
    tool_blocks: HashMap<usize, ToolUseInProgress>,
    /// Usage assembled from `message_start` and `message_delta`.
    usage: TokenUsage,
}

impl SseParserState {
    fn new() -> Self {
        Self {
            current_event: None,
            current_data: String::new(),
            tool_blocks: HashMap::new(),
            usage: TokenUsage::default(),
        }
    }

    /// Process a single SSE line and return any chunks it produces.
    fn process_line(&mut self, line: &str) -> Vec<Chunk> {
        if line.is_empty() {
            // Blank line terminates the current frame.
            let event = self.current_event.take();
            let data = std::mem::take(&mut self.current_data);
            match event {
                Some(event) if !data.is_empty() => self.dispatch(&event, &data),
                _ => Vec::new(),
            }
        } else if let Some(event) = line.strip_prefix("event:") {
            self.current_event = Some(event.trim().to_string());
            Vec::new()
        } else if let Some(data) = line.strip_prefix("data:") {
            self.current_data.push_str(data.trim_start());
            Vec::new()
        } else {
            // Comments and unknown fields are ignored per the SSE spec.
            Vec::new()
        }
    }

    fn dispatch(&mut self, event: &str, data: &str) -> Vec<Chunk> {
        let json: serde_json::Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => {
                return vec![Chunk::error(format!("JSON parse error in SSE data: {e}"))];
            }
        };

        match event {
            "message_start" => {
                if let Some(input) = json["message"]["usage"]["input_tokens"].as_u64() {
                    self.usage.input_tokens = input;
                }
                Vec::new()
            }
            "content_block_start" => {
                if json["content_block"]["type"] == "tool_use" {
                    let index = json["index"].as_u64().unwrap_or(0) as usize;
                    self.tool_blocks.insert(
                        index,
                        ToolUseInProgress {
                            id: json["content_block"]["id"].as_str().unwrap_or_default().into(),
                            name: json["content_block"]["name"]
                                .as_str()
                                .unwrap_or_default()
                                .into(),
                            input_buf: String::new(),
                        },
                    );
                }
                Vec::new()
            }
            "content_block_delta" => match json["delta"]["type"].as_str() {
                Some("text_delta") => {
                    let text = json["delta"]["text"].as_str().unwrap_or_default();
                    if text.is_empty() {
                        Vec::new()
                    } else {
                        vec![Chunk::text(text)]
                    }
                }
                Some("input_json_delta") => {
                    let index = json["index"].as_u64().unwrap_or(0) as usize;
                    if let Some(block) = self.tool_blocks.get_mut(&index) {
                        block.input_buf.push_str(
                            json["delta"]["partial_json"].as_str().unwrap_or_default(),
                        );
                    }
                    Vec::new()
                }
                _ => Vec::new(),
            },
            "content_block_stop" => {
                let index = json["index"].as_u64().unwrap_or(0) as usize;
                match self.tool_blocks.remove(&index) {
                    Some(block) => vec![Chunk::ToolCall {
                        tool_call: finish_tool_call(block),
                    }],
                    None => Vec::new(),
                }
            }
            "message_delta" => {
                if let Some(output) = json["usage"]["output_tokens"].as_u64() {
                    self.usage.output_tokens = output;
                }
                Vec::new()
            }
            "message_stop" => vec![Chunk::Done { usage: self.usage }],
            "error" => {
                let message = json["error"]["message"]
                    .as_str()
                    .unwrap_or("unknown stream error");
                vec![Chunk::error(format!("anthropic stream error: {message}"))]
            }
            // ping and future event types are ignored.
            _ => Vec::new(),
        }
    }
}

/// Parse an accumulated tool-input buffer into a tool call. A parse
/// failure degrades to empty-map arguments.
fn finish_tool_call(block: ToolUseInProgress) -> ToolCall {
    let arguments = if block.input_buf.trim().is_empty() {
        serde_json::Map::new()
    } else {
        serde_json::from_str::<serde_json::Value>(&block.input_buf)
            .ok()
            .and_then(|v| v.as_object().cloned())
            .unwrap_or_default()
    };
    ToolCall {
        id: block.id,
        name: block.name,
        arguments,
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(state: &mut SseParserState, event: &str, data: &str) -> Vec<Chunk> {
        assert!(state.process_line(&format!("event: {event}")).is_empty());
        assert!(state.process_line(&format!("data: {data}")).is_empty());
        state.process_line("")
    }

    #[test]
    fn text_deltas_become_text_chunks() {
        let mut state = SseParserState::new();
        let chunks = feed(
            &mut state,
            "content_block_delta",
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hi"}}"#,
        );
        assert_eq!(chunks, vec![Chunk::text("Hi")]);
    }

    #[test]
    fn empty_text_delta_is_skipped() {
        let mut state = SseParserState::new();
        let chunks = feed(
            &mut state,
            "content_block_delta",
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":""}}"#,
        );
        assert!(chunks.is_empty());
    }

    #[test]
    fn tool_use_input_accumulates_until_block_stop() {
        let mut state = SseParserState::new();
        feed(
            &mut state,
            "content_block_start",
            r#"{"index":1,"content_block":{"type":"tool_use","id":"tu_1","name":"shell"}}"#,
        );
        feed(
            &mut state,
            "content_block_delta",
            r#"{"index":1,"delta":{"type":"input_json_delta","partial_json":"{\"comm"}}"#,
        );
        feed(
            &mut state,
            "content_block_delta",
            r#"{"index":1,"delta":{"type":"input_json_delta","partial_json":"and\": \"ls\"}"}}"#,
        );
        let chunks = feed(&mut state, "content_block_stop", r#"{"index":1}"#);

        assert_eq!(chunks.len(), 1);
        match &chunks[0] {
            Chunk::ToolCall { tool_call } => {
                assert_eq!(tool_call.id, "tu_1");
                assert_eq!(tool_call.name, "shell");
                assert_eq!(tool_call.arguments["command"], "ls");
            }
            other => panic!("expected ToolCall, got: {other:?}"),
        }
    }

    #[test]
    fn malformed_tool_input_degrades_to_empty_arguments() {
        let mut state = SseParserState::new();
        feed(
            &mut state,
            "content_block_start",
            r#"{"index":0,"content_block":{"type":"tool_use","id":"tu_1","name":"shell"}}"#,
        );
        feed(
            &mut state,
            "content_block_delta",
            r#"{"index":0,"delta":{"type":"input_json_delta","partial_json":"{not json"}}"#,
        );
        let chunks = feed(&mut state, "content_block_stop", r#"{"index":0}"#);
        match &chunks[0] {
            Chunk::ToolCall { tool_call } => assert!(tool_call.arguments.is_empty()),
            other => panic!("expected ToolCall, got: {other:?}"),
        }
    }

    #[test]
    fn text_block_stop_emits_nothing() {
        let mut state = SseParserState::new();
        let chunks = feed(&mut state, "content_block_stop", r#"{"index":0}"#);
        assert!(chunks.is_empty());
    }

    #[test]
    fn usage_assembled_from_start_and_delta() {
        let mut state = SseParserState::new();
        feed(
            &mut state,
            "message_start",
            r#"{"message":{"usage":{"input_tokens":25}}}"#,
        );
        feed(
            &mut state,
            "message_delta",
            r#"{"delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":10}}"#,
        );
        let chunks = feed(&mut state, "message_stop", r#"{"type":"message_stop"}"#);
        assert_eq!(
            chunks,
            vec![Chunk::Done {
                usage: TokenUsage {
                    input_tokens: 25,
                    output_tokens: 10,
                }
            }]
        );
    }

    #[test]
    fn error_event_becomes_error_chunk() {
        let mut state = SseParserState::new();
        let chunks = feed(
            &mut state,
            "error",
            r#"{"error":{"type":"overloaded_error","message":"Overloaded"}}"#,
        );
        assert_eq!(chunks.len(), 1);
        assert!(matches!(&chunks[0], Chunk::Error { error } if error.contains("Overloaded")));
    }

    #[test]
    fn ping_is_ignored() {
        let mut state = SseParserState::new();
        let chunks = feed(&mut state, "ping", r#"{"type":"ping"}"#);
        assert!(chunks.is_empty());
    }

    #[test]
    fn invalid_json_data_yields_error_chunk() {
        let mut state = SseParserState::new();
        let chunks = feed(&mut state, "message_start", "{broken");
        assert!(matches!(&chunks[0], Chunk::Error { .. }));
    }

    #[test]
    fn multiline_data_is_joined() {
        let mut state = SseParserState::new();
        state.process_line("event: message_start");
        state.process_line(r#"data: {"message":{"usage":"#);
        state.process_line(r#"data: {"input_tokens":7}}}"#);
        let chunks = state.process_line("");
        assert!(chunks.is_empty());
        assert_eq!(state.usage.input_tokens, 7);
    }

    #[tokio::test]
    async fn full_stream_parse() {
        let frames = concat!(
            "event: message_start\n",
            "data: {\"message\":{\"usage\":{\"input_tokens\":9}}}\n",
            "\n",
            "event: content_block_delta\n",
            "data: {\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hello\"}}\n",
            "\n",
            "event: message_delta\n",
            "data: {\"usage\":{\"output_tokens\":3}}\n",
            "\n",
            "event: message_stop\n",
            "data: {\"type\":\"message_stop\"}\n",
            "\n",
        );
        let byte_stream = futures::stream::iter(vec![Ok::<_, reqwest::Error>(
            bytes::Bytes::from_static(frames.as_bytes()),
        )]);
        let chunks: Vec<Chunk> = parse_sse_stream(byte_stream).collect().await;

        assert_eq!(
            chunks,
            vec![
                Chunk::text("Hello"),
                Chunk::Done {
                    usage: TokenUsage {
                        input_tokens: 9,
                        output_tokens: 3,
                    }
                }
            ]
        );
    }

    #[tokio::test]
    async fn truncated_stream_ends_with_error_chunk() {
        let frames = concat!(
            "event: content_block_delta\n",
            "data: {\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"partial\"}}\n",
            "\n",
        );
        let byte_stream = futures::stream::iter(vec![Ok::<_, reqwest::Error>(
            bytes::Bytes::from_static(frames.as_bytes()),
        )]);
        let chunks: Vec<Chunk> = parse_sse_stream(byte_stream).collect().await;

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], Chunk::text("partial"));
        assert!(matches!(&chunks[1], Chunk::Error { .. }));
    }
}
