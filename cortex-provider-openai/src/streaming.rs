//! SSE streaming support for the chat-completions API.
//!
//! The wire format is `data: {json}` lines terminated by `data: [DONE]`.
//! Tool-call arguments arrive as string fragments indexed per call; they
//! are accumulated until the model reports a finish reason, then parsed
//! once — a parse failure yields empty-map arguments, not an error.

use std::collections::BTreeMap;

use cortex_types::{Chunk, ChunkStream, TokenUsage, ToolCall};
use futures::{Stream, StreamExt};
use reqwest::Response;

/// Wrap an HTTP response body into a [`ChunkStream`].
pub(crate) fn stream_completion(response: Response) -> ChunkStream {
    ChunkStream::new(parse_sse_stream(response.bytes_stream()))
}

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

        yield Chunk::error("stream ended before [DONE]");
    }
}

/// In-progress tool call being assembled from indexed deltas.
#[derive(Default)]
struct ToolCallInProgress {
    id: String,
    name: String,
    arguments_buf: String,
}

/// Tracks in-progress streaming state across data lines.
struct SseParserState {
    /// Tool calls keyed by index; BTreeMap keeps flush order stable.
    tool_calls: BTreeMap<u64, ToolCallInProgress>,
    /// Whether the finish reason has been seen (tool calls flushed).
    finished: bool,
    /// Usage from the trailing include_usage chunk.
    usage: TokenUsage,
}

impl SseParserState {
    fn new() -> Self {
        Self {
            tool_calls: BTreeMap::new(),
            finished: false,
            usage: TokenUsage::default(),
        }
    }

    /// Process a single SSE line and return any chunks it produces.
    fn process_line(&mut self, line: &str) -> Vec<Chunk> {
        let Some(data) = line.strip_prefix("data:") else {
            return Vec::new();
        };
        let data = data.trim();

        if data == "[DONE]" {
            return vec![Chunk::Done { usage: self.usage }];
        }

        let json: serde_json::Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => {
                return vec![Chunk::error(format!("JSON parse error in SSE data: {e}"))];
            }
        };

        let mut chunks = Vec::new();

        // The trailing usage chunk has an empty choices array.
        if let Some(usage) = json.get("usage").filter(|u| u.is_object()) {
            self.usage = TokenUsage {
                input_tokens: usage["prompt_tokens"].as_u64().unwrap_or(0),
                output_tokens: usage["completion_tokens"].as_u64().unwrap_or(0),
            };
        }

        let Some(choice) = json["choices"].get(0) else {
            return chunks;
        };
        let delta = &choice["delta"];

        if let Some(content) = delta["content"].as_str()
            && !content.is_empty()
        {
            chunks.push(Chunk::text(content));
        }

        if let Some(deltas) = delta["tool_calls"].as_array() {
            for tc_delta in deltas {
                let index = tc_delta["index"].as_u64().unwrap_or(0);
                let entry = self.tool_calls.entry(index).or_default();
                if let Some(id) = tc_delta["id"].as_str() {
                    entry.id = id.to_string();
                }
                if let Some(name) = tc_delta["function"]["name"].as_str() {
                    entry.name = name.to_string();
                }
                if let Some(fragment) = tc_delta["function"]["arguments"].as_str() {
                    entry.arguments_buf.push_str(fragment);
                }
            }
        }

        if !choice["finish_reason"].is_null() && !self.finished {
            self.finished = true;
            for (_, in_progress) in std::mem::take(&mut self.tool_calls) {
                chunks.push(Chunk::ToolCall {
                    tool_call: finish_tool_call(in_progress),
                });
            }
        }

        chunks
    }
}

/// Parse an accumulated argument buffer into a tool call. A parse failure
/// degrades to empty-map arguments.
fn finish_tool_call(in_progress: ToolCallInProgress) -> ToolCall {
    let arguments = serde_json::from_str::<serde_json::Value>(&in_progress.arguments_buf)
        .ok()
        .and_then(|v| v.as_object().cloned())
        .unwrap_or_default();
    ToolCall {
        id: in_progress.id,
        name: in_progress.name,
        arguments,
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_deltas_become_text_chunks() {
        let mut state = SseParserState::new();
        let chunks = state.process_line(
            r#"data: {"choices":[{"index":0,"delta":{"content":"Hello"},"finish_reason":null}]}"#,
        );
        assert_eq!(chunks, vec![Chunk::text("Hello")]);
    }

    #[test]
    fn non_data_lines_ignored() {
        let mut state = SseParserState::new();
        assert!(state.process_line(": keepalive").is_empty());
        assert!(state.process_line("").is_empty());
    }

    #[test]
    fn tool_call_fragments_accumulate_until_finish() {
        let mut state = SseParserState::new();
        state.process_line(
            r#"data: {"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"shell","arguments":""}}]},"finish_reason":null}]}"#,
        );
        state.process_line(
            r#"data: {"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"comm"}}]},"finish_reason":null}]}"#,
        );
        let chunks = state.process_line(
            r#"data: {"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"and\":\"ls\"}"}}]},"finish_reason":"tool_calls"}]}"#,
        );

        assert_eq!(chunks.len(), 1);
        match &chunks[0] {
            Chunk::ToolCall { tool_call } => {
                assert_eq!(tool_call.id, "call_1");
                assert_eq!(tool_call.name, "shell");
                assert_eq!(tool_call.arguments["command"], "ls");
            }
            other => panic!("expected ToolCall, got: {other:?}"),
        }
    }

    #[test]
    fn multiple_tool_calls_flush_in_index_order() {
        let mut state = SseParserState::new();
        state.process_line(
            r#"data: {"choices":[{"index":0,"delta":{"tool_calls":[{"index":1,"id":"call_b","function":{"name":"b","arguments":"{}"}},{"index":0,"id":"call_a","function":{"name":"a","arguments":"{}"}}]},"finish_reason":null}]}"#,
        );
        let chunks = state
            .process_line(r#"data: {"choices":[{"index":0,"delta":{},"finish_reason":"tool_calls"}]}"#);

        let names: Vec<&str> = chunks
            .iter()
            .filter_map(|c| match c {
                Chunk::ToolCall { tool_call } => Some(tool_call.name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn malformed_arguments_degrade_to_empty_map() {
        let mut state = SseParserState::new();
        state.process_line(
            r#"data: {"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"shell","arguments":"{broken"}}]},"finish_reason":null}]}"#,
        );
        let chunks =
            state.process_line(r#"data: {"choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#);
        match &chunks[0] {
            Chunk::ToolCall { tool_call } => assert!(tool_call.arguments.is_empty()),
            other => panic!("expected ToolCall, got: {other:?}"),
        }
    }

    #[test]
    fn usage_chunk_then_done() {
        let mut state = SseParserState::new();
        state.process_line(r#"data: {"choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#);
        state.process_line(
            r#"data: {"choices":[],"usage":{"prompt_tokens":12,"completion_tokens":5}}"#,
        );
        let chunks = state.process_line("data: [DONE]");
        assert_eq!(
            chunks,
            vec![Chunk::Done {
                usage: TokenUsage {
                    input_tokens: 12,
                    output_tokens: 5,
                }
            }]
        );
    }

    #[test]
    fn invalid_json_yields_error_chunk() {
        let mut state = SseParserState::new();
        let chunks = state.process_line("data: {broken");
        assert!(matches!(&chunks[0], Chunk::Error { .. }));
    }

    #[tokio::test]
    async fn full_stream_parse() {
        let frames = concat!(
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hi\"},\"finish_reason\":null}]}\n",
            "\n",
            "data: {\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n",
            "\n",
            "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":4,\"completion_tokens\":1}}\n",
            "\n",
            "data: [DONE]\n",
            "\n",
        );
        let byte_stream = futures::stream::iter(vec![Ok::<_, reqwest::Error>(
            bytes::Bytes::from_static(frames.as_bytes()),
        )]);
        let chunks: Vec<Chunk> = parse_sse_stream(byte_stream).collect().await;

        assert_eq!(
            chunks,
            vec![
                Chunk::text("Hi"),
                Chunk::Done {
                    usage: TokenUsage {
                        input_tokens: 4,
                        output_tokens: 1,
                    }
                }
            ]
        );
    }

    #[tokio::test]
    async fn truncated_stream_ends_with_error_chunk() {
        let frames = "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"partial\"},\"finish_reason\":null}]}\n\n";
        let byte_stream = futures::stream::iter(vec![Ok::<_, reqwest::Error>(
            bytes::Bytes::from_static(frames.as_bytes()),
        )]);
        let chunks: Vec<Chunk> = parse_sse_stream(byte_stream).collect().await;
        assert_eq!(chunks[0], Chunk::text("partial"));
        assert!(matches!(&chunks[1], Chunk::Error { .. }));
    }
}
