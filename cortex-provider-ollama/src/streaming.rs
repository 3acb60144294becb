//! NDJSON streaming support for the Ollama chat API.
//!
//! Ollama emits one JSON object per line:
//! ```text
//! {"model":"llama3.2","message":{"role":"assistant","content":"Hello"},"done":false}
//! {"model":"llama3.2","message":{"role":"assistant","content":""},"done":true,"eval_count":10,"prompt_eval_count":20}
//! ```
//!
//! Tool calls arrive whole (not as fragments); ids are synthesized since
//! Ollama does not assign them.

use cortex_types::{Chunk, ChunkStream, TokenUsage, ToolCall};
use futures::{Stream, StreamExt};
use reqwest::Response;

/// Wrap an HTTP response body into a [`ChunkStream`].
pub(crate) fn stream_completion(response: Response) -> ChunkStream {
    ChunkStream::new(parse_ndjson_stream(response.bytes_stream()))
}

fn parse_ndjson_stream(
    byte_stream: impl Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
) -> impl Stream<Item = Chunk> + Send + 'static {
    async_stream::stream! {
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

                if line.trim().is_empty() {
                    continue;
                }

                for chunk in process_line(&line) {
                    let terminal = chunk.is_terminal();
                    yield chunk;
                    if terminal {
                        return;
                    }
                }
            }
        }

        // Process a final line without a trailing newline.
        let remaining = line_buf.trim().to_string();
        if !remaining.is_empty() {
            for chunk in process_line(&remaining) {
                let terminal = chunk.is_terminal();
                yield chunk;
                if terminal {
                    return;
                }
            }
        }

        yield Chunk::error("stream ended before done message");
    }
}

/// Map a single NDJSON line to zero or more chunks.
fn process_line(line: &str) -> Vec<Chunk> {
    let json: serde_json::Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            return vec![Chunk::error(format!("JSON parse error in NDJSON: {e}"))];
        }
    };

    let mut chunks = Vec::new();

    let content = json["message"]["content"].as_str().unwrap_or_default();
    if !content.is_empty() {
        chunks.push(Chunk::text(content));
    }

    if let Some(tool_calls) = json["message"]["tool_calls"].as_array() {
        for tc in tool_calls {
            let function = &tc["function"];
            let id = tc["id"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| format!("ollama_{}", uuid::Uuid::new_v4()));
            chunks.push(Chunk::ToolCall {
                tool_call: ToolCall {
                    id,
                    name: function["name"].as_str().unwrap_or_default().to_string(),
                    arguments: parse_arguments(&function["arguments"]),
                },
            });
        }
    }

    if json["done"].as_bool().unwrap_or(false) {
        chunks.push(Chunk::Done {
            usage: TokenUsage {
                input_tokens: json["prompt_eval_count"].as_u64().unwrap_or(0),
                output_tokens: json["eval_count"].as_u64().unwrap_or(0),
            },
        });
    }

    chunks
}

/// Tool arguments arrive either as an object or as a JSON-encoded string
/// depending on the model; either way a parse failure degrades to an
/// empty map.
fn parse_arguments(value: &serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
    match value {
        serde_json::Value::Object(map) => map.clone(),
        serde_json::Value::String(s) => serde_json::from_str::<serde_json::Value>(s)
            .ok()
            .and_then(|v| v.as_object().cloned())
            .unwrap_or_default(),
        _ => serde_json::Map::new(),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
