//! Size-capped web fetch tool.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;

use crate::definition::{ToolParameter, ToolResult};
use crate::{Arguments, Tool, ToolKind};

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default response size cap: 10 MiB.
const DEFAULT_MAX_RESPONSE_SIZE: usize = 10 * 1024 * 1024;

const DEFAULT_USER_AGENT: &str = concat!("cortex/", env!("CARGO_PKG_VERSION"));

/// Built-in tool for fetching web content over HTTP GET.
///
/// The response size cap is enforced twice: a `Content-Length` precheck
/// rejects oversized responses before the body is read, and the streamed
/// byte count aborts mid-body when a response lies about (or omits) its
/// length.
pub struct WebFetchTool {
    timeout: Duration,
    max_response_size: usize,
    user_agent: String,
    client: reqwest::Client,
}

impl WebFetchTool {
    /// Create a tool with the default timeout, size cap, and user agent.
    #[must_use]
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_response_size: DEFAULT_MAX_RESPONSE_SIZE,
            user_agent: DEFAULT_USER_AGENT.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Override the request timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the response size cap.
    #[must_use]
    pub fn max_response_size(mut self, bytes: usize) -> Self {
        self.max_response_size = bytes;
        self
    }
}

impl Default for WebFetchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "web_fetch"
    }

    fn description(&self) -> &str {
        "Fetch content from a URL using HTTP GET. \
         Returns the response body, status code, and headers."
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Builtin
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::new("url", "string", "The URL to fetch").required(true),
            ToolParameter::new(
                "headers",
                "object",
                "Custom HTTP headers as key-value pairs (optional)",
            ),
            ToolParameter::new(
                "timeout",
                "number",
                "Request timeout in seconds (optional, overrides default)",
            ),
        ]
    }

    async fn execute(&self, arguments: Arguments) -> ToolResult {
        let url = arguments
            .get("url")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let timeout = arguments
            .get("timeout")
            .and_then(|v| v.as_f64())
            .map(Duration::from_secs_f64)
            .unwrap_or(self.timeout);

        if !url.starts_with("http://") && !url.starts_with("https://") {
            return ToolResult::error(self.name(), "URL must start with http:// or https://");
        }

        tracing::info!(url = %url, "fetching URL");

        let mut request = self
            .client
            .get(&url)
            .timeout(timeout)
            .header("user-agent", &self.user_agent);
        if let Some(headers) = arguments.get("headers").and_then(|v| v.as_object()) {
            for (name, value) in headers {
                if let Some(value) = value.as_str() {
                    request = request.header(name, value);
                }
            }
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return ToolResult::error(
                    self.name(),
                    format!("Request timed out after {} seconds", timeout.as_secs_f64()),
                )
                .with_metadata("url", json!(url));
            }
            Err(e) => {
                return ToolResult::error(self.name(), format!("Request failed: {e}"))
                    .with_metadata("url", json!(url));
            }
        };

        let status_code = response.status().as_u16();
        let final_url = response.url().to_string();

        // Content-Length precheck before touching the body.
        if let Some(length) = response.content_length()
            && length as usize > self.max_response_size
        {
            return ToolResult::error(
                self.name(),
                format!(
                    "Response too large: {length} bytes (max: {})",
                    self.max_response_size
                ),
            )
            .with_metadata("url", json!(url))
            .with_metadata("status_code", json!(status_code))
            .with_metadata("content_length", json!(length));
        }

        let response_headers: serde_json::Map<String, serde_json::Value> = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    json!(String::from_utf8_lossy(value.as_bytes())),
                )
            })
            .collect();
        let content_type = response_headers.get("content-type").cloned();

        // Stream the body with byte-count enforcement.
        let mut body = Vec::new();
        let mut byte_stream = response.bytes_stream();
        while let Some(chunk) = byte_stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    return ToolResult::error(self.name(), format!("Request failed: {e}"))
                        .with_metadata("url", json!(url));
                }
            };
            body.extend_from_slice(&chunk);
            if body.len() > self.max_response_size {
                return ToolResult::error(
                    self.name(),
                    format!(
                        "Response exceeded max size of {} bytes",
                        self.max_response_size
                    ),
                )
                .with_metadata("url", json!(url))
                .with_metadata("status_code", json!(status_code));
            }
        }

        let size = body.len();
        let content = decode_body(body);
        let success = (200..300).contains(&status_code);

        tracing::info!(status_code, size, "web fetch completed");

        let output = json!({
            "content": content,
            "status_code": status_code,
            "headers": response_headers,
            "url": final_url,
        });

        let mut result = if success {
            ToolResult::success(self.name(), output)
        } else {
            let mut error = ToolResult::error(self.name(), format!("HTTP {status_code}"));
            error.output = Some(output);
            error
        };
        result = result
            .with_metadata("url", json!(url))
            .with_metadata("final_url", json!(final_url))
            .with_metadata("status_code", json!(status_code))
            .with_metadata("size", json!(size));
        if let Some(content_type) = content_type {
            result = result.with_metadata("content_type", content_type);
        }
        result
    }
}

/// Decode a body as UTF-8, falling back to a latin-1 interpretation (which
/// never fails) for legacy encodings.
fn decode_body(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(from_utf8) => from_utf8
            .into_bytes()
            .iter()
            .map(|&b| b as char)
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn args(pairs: &[(&str, Value)]) -> Arguments {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn rejects_non_http_urls() {
        let tool = WebFetchTool::new();
        for url in ["ftp://example.com/file", "file:///etc/passwd", "example.com"] {
            let result = tool.execute(args(&[("url", json!(url))])).await;
            assert!(result.is_error(), "should reject: {url}");
            assert!(result
                .error
                .as_deref()
                .unwrap()
                .contains("http:// or https://"));
        }
    }

    #[tokio::test]
    async fn connection_failure_is_an_error_result() {
        let tool = WebFetchTool::new().timeout(Duration::from_millis(300));
        // Nothing listens on this port.
        let result = tool
            .execute(args(&[("url", json!("http://127.0.0.1:1/nope"))]))
            .await;
        assert!(result.is_error());
    }

    #[test]
    fn decode_body_utf8_and_latin1() {
        assert_eq!(decode_body(b"hello".to_vec()), "hello");
        // 0xE9 is 'é' in latin-1 but invalid standalone UTF-8.
        assert_eq!(decode_body(vec![0x63, 0x61, 0x66, 0xE9]), "café");
    }

    #[test]
    fn builder_overrides() {
        let tool = WebFetchTool::new()
            .timeout(Duration::from_secs(5))
            .max_response_size(1024);
        assert_eq!(tool.timeout, Duration::from_secs(5));
        assert_eq!(tool.max_response_size, 1024);
    }

    #[test]
    fn definition_lists_three_parameters() {
        let tool = WebFetchTool::new();
        let def = tool.definition();
        assert_eq!(def.parameters.len(), 3);
        assert!(def.parameters[0].required);
    }
}
