//! MCP error type.

use thiserror::Error;

/// Errors from the MCP client and manager.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum McpError {
    /// The server process could not be spawned.
    #[error("failed to spawn MCP server: {0}")]
    Spawn(String),

    /// Reading from or writing to the server's stdio failed.
    #[error("MCP I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No response arrived within the per-request timeout. The connection
    /// is kept; the caller reports a tool-level error.
    #[error("timeout waiting for response to {method}")]
    Timeout {
        /// The request method that timed out.
        method: String,
    },

    /// The server answered with a JSON-RPC error object.
    #[error("MCP error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// JSON-RPC error message.
        message: String,
    },

    /// The server closed the connection.
    #[error("MCP server closed connection")]
    ConnectionClosed,

    /// The client is not connected.
    #[error("not connected to MCP server")]
    NotConnected,

    /// The requested tool is not advertised by the server.
    #[error("tool '{0}' not found on MCP server")]
    ToolNotFound(String),

    /// A server with this id is already registered.
    #[error("server '{0}' already exists")]
    DuplicateServer(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats() {
        assert_eq!(
            McpError::Timeout {
                method: "tools/call".into()
            }
            .to_string(),
            "timeout waiting for response to tools/call"
        );
        assert_eq!(
            McpError::Rpc {
                code: -32601,
                message: "method not found".into()
            }
            .to_string(),
            "MCP error -32601: method not found"
        );
        assert_eq!(
            McpError::DuplicateServer("demo".into()).to_string(),
            "server 'demo' already exists"
        );
    }
}
