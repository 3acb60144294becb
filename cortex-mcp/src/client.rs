//! The stdio JSON-RPC client.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

use crate::error::McpError;
use crate::types::{McpServerInfo, McpToolDef};
use crate::PROTOCOL_VERSION;

/// Per-request response timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Grace window between closing stdin and killing the process.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// The serialized half of the connection. Requests and responses share
/// one pipe pair, so the call-site must hold this lock for a full
/// round-trip — the connection is not reentrancy-safe.
struct ClientIo {
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
}

/// Client for one MCP server reached over child-process stdio.
pub struct McpClient {
    command: Vec<String>,
    io: Mutex<ClientIo>,
    child: Mutex<Child>,
    server_info: McpServerInfo,
    tools: std::sync::RwLock<HashMap<String, McpToolDef>>,
    request_id: AtomicU64,
    connected: AtomicBool,
}

impl McpClient {
    /// Spawn the server process and run the handshake: `initialize`,
    /// `notifications/initialized`, then `tools/list`.
    pub async fn connect(
        command: Vec<String>,
        env: HashMap<String, String>,
    ) -> Result<Self, McpError> {
        let program = command
            .first()
            .ok_or_else(|| McpError::Spawn("empty command".into()))?;

        tracing::info!(command = %command.join(" "), "starting MCP server");

        let mut child = Command::new(program)
            .args(&command[1..])
            .envs(&env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| McpError::Spawn(e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::Spawn("child has no stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::Spawn("child has no stdout".into()))?;

        let mut io = ClientIo {
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
        };
        let mut next_id = 0u64;

        let handshake = Self::handshake(&mut io, &mut next_id).await;
        let (server_info, tools) = match handshake {
            Ok(parts) => parts,
            Err(e) => {
                // Tear the process down before surfacing the failure.
                let _ = child.start_kill();
                let _ = child.wait().await;
                return Err(e);
            }
        };

        tracing::info!(
            server = %server_info.name,
            version = %server_info.version,
            tools = tools.len(),
            "connected to MCP server"
        );

        Ok(Self {
            command,
            io: Mutex::new(io),
            child: Mutex::new(child),
            server_info,
            tools: std::sync::RwLock::new(tools),
            request_id: AtomicU64::new(next_id),
            connected: AtomicBool::new(true),
        })
    }

    async fn handshake(
        io: &mut ClientIo,
        next_id: &mut u64,
    ) -> Result<(McpServerInfo, HashMap<String, McpToolDef>), McpError> {
        *next_id += 1;
        let init_result = round_trip(
            io,
            *next_id,
            "initialize",
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {"tools": {}},
                "clientInfo": {
                    "name": "cortex",
                    "version": env!("CARGO_PKG_VERSION"),
                },
            }),
        )
        .await?;

        let server_info = McpServerInfo {
            name: init_result["serverInfo"]["name"]
                .as_str()
                .unwrap_or("Unknown")
                .to_string(),
            version: init_result["serverInfo"]["version"]
                .as_str()
                .unwrap_or("0.0.0")
                .to_string(),
            protocol_version: init_result["protocolVersion"]
                .as_str()
                .unwrap_or(PROTOCOL_VERSION)
                .to_string(),
            capabilities: init_result["capabilities"].clone(),
        };

        send_notification(io, "notifications/initialized", None).await?;

        *next_id += 1;
        let list_result = round_trip(io, *next_id, "tools/list", json!({})).await?;
        let mut tools = HashMap::new();
        if let Some(entries) = list_result["tools"].as_array() {
            for entry in entries {
                match serde_json::from_value::<McpToolDef>(entry.clone()) {
                    Ok(def) => {
                        tools.insert(def.name.clone(), def);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "skipping malformed tool definition");
                    }
                }
            }
        }

        Ok((server_info, tools))
    }

    /// Whether the handshake completed and `disconnect` has not run.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// The command line this client was spawned with.
    pub fn command_line(&self) -> String {
        self.command.join(" ")
    }

    /// The server identity from the handshake.
    pub fn server_info(&self) -> &McpServerInfo {
        &self.server_info
    }

    /// The cached tool definitions from `tools/list`.
    pub fn tools(&self) -> Vec<McpToolDef> {
        let tools = self.tools.read().expect("tool cache lock poisoned");
        let mut defs: Vec<McpToolDef> = tools.values().cloned().collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Call a tool on the server via `tools/call`.
    ///
    /// A response timeout is an error for this call only — the connection
    /// stays up.
    pub async fn call_tool(&self, tool_name: &str, arguments: Value) -> Result<Value, McpError> {
        if !self.is_connected() {
            return Err(McpError::NotConnected);
        }
        {
            let tools = self.tools.read().expect("tool cache lock poisoned");
            if !tools.contains_key(tool_name) {
                return Err(McpError::ToolNotFound(tool_name.to_string()));
            }
        }

        let id = self.request_id.fetch_add(1, Ordering::SeqCst) + 1;
        let mut io = self.io.lock().await;
        round_trip(
            &mut io,
            id,
            "tools/call",
            json!({
                "name": tool_name,
                "arguments": arguments,
            }),
        )
        .await
    }

    /// Disconnect: close stdin so the server exits on EOF, wait up to the
    /// grace window, then kill.
    pub async fn disconnect(&self) {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return;
        }

        {
            let mut io = self.io.lock().await;
            io.stdin.take();
        }

        let mut child = self.child.lock().await;
        match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
            Ok(Ok(status)) => {
                tracing::info!(status = %status, "MCP server exited");
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "error waiting for MCP server");
            }
            Err(_elapsed) => {
                tracing::warn!("MCP server did not exit in grace window, killing");
                let _ = child.start_kill();
                let _ = child.wait().await;
            }
        }
    }
}

/// Send one request and read its response, all under the request timeout.
async fn round_trip(
    io: &mut ClientIo,
    id: u64,
    method: &str,
    params: Value,
) -> Result<Value, McpError> {
    let request = json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params,
    });
    write_frame(io, &request).await?;

    match tokio::time::timeout(REQUEST_TIMEOUT, read_response(io, id)).await {
        Ok(result) => result,
        Err(_elapsed) => {
            tracing::error!(method, "timeout waiting for MCP response");
            Err(McpError::Timeout {
                method: method.to_string(),
            })
        }
    }
}

/// Send a notification (no id, no response).
async fn send_notification(
    io: &mut ClientIo,
    method: &str,
    params: Option<Value>,
) -> Result<(), McpError> {
    let mut notification = json!({
        "jsonrpc": "2.0",
        "method": method,
    });
    if let Some(params) = params {
        notification["params"] = params;
    }
    write_frame(io, &notification).await
}

async fn write_frame(io: &mut ClientIo, frame: &Value) -> Result<(), McpError> {
    let stdin = io.stdin.as_mut().ok_or(McpError::NotConnected)?;
    let mut line = frame.to_string();
    line.push('\n');
    stdin.write_all(line.as_bytes()).await?;
    stdin.flush().await?;
    Ok(())
}

/// Read frames until the response with the expected id arrives.
///
/// Malformed frames, server-initiated notifications, and stale responses
/// (e.g. an answer to a previously timed-out request) are logged and
/// dropped.
async fn read_response(io: &mut ClientIo, expected_id: u64) -> Result<Value, McpError> {
    loop {
        let mut line = String::new();
        let read = io.stdout.read_line(&mut line).await?;
        if read == 0 {
            return Err(McpError::ConnectionClosed);
        }
        if line.trim().is_empty() {
            continue;
        }

        let frame: Value = match serde_json::from_str(&line) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed MCP frame");
                continue;
            }
        };

        let Some(id) = frame["id"].as_u64() else {
            tracing::debug!("dropping MCP notification frame");
            continue;
        };
        if id != expected_id {
            tracing::warn!(got = id, expected = expected_id, "dropping stale MCP response");
            continue;
        }

        if let Some(error) = frame.get("error").filter(|e| !e.is_null()) {
            return Err(McpError::Rpc {
                code: error["code"].as_i64().unwrap_or(0),
                message: error["message"].as_str().unwrap_or("unknown").to_string(),
            });
        }

        return Ok(frame["result"].clone());
    }
}
