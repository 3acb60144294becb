//! Per-server lifecycle management and tool surface composition.

use std::collections::HashMap;
use std::sync::Arc;

use cortex_tool::Tool;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::client::McpClient;
use crate::error::McpError;
use crate::tool::McpTool;

/// Inventory entry for one registered server.
#[derive(Debug, Clone, Serialize)]
pub struct McpServerStatus {
    /// Caller-assigned server id.
    pub id: String,
    /// Whether the client is connected.
    pub connected: bool,
    /// The spawn command line.
    pub command: String,
    /// Number of tools the server advertises.
    pub tool_count: usize,
    /// Server name from the handshake.
    pub name: String,
    /// Server version from the handshake.
    pub version: String,
}

/// Owns one [`McpClient`] per server id.
pub struct McpManager {
    servers: RwLock<HashMap<String, Arc<McpClient>>>,
}

impl McpManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self {
            servers: RwLock::new(HashMap::new()),
        }
    }

    /// Spawn and connect a new server under `server_id`. A duplicate id
    /// is an error and spawns nothing.
    pub async fn add_server(
        &self,
        server_id: impl Into<String>,
        command: Vec<String>,
        env: HashMap<String, String>,
    ) -> Result<(), McpError> {
        let server_id = server_id.into();
        {
            let servers = self.servers.read().await;
            if servers.contains_key(&server_id) {
                return Err(McpError::DuplicateServer(server_id));
            }
        }

        let client = Arc::new(McpClient::connect(command, env).await?);

        let mut servers = self.servers.write().await;
        if servers.contains_key(&server_id) {
            // Lost a race with a concurrent add of the same id.
            client.disconnect().await;
            return Err(McpError::DuplicateServer(server_id));
        }
        tracing::info!(server_id = %server_id, "added MCP server");
        servers.insert(server_id, client);
        Ok(())
    }

    /// Disconnect and evict a server. Returns whether it was present.
    pub async fn remove_server(&self, server_id: &str) -> bool {
        let client = self.servers.write().await.remove(server_id);
        match client {
            Some(client) => {
                client.disconnect().await;
                tracing::info!(server_id = %server_id, "removed MCP server");
                true
            }
            None => false,
        }
    }

    /// The client registered under `server_id`, if any.
    pub async fn get_server(&self, server_id: &str) -> Option<Arc<McpClient>> {
        self.servers.read().await.get(server_id).cloned()
    }

    /// Inventory of all registered servers, sorted by id.
    pub async fn list_servers(&self) -> Vec<McpServerStatus> {
        let servers = self.servers.read().await;
        let mut statuses: Vec<McpServerStatus> = servers
            .iter()
            .map(|(id, client)| McpServerStatus {
                id: id.clone(),
                connected: client.is_connected(),
                command: client.command_line(),
                tool_count: client.tools().len(),
                name: client.server_info().name.clone(),
                version: client.server_info().version.clone(),
            })
            .collect();
        statuses.sort_by(|a, b| a.id.cmp(&b.id));
        statuses
    }

    /// Every connected server's tools, wrapped in the common tool
    /// interface.
    pub async fn all_tools(&self) -> Vec<Arc<dyn Tool>> {
        let servers = self.servers.read().await;
        let mut tools: Vec<Arc<dyn Tool>> = Vec::new();
        for client in servers.values() {
            if !client.is_connected() {
                continue;
            }
            for def in client.tools() {
                tools.push(Arc::new(McpTool::new(client.clone(), def)));
            }
        }
        tools
    }

    /// Tools from one server only.
    pub async fn server_tools(&self, server_id: &str) -> Vec<Arc<dyn Tool>> {
        let Some(client) = self.get_server(server_id).await else {
            return Vec::new();
        };
        if !client.is_connected() {
            return Vec::new();
        }
        client
            .tools()
            .into_iter()
            .map(|def| Arc::new(McpTool::new(client.clone(), def)) as Arc<dyn Tool>)
            .collect()
    }

    /// Disconnect every server in parallel and clear the registry.
    pub async fn shutdown_all(&self) {
        let clients: Vec<Arc<McpClient>> = self.servers.write().await.drain().map(|(_, c)| c).collect();
        futures::future::join_all(clients.iter().map(|client| client.disconnect())).await;
        tracing::info!("shut down all MCP servers");
    }
}

impl Default for McpManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Same scripted stub server as the client tests.
    fn stub_command() -> Vec<String> {
        let script = concat!(
            r#"read line; printf '%s\n' '{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-11-05","serverInfo":{"name":"demo","version":"1.0"},"capabilities":{"tools":{}}}}'; "#,
            r#"read line; "#,
            r#"read line; printf '%s\n' '{"jsonrpc":"2.0","id":2,"result":{"tools":[{"name":"ping","description":"Ping the server","inputSchema":{"type":"object","properties":{},"required":[]}}]}}'; "#,
            r#"read line; printf '%s\n' '{"jsonrpc":"2.0","id":3,"result":{"content":[{"type":"text","text":"pong"}],"isError":false}}'; "#,
            r#"cat > /dev/null"#,
        );
        vec!["sh".into(), "-c".into(), script.into()]
    }

    #[tokio::test]
    async fn add_list_remove_lifecycle() {
        let manager = McpManager::new();
        manager
            .add_server("demo", stub_command(), HashMap::new())
            .await
            .unwrap();

        let statuses = manager.list_servers().await;
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].id, "demo");
        assert_eq!(statuses[0].name, "demo");
        assert!(statuses[0].connected);
        assert_eq!(statuses[0].tool_count, 1);

        let tools = manager.all_tools().await;
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name(), "ping");

        assert!(manager.remove_server("demo").await);
        assert!(manager.list_servers().await.is_empty());
        assert!(manager.all_tools().await.is_empty());
        assert!(!manager.remove_server("demo").await);
    }

    #[tokio::test]
    async fn duplicate_id_is_an_error() {
        let manager = McpManager::new();
        manager
            .add_server("demo", stub_command(), HashMap::new())
            .await
            .unwrap();
        let err = manager
            .add_server("demo", stub_command(), HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::DuplicateServer(id) if id == "demo"));
        manager.shutdown_all().await;
    }

    #[tokio::test]
    async fn mcp_tool_executes_through_router_interface() {
        let manager = McpManager::new();
        manager
            .add_server("demo", stub_command(), HashMap::new())
            .await
            .unwrap();

        let tools = manager.all_tools().await;
        let ping = &tools[0];
        let result = ping.execute(cortex_tool::Arguments::new()).await;
        assert!(result.is_success(), "unexpected: {:?}", result.error);
        assert_eq!(result.output, Some(serde_json::json!("pong")));

        manager.shutdown_all().await;
    }

    #[tokio::test]
    async fn failed_connect_registers_nothing() {
        let manager = McpManager::new();
        let err = manager
            .add_server(
                "broken",
                vec!["definitely-not-a-real-binary-xyz".into()],
                HashMap::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::Spawn(_)));
        assert!(manager.list_servers().await.is_empty());
    }

    #[tokio::test]
    async fn shutdown_all_clears_registry() {
        let manager = McpManager::new();
        manager
            .add_server("a", stub_command(), HashMap::new())
            .await
            .unwrap();
        manager
            .add_server("b", stub_command(), HashMap::new())
            .await
            .unwrap();
        manager.shutdown_all().await;
        assert!(manager.list_servers().await.is_empty());
    }
}
