pub mod client;
pub mod stdio_transport;
pub mod transport;

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::McpConfig;
use crate::errors::{SeeClawError, SeeClawResult};
use crate::llm::tools::mcp_tool_name;
use crate::llm::types::ToolDef;
use crate::mcp::client::McpClient;
use crate::mcp::stdio_transport::StdioTransport;

/// Source of extra callable tools for the planner.
#[async_trait]
pub trait ExtensionRegistry: Send + Sync {
    /// Tool definitions named `mcp__<server>__<tool>`.
    fn tool_defs(&self) -> Vec<ToolDef>;

    async fn call_tool(&self, server: &str, tool: &str, arguments: Value) -> SeeClawResult<String>;
}

/// Registry with nothing in it.
pub struct NoExtensions;

#[async_trait]
impl ExtensionRegistry for NoExtensions {
    fn tool_defs(&self) -> Vec<ToolDef> {
        Vec::new()
    }

    async fn call_tool(&self, server: &str, tool: &str, _arguments: Value) -> SeeClawResult<String> {
        Err(SeeClawError::Mcp(format!("no MCP server '{server}' for tool '{tool}'")))
    }
}

/// Connected MCP servers keyed by configured name.
#[derive(Default)]
pub struct McpRegistry {
    clients: HashMap<String, McpClient>,
}

impl McpRegistry {
    pub fn insert(&mut self, client: McpClient) {
        self.clients.insert(client.server_name().to_string(), client);
    }

    /// Start every enabled server. A server that fails to start is logged and skipped.
    pub async fn connect_all(config: &McpConfig) -> Self {
        let mut registry = Self::default();
        for server in config.servers.iter().filter(|s| s.enabled) {
            let transport = match StdioTransport::spawn(&server.command, &server.args) {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!(server = %server.name, error = %e, "MCP server failed to start");
                    continue;
                }
            };
            match McpClient::connect(server.name.clone(), Box::new(transport)).await {
                Ok(client) => registry.insert(client),
                Err(e) => tracing::warn!(server = %server.name, error = %e, "MCP handshake failed"),
            }
        }
        registry
    }

    pub fn server_names(&self) -> Vec<&str> {
        self.clients.keys().map(String::as_str).collect()
    }
}

#[async_trait]
impl ExtensionRegistry for McpRegistry {
    fn tool_defs(&self) -> Vec<ToolDef> {
        let mut defs: Vec<ToolDef> = self
            .clients
            .values()
            .flat_map(|client| {
                client.tools().iter().map(move |tool| {
                    ToolDef::function(
                        mcp_tool_name(client.server_name(), &tool.name),
                        format!("[MCP {}] {}", client.server_name(), tool.description),
                        tool.input_schema.clone(),
                    )
                })
            })
            .collect();
        defs.sort_by(|a, b| a.name().cmp(b.name()));
        defs
    }

    async fn call_tool(&self, server: &str, tool: &str, arguments: Value) -> SeeClawResult<String> {
        let client = self
            .clients
            .get(server)
            .ok_or_else(|| SeeClawError::Mcp(format!("MCP server '{server}' is not connected")))?;
        client.call_tool(tool, arguments).await
    }
}
