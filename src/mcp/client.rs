use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::errors::{SeeClawError, SeeClawResult};
use crate::mcp::transport::McpTransport;

pub const PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpTool {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "inputSchema", default = "empty_schema")]
    pub input_schema: Value,
}

fn empty_schema() -> Value {
    json!({"type": "object", "properties": {}})
}

/// One initialized MCP server connection.
pub struct McpClient {
    server_name: String,
    transport: Box<dyn McpTransport>,
    tools: Vec<McpTool>,
}

impl McpClient {
    /// Run the `initialize` handshake and discover the server's tools.
    pub async fn connect(server_name: impl Into<String>, transport: Box<dyn McpTransport>) -> SeeClawResult<Self> {
        let server_name = server_name.into();
        let init = transport
            .request(
                "initialize",
                Some(json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": "seeclaw",
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                })),
            )
            .await?;
        tracing::debug!(server = %server_name, info = %init["serverInfo"], "MCP server initialized");
        transport.notify("notifications/initialized", None).await?;

        let mut client = Self {
            server_name,
            transport,
            tools: Vec::new(),
        };
        client.tools = client.list_tools().await?;
        tracing::info!(server = %client.server_name, tools = client.tools.len(), "MCP server connected");
        Ok(client)
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn tools(&self) -> &[McpTool] {
        &self.tools
    }

    pub async fn list_tools(&self) -> SeeClawResult<Vec<McpTool>> {
        let result = self.transport.request("tools/list", None).await?;
        let tools = result["tools"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|t| match serde_json::from_value::<McpTool>(t.clone()) {
                        Ok(tool) => Some(tool),
                        Err(e) => {
                            tracing::warn!(server = %self.server_name, error = %e, "skipping malformed MCP tool");
                            None
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(tools)
    }

    /// Call a tool and flatten its text content. `isError` results are errors.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> SeeClawResult<String> {
        tracing::info!(server = %self.server_name, tool = name, "calling MCP tool");
        let arguments = if arguments.is_null() { json!({}) } else { arguments };
        let result = self
            .transport
            .request("tools/call", Some(json!({"name": name, "arguments": arguments})))
            .await?;

        let text = result["content"]
            .as_array()
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| match p["type"].as_str() {
                        Some("text") => p["text"].as_str().map(String::from),
                        Some(other) => Some(format!("[{other} content]")),
                        None => None,
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_else(|| result.to_string());

        if result["isError"].as_bool().unwrap_or(false) {
            return Err(SeeClawError::Mcp(format!("{}/{name} failed: {text}", self.server_name)));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    /// Answers by method name and records every message.
    #[derive(Default)]
    struct FakeServer {
        log: std::sync::Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl McpTransport for FakeServer {
        async fn request(&self, method: &str, params: Option<Value>) -> SeeClawResult<Value> {
            self.log.lock().unwrap().push(method.to_string());
            Ok(match method {
                "initialize" => json!({"serverInfo": {"name": "fake"}}),
                "tools/list" => json!({"tools": [
                    {"name": "read_file", "description": "Read a file",
                     "inputSchema": {"type": "object", "properties": {"path": {"type": "string"}}}},
                    {"description": "nameless"}
                ]}),
                "tools/call" => {
                    let params = params.unwrap_or_default();
                    if params["name"] == "explode" {
                        json!({"isError": true, "content": [{"type": "text", "text": "boom"}]})
                    } else {
                        json!({"content": [
                            {"type": "text", "text": "line 1"},
                            {"type": "text", "text": "line 2"}
                        ]})
                    }
                }
                _ => Value::Null,
            })
        }

        async fn notify(&self, method: &str, _params: Option<Value>) -> SeeClawResult<()> {
            self.log.lock().unwrap().push(method.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn handshake_then_discovery() {
        let server = FakeServer::default();
        let log = server.log.clone();
        let client = McpClient::connect("files", Box::new(server)).await.unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec!["initialize", "notifications/initialized", "tools/list"]
        );
        assert_eq!(client.tools().len(), 1);
        assert_eq!(client.tools()[0].name, "read_file");
    }

    #[tokio::test]
    async fn call_tool_joins_text_and_surfaces_tool_errors() {
        let client = McpClient::connect("files", Box::new(FakeServer::default())).await.unwrap();
        let out = client.call_tool("read_file", json!({"path": "a"})).await.unwrap();
        assert_eq!(out, "line 1\nline 2");
        let err = client.call_tool("explode", Value::Null).await.unwrap_err();
        assert!(err.to_string().contains("boom"));
    }
}
