use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::errors::{SeeClawError, SeeClawResult};
use crate::mcp::transport::{JsonRpcRequest, JsonRpcResponse, McpTransport};

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

type Writer = Box<dyn AsyncWrite + Send + Unpin>;
type Reader = BufReader<Box<dyn AsyncRead + Send + Unpin>>;

struct Pipes {
    writer: Writer,
    reader: Reader,
}

/// Newline-delimited JSON-RPC over a child process' stdin/stdout.
pub struct StdioTransport {
    pipes: Mutex<Pipes>,
    next_id: AtomicU64,
    timeout: Duration,
    // Held so the server is killed when the transport is dropped.
    _child: Option<Child>,
}

impl StdioTransport {
    pub fn spawn(command: &str, args: &[String]) -> SeeClawResult<Self> {
        let mut child = Command::new(command)
            .args(args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SeeClawError::Mcp(format!("failed to start '{command}': {e}")))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SeeClawError::Mcp("child stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SeeClawError::Mcp("child stdout unavailable".into()))?;
        let mut transport = Self::from_pipes(Box::new(stdin), Box::new(stdout));
        transport._child = Some(child);
        Ok(transport)
    }

    /// Transport over arbitrary pipes, e.g. an in-memory duplex.
    pub fn from_pipes(writer: Writer, reader: Box<dyn AsyncRead + Send + Unpin>) -> Self {
        Self {
            pipes: Mutex::new(Pipes {
                writer,
                reader: BufReader::new(reader),
            }),
            next_id: AtomicU64::new(1),
            timeout: REQUEST_TIMEOUT,
            _child: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn write_message(pipes: &mut Pipes, message: &JsonRpcRequest) -> SeeClawResult<()> {
        let mut line = serde_json::to_string(message)?;
        line.push('\n');
        pipes.writer.write_all(line.as_bytes()).await?;
        pipes.writer.flush().await?;
        Ok(())
    }

    async fn read_response(pipes: &mut Pipes, id: u64) -> SeeClawResult<JsonRpcResponse> {
        let mut line = String::new();
        loop {
            line.clear();
            if pipes.reader.read_line(&mut line).await? == 0 {
                return Err(SeeClawError::Mcp("server closed the connection".into()));
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<JsonRpcResponse>(trimmed) {
                Ok(resp) if resp.id == Some(id) => return Ok(resp),
                Ok(_) => tracing::trace!(line = trimmed, "skipping unrelated MCP message"),
                Err(e) => tracing::debug!(error = %e, "ignoring non JSON-RPC line from MCP server"),
            }
        }
    }
}

#[async_trait]
impl McpTransport for StdioTransport {
    async fn request(&self, method: &str, params: Option<Value>) -> SeeClawResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::call(id, method, params);
        let mut pipes = self.pipes.lock().await;

        let exchange = async {
            Self::write_message(&mut pipes, &request).await?;
            Self::read_response(&mut pipes, id).await
        };
        let response = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| SeeClawError::Mcp(format!("'{method}' timed out")))??;

        if let Some(err) = response.error {
            return Err(SeeClawError::Mcp(format!("{method}: {} (code {})", err.message, err.code)));
        }
        Ok(response.result.unwrap_or(Value::Null))
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> SeeClawResult<()> {
        let mut pipes = self.pipes.lock().await;
        Self::write_message(&mut pipes, &JsonRpcRequest::notification(method, params)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn matches_responses_by_id_and_skips_noise() {
        let (client_side, server_side) = duplex(4096);
        let (client_read, client_write) = tokio::io::split(client_side);
        let transport = StdioTransport::from_pipes(Box::new(client_write), Box::new(client_read));

        let server = tokio::spawn(async move {
            let (read, mut write) = tokio::io::split(server_side);
            let mut lines = BufReader::new(read).lines();
            let req = lines.next_line().await.unwrap().unwrap();
            let req: serde_json::Value = serde_json::from_str(&req).unwrap();
            assert_eq!(req["method"], "tools/list");
            let id = req["id"].as_u64().unwrap();
            let reply = format!(
                "log line\n{{\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\"}}\n{{\"jsonrpc\":\"2.0\",\"id\":{id},\"result\":{{\"tools\":[]}}}}\n"
            );
            write.write_all(reply.as_bytes()).await.unwrap();
        });

        let result = transport.request("tools/list", None).await.unwrap();
        assert_eq!(result, serde_json::json!({"tools": []}));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn error_responses_and_closed_pipes_fail() {
        let (client_side, server_side) = duplex(4096);
        let (client_read, client_write) = tokio::io::split(client_side);
        let transport = StdioTransport::from_pipes(Box::new(client_write), Box::new(client_read));

        let server = tokio::spawn(async move {
            let (read, mut write) = tokio::io::split(server_side);
            let mut lines = BufReader::new(read).lines();
            let _ = lines.next_line().await.unwrap().unwrap();
            write
                .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"error\":{\"code\":-32601,\"message\":\"no such method\"}}\n")
                .await
                .unwrap();
        });

        let err = transport.request("bogus", None).await.unwrap_err();
        assert!(err.to_string().contains("no such method"));
        server.await.unwrap();

        assert!(transport.request("tools/list", None).await.is_err());
    }
}
