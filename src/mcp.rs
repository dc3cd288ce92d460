//! MCP Tool Session Bridge
//!
//! JSON-RPC 2.0 client over the stdio of a child process.
//! Reference: https://modelcontextprotocol.io/specification
//!
//! One session per run: the process is spawned when the run starts and torn
//! down when it ends.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::config::ToolServerConfig;
use crate::error::{AgentError, Result};

pub const PROTOCOL_VERSION: &str = "2024-11-05";
const CLIENT_NAME: &str = "uiflow-agent";
const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Grace period for the tool process to exit after stdin closes
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// JSON-RPC 2.0 Request
#[derive(Debug, Clone, Serialize)]
pub struct McpRequest {
    pub jsonrpc: &'static str,
    pub method: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub params: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
}

impl McpRequest {
    pub fn call(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.into(),
            params,
            id: Some(id),
        }
    }

    /// Notification (no id, no response expected)
    pub fn notification(method: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.into(),
            params: Value::Null,
            id: None,
        }
    }
}

/// JSON-RPC 2.0 Response
#[derive(Debug, Clone, Deserialize)]
pub struct McpResponse {
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<McpError>,
    #[serde(default)]
    pub id: Option<Value>,
    /// Present only on server-initiated requests
    #[serde(default)]
    pub method: Option<String>,
}

/// JSON-RPC 2.0 Error
#[derive(Debug, Clone, Deserialize)]
pub struct McpError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

impl McpResponse {
    fn matches(&self, id: u64) -> bool {
        self.method.is_none() && self.id.as_ref().and_then(Value::as_u64) == Some(id)
    }

    fn into_result(self) -> Result<Value> {
        if let Some(err) = self.error {
            return Err(AgentError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

/// A tool advertised by the tool server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl ToolDescriptor {
    /// Parse one entry of a `tools/list` result
    pub fn from_listing(entry: &Value) -> Option<Self> {
        let name = entry.get("name").and_then(Value::as_str)?;
        let description = entry
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let input_schema = entry
            .get("inputSchema")
            .or_else(|| entry.get("input_schema"))
            .cloned()
            .unwrap_or_else(|| json!({ "type": "object" }));

        Some(Self {
            name: name.to_string(),
            description,
            input_schema,
        })
    }
}

/// Render a `tools/call` result as the plain string fed back to the model.
///
/// Text content blocks are joined by newlines; anything else falls back to
/// the JSON rendering of the whole result.
pub fn render_tool_result(result: &Value) -> String {
    let texts: Vec<&str> = result
        .get("content")
        .and_then(Value::as_array)
        .map(|blocks| {
            blocks
                .iter()
                .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();

    if texts.is_empty() {
        return result.to_string();
    }

    let body = texts.join("\n");
    if result.get("isError").and_then(Value::as_bool) == Some(true) {
        format!("Tool error: {}", body)
    } else {
        body
    }
}

/// An open session with a tool server
#[async_trait]
pub trait ToolSession: Send {
    /// Enumerate the tools the server offers
    async fn list_tools(&mut self) -> Result<Vec<ToolDescriptor>>;

    /// Invoke a tool and return its raw result
    async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<Value>;

    /// Best-effort shutdown
    async fn close(&mut self);
}

/// Opens a fresh tool session per run
#[async_trait]
pub trait ToolConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn ToolSession>>;
}

/// Launches the configured command and speaks MCP over its stdio
#[derive(Debug, Clone)]
pub struct StdioConnector {
    config: ToolServerConfig,
}

impl StdioConnector {
    pub fn new(config: ToolServerConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ToolConnector for StdioConnector {
    async fn connect(&self) -> Result<Box<dyn ToolSession>> {
        let session = StdioSession::spawn(&self.config).await?;
        Ok(Box::new(session))
    }
}

/// MCP session over a child process
///
/// On unix the tool process leads its own process group, so the server it
/// launches (and any browsers) go down with the session.
pub struct StdioSession {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
    group: Option<u32>,
}

impl StdioSession {
    /// Spawn the tool process and perform the initialize handshake
    pub async fn spawn(config: &ToolServerConfig) -> Result<Self> {
        info!("Launching tool server: {}", config.command_line());

        let mut command = std::process::Command::new(&config.command);
        command
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let mut child = Command::from(command)
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| AgentError::Spawn {
                command: config.command.clone(),
                source,
            })?;

        // With process_group(0) the group id is the child's pid
        let group = if cfg!(unix) { child.id() } else { None };

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AgentError::Setup("tool process stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AgentError::Setup("tool process stdout unavailable".to_string()))?;

        let mut session = Self {
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout).lines(),
            next_id: 1,
            group,
        };

        if let Err(e) = session.initialize().await {
            session.close().await;
            return Err(AgentError::Setup(e.to_string()));
        }

        Ok(session)
    }

    async fn initialize(&mut self) -> Result<()> {
        let result = self
            .request(
                "initialize",
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": CLIENT_NAME,
                        "version": CLIENT_VERSION
                    }
                }),
            )
            .await?;

        let server = result
            .get("serverInfo")
            .and_then(|s| s.get("name"))
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        let version = result
            .get("protocolVersion")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        info!("Tool server '{}' initialized (protocol {})", server, version);

        self.send(&McpRequest::notification("notifications/initialized"))
            .await
    }

    async fn send(&mut self, message: &McpRequest) -> Result<()> {
        let stdin = self.stdin.as_mut().ok_or(AgentError::Disconnected)?;
        let line = serde_json::to_string(message)?;
        debug!("→ {}", line);

        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Send a request and wait for the response with the same id
    async fn request(&mut self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id;
        self.next_id += 1;

        self.send(&McpRequest::call(id, method, params)).await?;

        loop {
            let line = self
                .stdout
                .next_line()
                .await?
                .ok_or(AgentError::Disconnected)?;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            debug!("← {}", trimmed);

            let response = match serde_json::from_str::<McpResponse>(trimmed) {
                Ok(r) => r,
                Err(_) => {
                    debug!("Skipping non JSON-RPC output from tool server");
                    continue;
                }
            };

            if !response.matches(id) {
                // Notifications and server-initiated requests
                continue;
            }

            return response.into_result();
        }
    }
}

#[async_trait]
impl ToolSession for StdioSession {
    async fn list_tools(&mut self) -> Result<Vec<ToolDescriptor>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let params = match &cursor {
                Some(c) => json!({ "cursor": c }),
                None => json!({}),
            };
            let result = self.request("tools/list", params).await?;

            let page = result
                .get("tools")
                .and_then(Value::as_array)
                .ok_or_else(|| AgentError::Protocol("tools/list result missing tools array".to_string()))?;
            tools.extend(page.iter().filter_map(ToolDescriptor::from_listing));

            cursor = result
                .get("nextCursor")
                .and_then(Value::as_str)
                .map(str::to_string);
            if cursor.is_none() {
                break;
            }
        }

        info!("Tool server offers {} tools", tools.len());
        Ok(tools)
    }

    async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<Value> {
        self.request(
            "tools/call",
            json!({
                "name": name,
                "arguments": arguments
            }),
        )
        .await
    }

    async fn close(&mut self) {
        // Closing stdin is the MCP stdio shutdown signal
        drop(self.stdin.take());

        match tokio::time::timeout(SHUTDOWN_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => debug!("Tool server exited: {}", status),
            Ok(Err(e)) => warn!("Failed to reap tool server: {}", e),
            Err(_) => {
                warn!("Tool server did not exit, killing it");
                let _ = self.child.kill().await;
            }
        }

        // Whatever the tool process started may still be running
        if let Some(group) = self.group.take() {
            terminate_group(group);
        }
    }
}

impl Drop for StdioSession {
    fn drop(&mut self) {
        if let Some(group) = self.group.take() {
            terminate_group(group);
        }
    }
}

/// Send SIGTERM to every process in the group
#[cfg(unix)]
fn terminate_group(group: u32) {
    match std::process::Command::new("kill")
        .args(["-TERM", "--", &format!("-{}", group)])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
    {
        Ok(status) if status.success() => debug!("Sent SIGTERM to process group {}", group),
        // Group already empty
        Ok(_) => {}
        Err(e) => warn!("Failed to signal process group {}: {}", group, e),
    }
}

#[cfg(not(unix))]
fn terminate_group(_group: u32) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let req = McpRequest::call(3, "tools/call", json!({ "name": "playwright_navigate" }));
        let text = serde_json::to_string(&req).unwrap();
        assert_eq!(
            text,
            r#"{"jsonrpc":"2.0","method":"tools/call","params":{"name":"playwright_navigate"},"id":3}"#
        );

        let note = serde_json::to_string(&McpRequest::notification("notifications/initialized")).unwrap();
        assert_eq!(note, r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#);
    }

    #[test]
    fn test_response_error_becomes_rpc_error() {
        let resp: McpResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":4,"error":{"code":-32602,"message":"Unknown tool"}}"#,
        )
        .unwrap();
        assert!(resp.matches(4));
        assert!(!resp.matches(5));

        let server_request: McpResponse =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":4,"method":"roots/list"}"#).unwrap();
        assert!(!server_request.matches(4));

        match resp.into_result() {
            Err(AgentError::Rpc { code, message }) => {
                assert_eq!(code, -32602);
                assert_eq!(message, "Unknown tool");
            }
            other => panic!("expected rpc error, got {:?}", other),
        }
    }

    #[test]
    fn test_descriptor_from_listing() {
        let entry = json!({
            "name": "playwright_click",
            "description": "Click an element",
            "inputSchema": { "type": "object", "properties": { "selector": { "type": "string" } } }
        });
        let tool = ToolDescriptor::from_listing(&entry).unwrap();
        assert_eq!(tool.name, "playwright_click");
        assert_eq!(tool.description, "Click an element");
        assert_eq!(tool.input_schema["properties"]["selector"]["type"], "string");

        let bare = ToolDescriptor::from_listing(&json!({ "name": "playwright_close" })).unwrap();
        assert_eq!(bare.description, "");
        assert_eq!(bare.input_schema, json!({ "type": "object" }));

        assert!(ToolDescriptor::from_listing(&json!({ "description": "nameless" })).is_none());
    }

    #[test]
    fn test_render_text_content() {
        let result = json!({
            "content": [
                { "type": "text", "text": "Navigated to https://example.com" },
                { "type": "image", "data": "..." },
                { "type": "text", "text": "Status: 200" }
            ],
            "isError": false
        });
        assert_eq!(
            render_tool_result(&result),
            "Navigated to https://example.com\nStatus: 200"
        );
    }

    #[test]
    fn test_render_error_and_fallback() {
        let failed = json!({
            "content": [{ "type": "text", "text": "Timeout waiting for selector" }],
            "isError": true
        });
        assert_eq!(render_tool_result(&failed), "Tool error: Timeout waiting for selector");

        let opaque = json!({ "structured": { "ok": true } });
        assert_eq!(render_tool_result(&opaque), r#"{"structured":{"ok":true}}"#);
    }

    #[tokio::test]
    async fn test_spawn_missing_command_is_setup_failure() {
        let config = ToolServerConfig {
            command: "uiflow-agent-no-such-binary".to_string(),
            args: vec![],
        };
        let err = StdioSession::spawn(&config).await.err().unwrap();
        assert!(matches!(err, AgentError::Spawn { .. }));
        assert!(err.is_setup());
    }
}
