//! Remote tools served over the Model Context Protocol.
//!
//! Speaks JSON-RPC 2.0 over streamable HTTP: every request is a POST, the
//! server answers with either a JSON body or a short SSE stream, and the
//! `Mcp-Session-Id` it hands out on `initialize` is echoed on later calls.
//! Each tool the server lists becomes an [`McpTool`] that agents call like
//! any built-in tool.

use super::traits::{Tool, ToolResult};
use crate::providers::compatible::SseDecoder;
use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

const PROTOCOL_VERSION: &str = "2024-11-05";
const SESSION_HEADER: &str = "Mcp-Session-Id";
/// Stop following `nextCursor` after this many `tools/list` pages.
const MAX_LIST_PAGES: usize = 64;

/// One `[[mcp_servers]]` entry in a workflow file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct McpServerConfig {
    pub name: String,
    pub url: String,
    /// Extra request headers; values expand `$VAR` / `${VAR}` from the environment.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

// ── JSON-RPC ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    jsonrpc: &'static str,
    /// Absent for notifications.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    fn new(id: Option<u64>, method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.to_string(),
            params,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

// ── Protocol payloads ───────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListToolsResult {
    #[serde(default)]
    tools: Vec<RemoteTool>,
    #[serde(default)]
    next_cursor: Option<String>,
}

/// A tool as listed by the server.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteTool {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_input_schema")]
    pub input_schema: Value,
}

fn default_input_schema() -> Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    #[serde(default)]
    pub content: Vec<ContentItem>,
    #[serde(default)]
    pub structured_content: Option<Value>,
    #[serde(default)]
    pub is_error: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentItem {
    Text {
        text: String,
    },
    Image {
        #[serde(rename = "mimeType", default)]
        mime_type: String,
    },
    #[serde(other)]
    Other,
}

impl CallToolResult {
    /// Text handed back to the model.
    pub fn render(&self) -> String {
        let parts: Vec<String> = self
            .content
            .iter()
            .map(|item| match item {
                ContentItem::Text { text } => text.clone(),
                ContentItem::Image { mime_type } => format!("[image: {mime_type}]"),
                ContentItem::Other => "[unsupported content]".to_string(),
            })
            .collect();
        let text = parts.join("\n");
        match &self.structured_content {
            Some(value) if text.trim().is_empty() => value.to_string(),
            _ => text,
        }
    }
}

// ── Transport ───────────────────────────────────────────────────

/// Carries JSON-RPC messages to one server.
#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Send `request`; notifications resolve to `None`.
    async fn send(&self, request: &JsonRpcRequest) -> Result<Option<JsonRpcResponse>>;
}

/// Streamable HTTP transport.
pub struct HttpTransport {
    server: String,
    url: String,
    headers: Vec<(String, String)>,
    session_id: Mutex<Option<String>>,
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &McpServerConfig) -> Result<Self> {
        let headers = config
            .headers
            .iter()
            .map(|(name, value)| {
                let value = shellexpand::env(value).with_context(|| {
                    format!("MCP server '{}': cannot expand header {name}", config.name)
                })?;
                Ok((name.clone(), value.into_owned()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            server: config.name.clone(),
            url: config.url.clone(),
            headers,
            session_id: Mutex::new(None),
            client: Client::builder()
                .timeout(Duration::from_secs(60))
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        })
    }
}

#[async_trait]
impl McpTransport for HttpTransport {
    async fn send(&self, request: &JsonRpcRequest) -> Result<Option<JsonRpcResponse>> {
        let mut builder = self
            .client
            .post(&self.url)
            .header(ACCEPT, "application/json, text/event-stream")
            .json(request);
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let session = self.session_id.lock().clone();
        if let Some(session) = session {
            builder = builder.header(SESSION_HEADER, session);
        }

        tracing::debug!(server = %self.server, method = %request.method, "MCP request");
        let response = builder
            .send()
            .await
            .with_context(|| format!("MCP server '{}' is unreachable", self.server))?;

        if let Some(session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            *self.session_id.lock() = Some(session.to_string());
        }
        if !response.status().is_success() {
            let label = format!("MCP server '{}'", self.server);
            return Err(crate::providers::api_error(&label, response).await);
        }
        let Some(id) = request.id else {
            return Ok(None);
        };
        if response.status() == StatusCode::ACCEPTED {
            anyhow::bail!(
                "MCP server '{}' accepted {} without answering",
                self.server,
                request.method
            );
        }

        let is_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));
        let body = response.bytes().await?;
        let parsed = if is_stream {
            response_from_stream(&body, id)
        } else {
            serde_json::from_slice(&body).context("invalid JSON-RPC response")
        };
        parsed
            .with_context(|| format!("MCP server '{}': bad reply to {}", self.server, request.method))
            .map(Some)
    }
}

/// The response to request `id` inside an SSE body. Server notifications
/// interleaved before it are skipped.
fn response_from_stream(body: &[u8], id: u64) -> Result<JsonRpcResponse> {
    let mut decoder = SseDecoder::default();
    let mut payloads = decoder.push(body);
    payloads.extend(decoder.finish());
    payloads
        .iter()
        .filter_map(|payload| serde_json::from_str::<JsonRpcResponse>(payload).ok())
        .find(|response| response.id == Some(id))
        .with_context(|| format!("event stream carried no response for request {id}"))
}

// ── Client ──────────────────────────────────────────────────────

/// An initialized session with one MCP server.
pub struct McpClient {
    server: String,
    transport: Box<dyn McpTransport>,
    next_id: AtomicU64,
}

impl McpClient {
    /// Run the `initialize` handshake and return the ready client.
    pub async fn connect(server: impl Into<String>, transport: Box<dyn McpTransport>) -> Result<Self> {
        let client = Self {
            server: server.into(),
            transport,
            next_id: AtomicU64::new(1),
        };
        let result = client
            .call(
                "initialize",
                Some(serde_json::json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": env!("CARGO_PKG_NAME"),
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                })),
            )
            .await?;
        tracing::info!(
            server = %client.server,
            protocol = result.get("protocolVersion").and_then(serde_json::Value::as_str).unwrap_or("?"),
            remote = result.pointer("/serverInfo/name").and_then(serde_json::Value::as_str).unwrap_or("?"),
            "MCP session initialized"
        );
        client
            .transport
            .send(&JsonRpcRequest::new(None, "notifications/initialized", None))
            .await?;
        Ok(client)
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    /// Every tool the server offers, following pagination.
    pub async fn list_tools(&self) -> Result<Vec<RemoteTool>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        for _ in 0..MAX_LIST_PAGES {
            let params = cursor.take().map(|c| serde_json::json!({ "cursor": c }));
            let page: ListToolsResult = serde_json::from_value(self.call("tools/list", params).await?)
                .with_context(|| format!("MCP server '{}': malformed tools/list result", self.server))?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => return Ok(tools),
            }
        }
        tracing::warn!(server = %self.server, pages = MAX_LIST_PAGES, "tools/list pagination truncated");
        Ok(tools)
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult> {
        let params = serde_json::json!({ "name": name, "arguments": arguments });
        serde_json::from_value(self.call("tools/call", Some(params)).await?)
            .with_context(|| format!("MCP server '{}': malformed tools/call result", self.server))
    }

    async fn call(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let response = self
            .transport
            .send(&JsonRpcRequest::new(Some(id), method, params))
            .await?
            .with_context(|| format!("MCP server '{}' sent no reply to {method}", self.server))?;
        if let Some(error) = response.error {
            anyhow::bail!(
                "MCP server '{}' rejected {method}: {} ({})",
                self.server,
                error.message,
                error.code
            );
        }
        Ok(response.result.unwrap_or(Value::Null))
    }
}

// ── Tools ───────────────────────────────────────────────────────

/// A remote tool exposed through the [`Tool`] trait.
pub struct McpTool {
    client: Arc<McpClient>,
    name: String,
    description: String,
    schema: Value,
}

impl McpTool {
    pub fn new(client: Arc<McpClient>, remote: RemoteTool) -> Self {
        let description = remote
            .description
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| format!("{} (via {})", remote.name, client.server()));
        Self {
            client,
            name: remote.name,
            description,
            schema: remote.input_schema,
        }
    }
}

#[async_trait]
impl Tool for McpTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.schema.clone()
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let result = self.client.call_tool(&self.name, args).await?;
        let text = result.render();
        if result.is_error {
            Ok(ToolResult::err(text))
        } else {
            Ok(ToolResult::ok(text))
        }
    }
}

/// Wrap every tool `client` lists.
pub async fn remote_tools(client: Arc<McpClient>) -> Result<Vec<Arc<dyn Tool>>> {
    let listed = client.list_tools().await?;
    tracing::debug!(server = %client.server(), count = listed.len(), "MCP tools listed");
    Ok(listed
        .into_iter()
        .map(|remote| Arc::new(McpTool::new(Arc::clone(&client), remote)) as Arc<dyn Tool>)
        .collect())
}

/// Opens sessions for workflow `[[mcp_servers]]` entries.
#[async_trait]
pub trait McpConnector: Send + Sync {
    async fn tools(&self, server: &McpServerConfig) -> Result<Vec<Arc<dyn Tool>>>;
}

/// Connects over streamable HTTP.
pub struct HttpConnector;

#[async_trait]
impl McpConnector for HttpConnector {
    async fn tools(&self, server: &McpServerConfig) -> Result<Vec<Arc<dyn Tool>>> {
        let transport = HttpTransport::new(server)?;
        let client = McpClient::connect(server.name.clone(), Box::new(transport)).await?;
        remote_tools(Arc::new(client)).await
    }
}
