//! MCP Server protocol implementation
//!
//! This module handles the MCP JSON-RPC protocol over stdio: one request per
//! line in, one response per line out. Notifications (requests without an
//! `id`) are handled but never answered.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use guck_core::{GuckError, LoadedConfig, QueryEngine, SearchParams, SessionsParams, StatsParams};

use crate::error::{McpError, McpResult};
use crate::tools::{get_tool_definitions, ToolCall, ToolResult};
use crate::{PROTOCOL_VERSION, SERVER_INSTRUCTIONS, SERVER_NAME, SERVER_VERSION};

/// MCP JSON-RPC request
#[derive(Debug, Deserialize)]
pub struct McpRequest {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// MCP JSON-RPC response
#[derive(Debug, Serialize)]
pub struct McpResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl McpResponse {
    fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    fn failure(id: Value, error: &McpError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error.to_mcp_error()),
        }
    }
}

/// Guck MCP server over a [`QueryEngine`]
pub struct McpServer {
    engine: QueryEngine,
}

impl McpServer {
    pub fn new(engine: QueryEngine) -> Self {
        Self { engine }
    }

    pub fn from_config(loaded: &LoadedConfig) -> Self {
        Self::new(QueryEngine::from_config(loaded))
    }

    pub fn engine(&self) -> &QueryEngine {
        &self.engine
    }

    /// Run the MCP server over stdio
    pub async fn run_stdio(&self) -> McpResult<()> {
        self.run(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Serve line-delimited JSON-RPC until the reader is exhausted
    pub async fn run<R, W>(&self, reader: R, mut writer: W) -> McpResult<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = BufReader::new(reader).lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            if let Some(response) = self.handle_line(&line).await {
                let mut out = serde_json::to_vec(&response)?;
                out.push(b'\n');
                writer.write_all(&out).await?;
                writer.flush().await?;
            }
        }
        info!("stdin closed, shutting down");
        Ok(())
    }

    /// Handle one raw request line
    pub async fn handle_line(&self, line: &str) -> Option<McpResponse> {
        match serde_json::from_str::<McpRequest>(line) {
            Ok(request) => self.handle_request(request).await,
            Err(e) => {
                warn!("Unparseable request: {}", e);
                Some(McpResponse::failure(Value::Null, &McpError::Parse(e.to_string())))
            }
        }
    }

    /// Handle an MCP request. Returns `None` for notifications.
    pub async fn handle_request(&self, request: McpRequest) -> Option<McpResponse> {
        debug!("<- {}", request.method);
        let result = self.dispatch(&request.method, request.params).await;
        let id = request.id?;
        Some(match result {
            Ok(value) => McpResponse::success(id, value),
            Err(e) => McpResponse::failure(id, &e),
        })
    }

    async fn dispatch(&self, method: &str, params: Value) -> McpResult<Value> {
        match method {
            "initialize" => Ok(self.handle_initialize()),
            "tools/list" => Ok(self.handle_tools_list()),
            "tools/call" => self.handle_tools_call(params).await,
            "ping" => Ok(json!({})),
            m if m.starts_with("notifications/") => Ok(Value::Null),
            _ => Err(McpError::MethodNotFound(method.to_string())),
        }
    }

    fn handle_initialize(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "serverInfo": {
                "name": SERVER_NAME,
                "version": SERVER_VERSION
            },
            "capabilities": {
                "tools": {}
            },
            "instructions": SERVER_INSTRUCTIONS
        })
    }

    fn handle_tools_list(&self) -> Value {
        json!({ "tools": get_tool_definitions() })
    }

    async fn handle_tools_call(&self, params: Value) -> McpResult<Value> {
        let call: ToolCall = serde_json::from_value(params)
            .map_err(|e| McpError::InvalidParams(e.to_string()))?;
        let result = self.call_tool(call).await?;
        Ok(serde_json::to_value(result)?)
    }

    /// Run one tool. Argument and query errors come back as `isError`
    /// results; only an unknown tool name is a protocol error.
    pub async fn call_tool(&self, call: ToolCall) -> McpResult<ToolResult> {
        let arguments = match call.arguments {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
        let outcome = match call.name.as_str() {
            "guck.search" => match parse_arguments::<SearchParams>(arguments) {
                Ok(params) => self.engine.search(&params).await.map_err(McpError::from),
                Err(e) => Err(e),
            },
            "guck.stats" => match parse_arguments::<StatsParams>(arguments) {
                Ok(params) => self.engine.stats(&params).await.map_err(McpError::from),
                Err(e) => Err(e),
            },
            "guck.sessions" => match parse_arguments::<SessionsParams>(arguments) {
                Ok(params) => self.engine.sessions(&params).await.map_err(McpError::from),
                Err(e) => Err(e),
            },
            _ => return Err(McpError::UnknownTool(call.name.clone())),
        };

        Ok(match outcome {
            Ok(payload) => ToolResult::json(&payload),
            Err(McpError::Core(e)) => {
                warn!("{} failed: {}", call.name, e);
                tool_error(&e)
            }
            Err(e) => ToolResult::error(e.to_string()),
        })
    }
}

fn parse_arguments<T: serde::de::DeserializeOwned>(arguments: Value) -> McpResult<T> {
    serde_json::from_value(arguments).map_err(|e| McpError::InvalidParams(e.to_string()))
}

fn tool_error(err: &GuckError) -> ToolResult {
    let mut body = json!(err.to_error_response());
    if let GuckError::InvalidQuery(q) = err {
        body["error"]["position"] = json!(q.position);
    }
    let mut result = ToolResult::json(&body);
    result.is_error = true;
    result
}
