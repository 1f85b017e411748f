//! MCP Tool implementations
//!
//! These are the tools exposed to agents through the MCP protocol. Each
//! tool's arguments deserialize straight into the matching `guck_core`
//! parameter struct.

pub mod search;
pub mod sessions;
pub mod stats;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Tool definition for MCP protocol
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name
    pub name: String,

    /// Description shown to the agent
    pub description: String,

    /// JSON Schema for input parameters
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Tool call request
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

/// Tool call response
#[derive(Debug, Clone, Serialize)]
pub struct ToolResult {
    pub content: Vec<ToolContent>,
    #[serde(rename = "isError")]
    pub is_error: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolContent {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: String,
}

impl ToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent {
                content_type: "text".to_string(),
                text: text.into(),
            }],
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::text(text)
        }
    }

    /// Pretty-printed JSON payload as text content
    pub fn json(value: &Value) -> Self {
        let text = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
        Self::text(text)
    }
}

/// Get all Guck tool definitions
pub fn get_tool_definitions() -> Vec<ToolDefinition> {
    vec![
        search::search_tool(),
        stats::stats_tool(),
        sessions::sessions_tool(),
    ]
}

/// Properties every query tool accepts
pub(crate) fn common_properties() -> Map<String, Value> {
    let value = json!({
        "service": {
            "type": "string",
            "description": "Only events from this service"
        },
        "since": {
            "type": "string",
            "description": "Lower time bound: duration like '15m', '2h', '1d', an ISO-8601 timestamp, or 'checkpoint'. Defaults to the checkpoint if one exists, else the configured lookback."
        },
        "until": {
            "type": "string",
            "description": "Upper time bound: duration ago or ISO-8601 timestamp"
        },
        "limit": {
            "type": "integer",
            "minimum": 1,
            "description": "Maximum number of items (capped by mcp.max_results)"
        },
        "backends": {
            "type": "array",
            "items": { "type": "string" },
            "description": "Backend ids or types to query (default: all configured)"
        },
        "max_output_chars": {
            "type": "integer",
            "minimum": 0,
            "description": "Refuse to return payloads larger than this (0 disables the check)"
        },
        "force": {
            "type": "boolean",
            "description": "Return the payload even when it exceeds max_output_chars"
        }
    });
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

pub(crate) fn object_schema(properties: Map<String, Value>, required: &[&str]) -> Value {
    let mut schema = json!({
        "type": "object",
        "properties": Value::Object(properties),
        "additionalProperties": false
    });
    if !required.is_empty() {
        schema["required"] = json!(required);
    }
    schema
}
