//! Error types for the Guck MCP server

use guck_core::GuckError;
use thiserror::Error;

/// Result type for MCP operations
pub type McpResult<T> = Result<T, McpError>;

/// Errors that can occur in the MCP server
#[derive(Error, Debug)]
pub enum McpError {
    /// Request line is not valid JSON-RPC
    #[error("Parse error: {0}")]
    Parse(String),

    /// Unknown JSON-RPC method
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// Unknown tool
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Tool arguments do not fit the tool's schema
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// Guck Core error
    #[error(transparent)]
    Core(#[from] GuckError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl McpError {
    /// Create an MCP-formatted error object
    pub fn to_mcp_error(&self) -> serde_json::Value {
        serde_json::json!({
            "code": self.error_code(),
            "message": self.to_string()
        })
    }

    /// Get error code for the JSON-RPC protocol
    pub fn error_code(&self) -> i32 {
        match self {
            McpError::Parse(_) => -32700,
            McpError::MethodNotFound(_) => -32601,
            McpError::UnknownTool(_) | McpError::InvalidParams(_) => -32602,
            McpError::Core(_) | McpError::Io(_) | McpError::Serialization(_) => -32603,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(McpError::Parse("x".into()).error_code(), -32700);
        assert_eq!(McpError::MethodNotFound("foo".into()).error_code(), -32601);
        assert_eq!(McpError::UnknownTool("guck.tail".into()).error_code(), -32602);
        assert_eq!(
            McpError::from(GuckError::config("bad")).error_code(),
            -32603
        );
    }

    #[test]
    fn test_mcp_error_shape() {
        let value = McpError::MethodNotFound("resources/list".into()).to_mcp_error();
        assert_eq!(value["code"], -32601);
        assert_eq!(value["message"], "Method not found: resources/list");
    }
}
