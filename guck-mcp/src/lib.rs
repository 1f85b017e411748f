//! Guck MCP Server Library
//!
//! This crate implements the Model Context Protocol (MCP) server for Guck,
//! letting agents search captured telemetry through standardized tools.
//!
//! ## Architecture
//!
//! ```text
//! Agent (Claude, GPT, etc.)
//!        │  JSON-RPC over stdio
//!        ▼
//! ┌─────────────────┐
//! │   MCP Server    │ ◄── This crate
//! │                 │
//! │  ┌───────────┐  │
//! │  │   Tools   │  │ - guck.search
//! │  │           │  │ - guck.stats
//! │  │           │  │ - guck.sessions
//! │  └───────────┘  │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │    guck-core    │
//! │                 │
//! │  QueryEngine    │
//! │  local │ cloud  │
//! │  watch │ k8s    │
//! └─────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use guck_core::{load_config, LoadOptions};
//! use guck_mcp::McpServer;
//!
//! #[tokio::main]
//! async fn main() {
//!     let loaded = load_config(&LoadOptions::from_process());
//!     McpServer::from_config(&loaded).run_stdio().await.unwrap();
//! }
//! ```

pub mod error;
pub mod server;
pub mod tools;

pub use error::{McpError, McpResult};
pub use server::{McpRequest, McpResponse, McpServer};
pub use tools::{get_tool_definitions, ToolCall, ToolDefinition, ToolResult};

/// Server metadata for MCP protocol
pub const SERVER_NAME: &str = "guck";
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_INSTRUCTIONS: &str = "Search telemetry captured by guck. Start with guck.stats or guck.sessions to orient, then narrow guck.search with service, session_id, levels or query. Use fields, format=text or max_message_chars to keep output small.";
