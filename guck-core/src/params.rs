//! Request parameters accepted from the tool-call layer
//!
//! Filters combine with AND semantics. `query` is evaluated against
//! `message` only, after every other filter has passed.

use serde::{Deserialize, Serialize};

/// Output shape for search results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Text,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Text => "text",
        }
    }
}

/// Grouping key for stats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
    Type,
    Level,
    /// String field `data.stage`
    Stage,
}

/// Parameters for `search`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default)]
    pub levels: Vec<String>,
    /// Substring across message, type, session_id and serialized data
    #[serde(default)]
    pub contains: Option<String>,
    /// Boolean expression over message
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub since: Option<String>,
    #[serde(default)]
    pub until: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    /// Backend ids or types to consult
    #[serde(default)]
    pub backends: Vec<String>,

    // Output shaping
    #[serde(default)]
    pub format: OutputFormat,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub flatten: bool,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub max_output_chars: Option<usize>,
    #[serde(default)]
    pub max_message_chars: Option<usize>,
    #[serde(default)]
    pub force: bool,
}

/// Parameters for `stats`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsParams {
    pub group_by: GroupBy,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub since: Option<String>,
    #[serde(default)]
    pub until: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub backends: Vec<String>,
    #[serde(default)]
    pub max_output_chars: Option<usize>,
    #[serde(default)]
    pub force: bool,
}

impl StatsParams {
    pub fn new(group_by: GroupBy) -> Self {
        Self {
            group_by,
            service: None,
            session_id: None,
            run_id: None,
            since: None,
            until: None,
            limit: None,
            backends: Vec::new(),
            max_output_chars: None,
            force: false,
        }
    }
}

/// Parameters for `sessions`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionsParams {
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub since: Option<String>,
    #[serde(default)]
    pub until: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub backends: Vec<String>,
    #[serde(default)]
    pub max_output_chars: Option<usize>,
    #[serde(default)]
    pub force: bool,
}
