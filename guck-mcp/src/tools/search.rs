//! guck.search

use serde_json::json;

use super::{common_properties, object_schema, ToolDefinition};

/// guck.search tool definition
pub fn search_tool() -> ToolDefinition {
    let mut properties = common_properties();
    let extra = [
        ("session_id", json!({ "type": "string" })),
        ("run_id", json!({ "type": "string" })),
        (
            "types",
            json!({ "type": "array", "items": { "type": "string" }, "description": "Match any of these event types" }),
        ),
        (
            "levels",
            json!({
                "type": "array",
                "items": { "type": "string", "enum": ["trace", "debug", "info", "warn", "error", "fatal"] },
                "description": "Match any of these levels"
            }),
        ),
        (
            "contains",
            json!({ "type": "string", "description": "Case-insensitive substring of message, type, session_id or data" }),
        ),
        (
            "query",
            json!({
                "type": "string",
                "description": "Boolean expression over message: terms, \"quoted phrases\", AND, OR, NOT (or - / !), parentheses. Adjacent terms mean AND."
            }),
        ),
        (
            "format",
            json!({ "type": "string", "enum": ["json", "text"], "description": "json (default) or one line per event" }),
        ),
        (
            "fields",
            json!({ "type": "array", "items": { "type": "string" }, "description": "Project events onto these fields (json format); dotted paths reach into data/tags/source" }),
        ),
        (
            "flatten",
            json!({ "type": "boolean", "description": "Keep dotted field paths as flat keys" }),
        ),
        (
            "template",
            json!({ "type": "string", "description": "Text line template, e.g. \"{ts} {level} {message}\"" }),
        ),
        (
            "max_message_chars",
            json!({ "type": "integer", "minimum": 0, "description": "Trim each message to this many characters around the match" }),
        ),
    ];
    for (name, schema) in extra {
        properties.insert(name.to_string(), schema);
    }

    ToolDefinition {
        name: "guck.search".to_string(),
        description: "Search captured telemetry events across the local store and configured remote backends. Results are newest first.".to_string(),
        input_schema: object_schema(properties, &[]),
    }
}
