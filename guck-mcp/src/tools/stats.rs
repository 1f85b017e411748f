//! guck.stats

use serde_json::json;

use super::{common_properties, object_schema, ToolDefinition};

/// guck.stats tool definition
pub fn stats_tool() -> ToolDefinition {
    let mut properties = common_properties();
    properties.insert(
        "group_by".to_string(),
        json!({
            "type": "string",
            "enum": ["type", "level", "stage"],
            "description": "Bucket events by type, level, or data.stage"
        }),
    );
    properties.insert("session_id".to_string(), json!({ "type": "string" }));
    properties.insert("run_id".to_string(), json!({ "type": "string" }));

    ToolDefinition {
        name: "guck.stats".to_string(),
        description: "Count matching events grouped by type, level or stage. Buckets are sorted by count.".to_string(),
        input_schema: object_schema(properties, &["group_by"]),
    }
}
