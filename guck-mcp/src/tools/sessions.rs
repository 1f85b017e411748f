//! guck.sessions

use super::{common_properties, object_schema, ToolDefinition};

/// guck.sessions tool definition
pub fn sessions_tool() -> ToolDefinition {
    ToolDefinition {
        name: "guck.sessions".to_string(),
        description: "List recent sessions with their last event time, event count and error count.".to_string(),
        input_schema: object_schema(common_properties(), &[]),
    }
}
