//! Output shaping: field projection, text templates and message truncation
//!
//! Projection and templating only ever read the allow-listed top-level event
//! fields ([`ALLOWED_FIELDS`]); a new field on [`Event`] stays invisible here
//! until it is added to that list.

mod truncate;

pub use truncate::{truncate_message, truncate_messages, ELLIPSIS};

use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde_json::{Map, Value};

use crate::event::{Event, ALLOWED_FIELDS};

fn template_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{([^{}\s]+)\}").expect("template pattern is valid"))
}

fn is_allowed_root(path: &str) -> bool {
    let root = path.split('.').next().unwrap_or("");
    ALLOWED_FIELDS.contains(&root)
}

/// Walk a dotted path through plain objects. Arrays are not indexable.
fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(value, |current, segment| current.as_object()?.get(segment))
}

fn insert_nested(target: &mut Map<String, Value>, segments: &[&str], value: Value) {
    match segments {
        [] => {}
        [last] => {
            target.insert((*last).to_string(), value);
        }
        [head, rest @ ..] => {
            let entry = target
                .entry((*head).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(child) = entry {
                insert_nested(child, rest, value);
            }
        }
    }
}

/// Project an event onto the requested fields.
///
/// Dotted paths (`data.rawPeak`) are allowed when the first segment is
/// allow-listed. Unknown or missing paths are omitted. With `flatten` the
/// dotted path is the output key; otherwise the nesting is rebuilt. Output
/// keys follow the requested order.
pub fn project_event_fields(event: &Event, fields: &[String], flatten: bool) -> Map<String, Value> {
    let source = event.to_value();
    let mut projected = Map::new();
    for field in fields {
        let field = field.trim();
        if field.is_empty() || !is_allowed_root(field) {
            continue;
        }
        let Some(value) = lookup(&source, field) else {
            continue;
        };
        if flatten || !field.contains('.') {
            projected.insert(field.to_string(), value.clone());
        } else {
            let segments: Vec<&str> = field.split('.').collect();
            insert_nested(&mut projected, &segments, value.clone());
        }
    }
    projected
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Render an event as one line of text.
///
/// Without a template: `<ts> <level> <service> <type>[ session=<id>] <message>`.
/// With a template, every `{field}` / `{field.path}` whose root is
/// allow-listed is replaced by its value (JSON for non-strings, empty when
/// missing); other braces are left alone. Trailing whitespace is trimmed.
pub fn format_event_text(event: &Event, template: Option<&str>) -> String {
    match template {
        Some(template) if !template.is_empty() => {
            let source = event.to_value();
            template_pattern()
                .replace_all(template, |caps: &Captures| {
                    let token = &caps[1];
                    if !is_allowed_root(token) {
                        return caps[0].to_string();
                    }
                    lookup(&source, token).map(stringify).unwrap_or_default()
                })
                .trim_end()
                .to_string()
        }
        _ => {
            let session = event
                .session_id
                .as_deref()
                .map(|id| format!(" session={}", id))
                .unwrap_or_default();
            format!(
                "{} {} {} {}{} {}",
                event.ts,
                event.level,
                event.service,
                event.event_type,
                session,
                event.message_text()
            )
            .trim_end()
            .to_string()
        }
    }
}

/// Render events one per line
pub fn format_events_text(events: &[Event], template: Option<&str>) -> String {
    events
        .iter()
        .map(|e| format_event_text(e, template))
        .collect::<Vec<_>>()
        .join("\n")
}
