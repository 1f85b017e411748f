//! Mapping foreign log lines onto [`Event`]
//!
//! A line that parses as a JSON object with at least one recognized key is
//! treated as a structured record: recognized keys fill the event and the
//! remaining keys land in `data`. Anything else becomes an unstructured event
//! whose message is the raw line and whose level is guessed from its text.
//! Either way `data` also carries the connection metadata and the raw line,
//! and `source` records which backend produced the event.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::BackendKind;
use crate::event::{Event, EventSource, Level};
use crate::time::{format_iso, format_iso_ms, parse_timestamp_ms};

/// Top-level event keys recognized in structured lines
const EVENT_KEYS: &[&str] = &[
    "id", "ts", "level", "type", "service", "run_id", "session_id", "message", "data", "tags",
    "trace_id", "span_id",
];

/// Common structured-logging aliases (Kubernetes workloads)
const TS_ALIASES: &[&str] = &["timestamp", "time", "@timestamp"];
const LEVEL_ALIASES: &[&str] = &["severity", "lvl"];
const MESSAGE_ALIASES: &[&str] = &["msg"];
const NO_ALIASES: &[&str] = &[];

/// Key under which the original line is kept in `data`
pub const RAW_MESSAGE_KEY: &str = "raw_message";

/// Everything about the origin of a line that is not in the line itself
#[derive(Debug, Clone)]
pub struct LineContext<'a> {
    pub backend: BackendKind,
    pub backend_id: &'a str,
    /// Service when the line does not name one
    pub service: &'a str,
    /// Run id when the line does not name one (log stream, pod)
    pub run_id: &'a str,
    /// Id when the line does not carry one
    pub id: String,
    /// Timestamp reported by the source, used when the line has none
    pub ts: Option<String>,
    /// Connection metadata merged into `data`
    pub metadata: Map<String, Value>,
    /// Accept `timestamp`/`severity`/`msg` style keys
    pub accept_aliases: bool,
}

fn first_alias<'v>(object: &'v Map<String, Value>, key: &str, aliases: &[&str]) -> Option<&'v Value> {
    object
        .get(key)
        .or_else(|| aliases.iter().find_map(|alias| object.get(*alias)))
}

fn is_alias(key: &str) -> bool {
    TS_ALIASES.contains(&key) || LEVEL_ALIASES.contains(&key) || MESSAGE_ALIASES.contains(&key)
}

fn as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Timestamps may be ISO strings or epoch numbers (seconds or milliseconds)
fn timestamp_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => parse_timestamp_ms(s).map(|_| s.clone()),
        Value::Number(n) => {
            let raw = n.as_f64()?;
            let ms = if raw.abs() < 1e12 { raw * 1000.0 } else { raw };
            Some(format_iso_ms(ms as i64))
        }
        _ => None,
    }
}

fn looks_structured(object: &Map<String, Value>, accept_aliases: bool) -> bool {
    object
        .keys()
        .any(|key| EVENT_KEYS.contains(&key.as_str()) || (accept_aliases && is_alias(key)))
}

/// Normalize one raw line
pub fn normalize_line(ctx: &LineContext<'_>, raw: &str) -> Event {
    let parsed = serde_json::from_str::<Value>(raw.trim()).ok();
    match parsed {
        Some(Value::Object(object)) if looks_structured(&object, ctx.accept_aliases) => {
            structured_event(ctx, raw, object)
        }
        _ => unstructured_event(ctx, raw),
    }
}

fn fallback_ts(ctx: &LineContext<'_>) -> String {
    ctx.ts
        .clone()
        .unwrap_or_else(|| format_iso(chrono::Utc::now()))
}

fn structured_event(ctx: &LineContext<'_>, raw: &str, object: Map<String, Value>) -> Event {
    let aliases = |list: &'static [&'static str]| if ctx.accept_aliases { list } else { NO_ALIASES };

    let string_field = |key: &str| object.get(key).and_then(as_string);

    let ts = first_alias(&object, "ts", aliases(TS_ALIASES))
        .and_then(timestamp_value)
        .unwrap_or_else(|| fallback_ts(ctx));
    let level = first_alias(&object, "level", aliases(LEVEL_ALIASES))
        .and_then(Value::as_str)
        .map(Level::normalize)
        .unwrap_or_default();
    let message = first_alias(&object, "message", aliases(MESSAGE_ALIASES)).and_then(|m| match m {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    });

    let mut data = match object.get("data") {
        Some(Value::Object(data)) => data.clone(),
        _ => Map::new(),
    };
    for (key, value) in &object {
        let recognized = EVENT_KEYS.contains(&key.as_str()) || (ctx.accept_aliases && is_alias(key));
        if !recognized {
            data.insert(key.clone(), value.clone());
        }
    }
    for (key, value) in &ctx.metadata {
        data.entry(key.clone()).or_insert_with(|| value.clone());
    }
    data.insert(RAW_MESSAGE_KEY.to_string(), Value::String(raw.to_string()));

    let tags = match object.get("tags") {
        Some(Value::Object(tags)) => Some(
            tags.iter()
                .map(|(k, v)| {
                    let text = match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (k.clone(), text)
                })
                .collect::<BTreeMap<_, _>>(),
        ),
        _ => None,
    };

    Event {
        id: string_field("id").unwrap_or_else(|| ctx.id.clone()),
        ts,
        level,
        event_type: string_field("type").unwrap_or_else(|| "log".to_string()),
        service: string_field("service").unwrap_or_else(|| ctx.service.to_string()),
        run_id: string_field("run_id").unwrap_or_else(|| ctx.run_id.to_string()),
        session_id: string_field("session_id"),
        message,
        data: Some(data),
        tags,
        trace_id: string_field("trace_id"),
        span_id: string_field("span_id"),
        source: Some(EventSource::remote(ctx.backend.as_str(), ctx.backend_id)),
    }
}

fn unstructured_event(ctx: &LineContext<'_>, raw: &str) -> Event {
    let mut data = Map::new();
    data.insert(RAW_MESSAGE_KEY.to_string(), Value::String(raw.to_string()));
    for (key, value) in &ctx.metadata {
        data.insert(key.clone(), value.clone());
    }

    Event {
        id: ctx.id.clone(),
        ts: fallback_ts(ctx),
        level: Level::infer_from_text(raw),
        event_type: "log".to_string(),
        service: ctx.service.to_string(),
        run_id: ctx.run_id.to_string(),
        session_id: None,
        message: Some(raw.to_string()),
        data: Some(data),
        tags: None,
        trace_id: None,
        span_id: None,
        source: Some(EventSource::remote(ctx.backend.as_str(), ctx.backend_id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::SourceKind;
    use serde_json::json;

    fn ctx(accept_aliases: bool) -> LineContext<'static> {
        let mut metadata = Map::new();
        metadata.insert("pod".into(), json!("api-7d9f"));
        LineContext {
            backend: BackendKind::K8s,
            backend_id: "cluster-a",
            service: "api",
            run_id: "api-7d9f",
            id: "fallback-id".into(),
            ts: Some("2026-01-01T00:00:00.000Z".into()),
            metadata,
            accept_aliases,
        }
    }

    #[test]
    fn test_structured_line() {
        let raw = r#"{"level":"ERROR","message":"db down","session_id":"s1","attempt":3,"data":{"host":"db1"}}"#;
        let event = normalize_line(&ctx(false), raw);
        assert_eq!(event.level, Level::Error);
        assert_eq!(event.message.as_deref(), Some("db down"));
        assert_eq!(event.session_id.as_deref(), Some("s1"));
        assert_eq!(event.service, "api");
        assert_eq!(event.id, "fallback-id");
        assert_eq!(event.ts, "2026-01-01T00:00:00.000Z");

        let data = event.data.unwrap();
        assert_eq!(data["host"], "db1");
        assert_eq!(data["attempt"], 3);
        assert_eq!(data["pod"], "api-7d9f");
        assert_eq!(data[RAW_MESSAGE_KEY], raw);

        let source = event.source.unwrap();
        assert_eq!(source.kind, SourceKind::Mcp);
        assert_eq!(source.backend.as_deref(), Some("k8s"));
        assert_eq!(source.backend_id.as_deref(), Some("cluster-a"));
    }

    #[test]
    fn test_aliases_only_when_enabled() {
        let raw = r#"{"severity":"warning","msg":"slow","timestamp":"2026-02-01T10:00:00Z"}"#;

        let with_aliases = normalize_line(&ctx(true), raw);
        assert_eq!(with_aliases.message.as_deref(), Some("slow"));
        assert_eq!(with_aliases.ts, "2026-02-01T10:00:00Z");
        // "warning" is not one of the six levels
        assert_eq!(with_aliases.level, Level::Info);

        let without = normalize_line(&ctx(false), raw);
        assert_eq!(without.message.as_deref(), Some(raw));
    }

    #[test]
    fn test_unstructured_line() {
        let event = normalize_line(&ctx(false), "WARN: disk almost full, error budget ok");
        assert_eq!(event.level, Level::Error);
        assert_eq!(event.event_type, "log");
        assert_eq!(event.run_id, "api-7d9f");
        let data = event.data.unwrap();
        assert_eq!(data[RAW_MESSAGE_KEY], "WARN: disk almost full, error budget ok");
        assert_eq!(data["pod"], "api-7d9f");
    }

    #[test]
    fn test_json_without_known_keys_is_unstructured() {
        let event = normalize_line(&ctx(false), r#"{"foo": 1}"#);
        assert_eq!(event.message.as_deref(), Some(r#"{"foo": 1}"#));
    }

    #[test]
    fn test_epoch_timestamps() {
        let event = normalize_line(&ctx(true), r#"{"msg":"x","time":1767225600}"#);
        assert_eq!(event.ts, "2026-01-01T00:00:00.000Z");
    }
}
