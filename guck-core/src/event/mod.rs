//! Event model
//!
//! [`Event`] is the canonical record. It has the same shape whether it was
//! captured by an SDK, read from the local JSONL store, or synthesized from a
//! CloudWatch / Kubernetes log line.
//!
//! After normalization `id`, `ts`, `level`, `type`, `service` and `run_id` are
//! always present. Events are immutable once written.

mod normalize;

pub use normalize::{EmitContext, EventInput};

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::time::parse_timestamp_ms;

/// Top-level fields that projection and templating may expose.
///
/// Anything not listed here is never emitted by the formatter, even if a
/// future version of the event carries it.
pub const ALLOWED_FIELDS: &[&str] = &[
    "id",
    "ts",
    "level",
    "type",
    "service",
    "run_id",
    "session_id",
    "message",
    "data",
    "tags",
    "trace_id",
    "span_id",
    "source",
];

/// Severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Level {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Fatal,
}

impl Level {
    pub const ALL: [Level; 6] = [
        Level::Trace,
        Level::Debug,
        Level::Info,
        Level::Warn,
        Level::Error,
        Level::Fatal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }

    /// Case-insensitive match against the six level names.
    ///
    /// Anything else (including `"warning"` or an empty string) is `Info`.
    pub fn normalize(raw: &str) -> Level {
        let lower = raw.trim().to_lowercase();
        Level::ALL
            .into_iter()
            .find(|level| level.as_str() == lower)
            .unwrap_or(Level::Info)
    }

    /// Guess a level from free text, checked in priority order
    /// fatal > error > warn > debug > trace, else info.
    pub fn infer_from_text(text: &str) -> Level {
        let lower = text.to_lowercase();
        [
            Level::Fatal,
            Level::Error,
            Level::Warn,
            Level::Debug,
            Level::Trace,
        ]
        .into_iter()
        .find(|level| lower.contains(level.as_str()))
        .unwrap_or(Level::Info)
    }

    /// Error and fatal count towards a session's error tally
    pub fn is_error(&self) -> bool {
        matches!(self, Level::Error | Level::Fatal)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Level {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Level {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Ok(raw.as_str().map(Level::normalize).unwrap_or_default())
    }
}

/// Where an event came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Sdk,
    Stdout,
    Stderr,
    Mcp,
    #[serde(other)]
    Unknown,
}

/// Provenance of an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSource {
    pub kind: SourceKind,

    /// Backend type when read from a non-local backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,

    /// Configured backend id when read from a non-local backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_id: Option<String>,

    /// Instrumentation call site
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u64>,
}

impl EventSource {
    pub fn new(kind: SourceKind) -> Self {
        Self {
            kind,
            backend: None,
            backend_id: None,
            file: None,
            line: None,
        }
    }

    /// Provenance for an event synthesized by a remote backend adapter
    pub fn remote(backend: &str, backend_id: &str) -> Self {
        Self {
            backend: Some(backend.to_string()),
            backend_id: Some(backend_id.to_string()),
            ..Self::new(SourceKind::Mcp)
        }
    }
}

/// A single captured event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier
    pub id: String,

    /// ISO-8601 timestamp, kept verbatim as written
    pub ts: String,

    pub level: Level,

    /// Free-form tag, `"log"` by default
    #[serde(rename = "type")]
    pub event_type: String,

    /// Scoping / partition key
    pub service: String,

    /// Groups events from one process invocation
    pub run_id: String,

    /// Groups events from one logical debugging session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Structured payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,

    /// Flat string map
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_tags"
    )]
    pub tags: Option<BTreeMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<EventSource>,
}

impl Event {
    /// Epoch milliseconds of `ts`, if it parses
    pub fn timestamp_ms(&self) -> Option<i64> {
        parse_timestamp_ms(&self.ts)
    }

    /// Message text, empty when absent
    pub fn message_text(&self) -> &str {
        self.message.as_deref().unwrap_or("")
    }

    /// Generic JSON view used by projection and templating
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Tags are a flat string map; scalar non-string values written by other
/// SDKs are kept as their JSON text rather than rejecting the whole line.
fn deserialize_tags<'de, D>(deserializer: D) -> Result<Option<BTreeMap<String, String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Map<String, Value>>::deserialize(deserializer)?;
    Ok(raw.map(|map| {
        map.into_iter()
            .map(|(key, value)| {
                let text = match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                (key, text)
            })
            .collect()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_level_normalization() {
        assert_eq!(Level::normalize("ERROR"), Level::Error);
        assert_eq!(Level::normalize("Warn"), Level::Warn);
        assert_eq!(Level::normalize("warning"), Level::Info);
        assert_eq!(Level::normalize(""), Level::Info);
    }

    #[test]
    fn test_level_inference_priority() {
        assert_eq!(Level::infer_from_text("FATAL error in worker"), Level::Fatal);
        assert_eq!(Level::infer_from_text("an Error and a warning"), Level::Error);
        assert_eq!(Level::infer_from_text("warn: disk"), Level::Warn);
        assert_eq!(Level::infer_from_text("debug trace"), Level::Debug);
        assert_eq!(Level::infer_from_text("request served"), Level::Info);
    }

    #[test]
    fn test_event_deserialization_is_lenient() {
        let event: Event = serde_json::from_value(json!({
            "id": "e1",
            "ts": "2026-01-02T03:04:05.000Z",
            "level": "LOUD",
            "type": "log",
            "service": "api",
            "run_id": "r1",
            "tags": {"env": "dev", "shard": 3},
            "source": {"kind": "sdk", "file": "main.py", "line": 10}
        }))
        .unwrap();

        assert_eq!(event.level, Level::Info);
        let tags = event.tags.unwrap();
        assert_eq!(tags["env"], "dev");
        assert_eq!(tags["shard"], "3");
        assert_eq!(event.source.unwrap().line, Some(10));
    }

    #[test]
    fn test_event_serialization_omits_absent_fields() {
        let event = Event {
            id: "e1".to_string(),
            ts: "2026-01-02T03:04:05.000Z".to_string(),
            level: Level::Warn,
            event_type: "log".to_string(),
            service: "api".to_string(),
            run_id: "r1".to_string(),
            session_id: None,
            message: Some("hello".to_string()),
            data: None,
            tags: None,
            trace_id: None,
            span_id: None,
            source: Some(EventSource::new(SourceKind::Stdout)),
        };
        let value = event.to_value();
        assert_eq!(value["type"], "log");
        assert_eq!(value["level"], "warn");
        assert_eq!(value["source"], json!({"kind": "stdout"}));
        assert!(value.get("session_id").is_none());
        assert!(value.get("data").is_none());
    }
}
