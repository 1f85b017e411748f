//! Redaction of sensitive values
//!
//! Two independent mechanisms:
//!
//! - **key-based**: any object key in `data`/`tags` whose lowercased name is
//!   in the configured key set has its value replaced with `"[REDACTED]"`,
//!   recursively through nested objects and arrays
//! - **pattern-based**: every configured regex is applied globally and
//!   case-insensitively to `message` and to every string leaf of
//!   `data`/`tags`
//!
//! The same [`Redactor`] is used before an event is appended and again on
//! every read. It is a pure transform and is idempotent.

use std::collections::{BTreeMap, HashSet};

use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value};
use tracing::warn;

use crate::config::RedactionConfig;
use crate::event::Event;

/// Replacement for every scrubbed value
pub const REDACTED: &str = "[REDACTED]";

/// Compiled redaction rules
#[derive(Debug, Clone)]
pub struct Redactor {
    enabled: bool,
    keys: HashSet<String>,
    patterns: Vec<Regex>,
}

impl Redactor {
    /// Compile the rules from configuration. Invalid patterns are skipped.
    pub fn new(config: &RedactionConfig) -> Self {
        let keys = config
            .keys
            .iter()
            .map(|key| key.trim().to_lowercase())
            .filter(|key| !key.is_empty())
            .collect();

        let patterns = config
            .patterns
            .iter()
            .filter_map(|pattern| {
                match RegexBuilder::new(pattern).case_insensitive(true).build() {
                    Ok(regex) => Some(regex),
                    Err(e) => {
                        warn!("Skipping invalid redaction pattern {:?}: {}", pattern, e);
                        None
                    }
                }
            })
            .collect();

        Self {
            enabled: config.enabled,
            keys,
            patterns,
        }
    }

    /// A redactor that returns every event unchanged
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            keys: HashSet::new(),
            patterns: Vec::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Scrub one event
    pub fn redact_event(&self, mut event: Event) -> Event {
        if !self.enabled {
            return event;
        }
        if let Some(message) = event.message.take() {
            event.message = Some(self.redact_string(&message));
        }
        if let Some(data) = event.data.take() {
            event.data = Some(self.redact_map(data));
        }
        if let Some(tags) = event.tags.take() {
            event.tags = Some(self.redact_tags(tags));
        }
        event
    }

    /// Scrub a batch of events
    pub fn redact_events(&self, events: Vec<Event>) -> Vec<Event> {
        if !self.enabled {
            return events;
        }
        events.into_iter().map(|e| self.redact_event(e)).collect()
    }

    /// Apply every pattern to a string
    pub fn redact_string(&self, value: &str) -> String {
        let mut next = value.to_string();
        for pattern in &self.patterns {
            if pattern.is_match(&next) {
                next = pattern.replace_all(&next, REDACTED).into_owned();
            }
        }
        next
    }

    /// Scrub an arbitrary JSON value
    pub fn redact_value(&self, value: Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.redact_string(&s)),
            Value::Array(items) => {
                Value::Array(items.into_iter().map(|v| self.redact_value(v)).collect())
            }
            Value::Object(map) => Value::Object(self.redact_map(map)),
            other => other,
        }
    }

    fn redact_map(&self, map: Map<String, Value>) -> Map<String, Value> {
        map.into_iter()
            .map(|(key, value)| {
                if self.is_sensitive_key(&key) {
                    (key, Value::String(REDACTED.to_string()))
                } else {
                    let value = self.redact_value(value);
                    (key, value)
                }
            })
            .collect()
    }

    fn redact_tags(&self, tags: BTreeMap<String, String>) -> BTreeMap<String, String> {
        tags.into_iter()
            .map(|(key, value)| {
                if self.is_sensitive_key(&key) {
                    (key, REDACTED.to_string())
                } else {
                    let value = self.redact_string(&value);
                    (key, value)
                }
            })
            .collect()
    }

    fn is_sensitive_key(&self, key: &str) -> bool {
        self.keys.contains(&key.to_lowercase())
    }
}
