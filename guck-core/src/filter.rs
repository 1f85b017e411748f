//! Event-matching predicate shared by every backend
//!
//! The local store and the remote adapters run exactly the same checks, so a
//! query returns the same events whichever backend holds them.

use crate::event::Event;
use crate::params::{SearchParams, SessionsParams, StatsParams};
use crate::query::{compile_optional, CompiledQuery, QueryError};
use crate::time::parse_time_input_at;

/// Compiled filter
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub service: Option<String>,
    pub session_id: Option<String>,
    pub run_id: Option<String>,
    pub types: Vec<String>,
    /// Lowercased level names
    pub levels: Vec<String>,
    /// Lowercased substring
    pub contains: Option<String>,
    pub since_ms: Option<i64>,
    pub until_ms: Option<i64>,
    pub query: Option<CompiledQuery>,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.is_empty()).cloned()
}

impl EventFilter {
    /// Filter for a search request; fails only when `query` does not compile
    pub fn for_search(params: &SearchParams, now_ms: i64) -> Result<Self, QueryError> {
        Ok(Self {
            service: non_empty(&params.service),
            session_id: non_empty(&params.session_id),
            run_id: non_empty(&params.run_id),
            types: params.types.clone(),
            levels: params.levels.iter().map(|l| l.to_lowercase()).collect(),
            contains: non_empty(&params.contains).map(|c| c.to_lowercase()),
            since_ms: params.since.as_deref().and_then(|s| parse_time_input_at(s, now_ms)),
            until_ms: params.until.as_deref().and_then(|s| parse_time_input_at(s, now_ms)),
            query: compile_optional(params.query.as_deref())?,
        })
    }

    pub fn for_stats(params: &StatsParams, now_ms: i64) -> Self {
        Self {
            service: non_empty(&params.service),
            session_id: non_empty(&params.session_id),
            run_id: non_empty(&params.run_id),
            since_ms: params.since.as_deref().and_then(|s| parse_time_input_at(s, now_ms)),
            until_ms: params.until.as_deref().and_then(|s| parse_time_input_at(s, now_ms)),
            ..Self::default()
        }
    }

    pub fn for_sessions(params: &SessionsParams, now_ms: i64) -> Self {
        Self {
            service: non_empty(&params.service),
            since_ms: params.since.as_deref().and_then(|s| parse_time_input_at(s, now_ms)),
            until_ms: params.until.as_deref().and_then(|s| parse_time_input_at(s, now_ms)),
            ..Self::default()
        }
    }

    /// Whether a time bound is set
    pub fn has_time_bounds(&self) -> bool {
        self.since_ms.is_some() || self.until_ms.is_some()
    }

    /// Field filters, time bounds, then the message query
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(service) = &self.service {
            if &event.service != service {
                return false;
            }
        }
        if let Some(session_id) = &self.session_id {
            if event.session_id.as_ref() != Some(session_id) {
                return false;
            }
        }
        if let Some(run_id) = &self.run_id {
            if &event.run_id != run_id {
                return false;
            }
        }
        if !self.types.is_empty() && !self.types.iter().any(|t| t == &event.event_type) {
            return false;
        }
        if !self.levels.is_empty() && !self.levels.iter().any(|l| l == event.level.as_str()) {
            return false;
        }
        if let Some(needle) = &self.contains {
            if !contains_text(event, needle) {
                return false;
            }
        }
        if self.has_time_bounds() {
            let Some(ts) = event.timestamp_ms() else {
                return false;
            };
            if self.since_ms.is_some_and(|since| ts < since) {
                return false;
            }
            if self.until_ms.is_some_and(|until| ts > until) {
                return false;
            }
        }
        match &self.query {
            Some(query) => query.matches_message(event.message.as_deref()),
            None => true,
        }
    }
}

/// Case-insensitive substring check across message, type, session id and
/// the serialized `data` payload. `needle` must already be lowercased.
fn contains_text(event: &Event, needle: &str) -> bool {
    let in_str = |s: &str| s.to_lowercase().contains(needle);
    if event.message.as_deref().is_some_and(in_str) {
        return true;
    }
    if in_str(&event.event_type) {
        return true;
    }
    if event.session_id.as_deref().is_some_and(in_str) {
        return true;
    }
    event
        .data
        .as_ref()
        .and_then(|data| serde_json::to_string(data).ok())
        .is_some_and(|text| in_str(&text))
}
