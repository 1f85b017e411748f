//! Normalization of partial input into a well-formed [`Event`]

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::{Event, EventSource, Level, SourceKind};
use crate::time::format_iso;

/// Defaults applied to fields the caller left unset.
///
/// Passed explicitly into normalization instead of being read from the
/// process environment at load time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmitContext {
    pub service: String,
    pub run_id: String,
    pub session_id: Option<String>,
}

impl EmitContext {
    /// Context with a freshly generated run id and no session
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            run_id: Uuid::new_v4().to_string(),
            session_id: None,
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// Partial event as supplied by a caller; every field is optional
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventInput {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub ts: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default, rename = "type")]
    pub event_type: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<Map<String, Value>>,
    #[serde(default)]
    pub tags: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub trace_id: Option<String>,
    #[serde(default)]
    pub span_id: Option<String>,
    #[serde(default)]
    pub source: Option<EventSource>,
}

impl EventInput {
    /// Input carrying only a message
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = Some(level.into());
        self
    }

    pub fn with_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = Some(data);
        self
    }

    /// Fill every required field, using `ctx` for service/run/session
    /// defaults and `now` for a missing timestamp.
    pub fn normalize_at(self, ctx: &EmitContext, now: DateTime<Utc>) -> Event {
        Event {
            id: self.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            ts: self.ts.unwrap_or_else(|| format_iso(now)),
            level: self.level.as_deref().map(Level::normalize).unwrap_or_default(),
            event_type: self.event_type.unwrap_or_else(|| "log".to_string()),
            service: self.service.unwrap_or_else(|| ctx.service.clone()),
            run_id: self.run_id.unwrap_or_else(|| ctx.run_id.clone()),
            session_id: self.session_id.or_else(|| ctx.session_id.clone()),
            message: self.message,
            data: self.data,
            tags: self.tags,
            trace_id: self.trace_id,
            span_id: self.span_id,
            source: Some(self.source.unwrap_or_else(|| EventSource::new(SourceKind::Sdk))),
        }
    }

    pub fn normalize(self, ctx: &EmitContext) -> Event {
        self.normalize_at(ctx, Utc::now())
    }
}
