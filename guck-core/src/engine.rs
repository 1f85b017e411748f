//! Request orchestration
//!
//! `search`: clamp the limit, resolve `since`, compile the query (failing
//! before any backend is touched), aggregate, redact, trim messages, shape,
//! then guard the output. `stats` and `sessions` skip the event-level steps.

use std::path::{Path, PathBuf};

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::aggregator::Aggregator;
use crate::backends::{build_backends, BackendError, BackendSet};
use crate::checkpoint::read_checkpoint;
use crate::config::{GuckConfig, LoadedConfig};
use crate::error::Result;
use crate::filter::EventFilter;
use crate::format::{format_events_text, project_event_fields, truncate_messages};
use crate::guard::{guard_output, GuardOptions, MessageLengths};
use crate::params::{OutputFormat, SearchParams, SessionsParams, StatsParams};
use crate::redact::Redactor;
use crate::time::{now_ms, parse_time_input_at};

/// `since` keyword that resolves to the stored checkpoint
pub const CHECKPOINT_KEYWORD: &str = "checkpoint";

pub struct QueryEngine {
    config: GuckConfig,
    store_dir: PathBuf,
    aggregator: Aggregator,
    redactor: Redactor,
    fixed_now: Option<i64>,
}

fn with_errors(mut payload: Map<String, Value>, errors: &[BackendError]) -> Value {
    if !errors.is_empty() {
        payload.insert("errors".to_string(), json!(errors));
    }
    Value::Object(payload)
}

impl QueryEngine {
    pub fn new(config: GuckConfig, store_dir: impl Into<PathBuf>, backends: BackendSet) -> Self {
        let redactor = Redactor::new(&config.redaction);
        Self {
            config,
            store_dir: store_dir.into(),
            aggregator: Aggregator::new(backends),
            redactor,
            fixed_now: None,
        }
    }

    /// Engine over the backends named by the loaded configuration
    pub fn from_config(loaded: &LoadedConfig) -> Self {
        let backends = build_backends(&loaded.config, &loaded.store_dir, loaded.env());
        debug!("Configured backends: {:?}", backends);
        Self::new(loaded.config.clone(), loaded.store_dir.clone(), backends)
    }

    /// Pin the clock (relative `since`/`until` and the default lookback)
    pub fn with_fixed_now(mut self, now_ms: i64) -> Self {
        self.fixed_now = Some(now_ms);
        self
    }

    pub fn config(&self) -> &GuckConfig {
        &self.config
    }

    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    fn now(&self) -> i64 {
        self.fixed_now.unwrap_or_else(now_ms)
    }

    /// Requested limit, defaulting to and capped at `mcp.max_results`
    pub fn clamp_limit(&self, requested: Option<usize>) -> usize {
        let ceiling = self.config.mcp.max_results.max(1);
        requested.unwrap_or(ceiling).clamp(1, ceiling)
    }

    /// Absolute lower bound for a request.
    ///
    /// `"checkpoint"` uses the stored checkpoint (no bound without one). When
    /// unset, the checkpoint is used if present, else now minus
    /// `mcp.default_lookback_ms`. Unparseable input means no bound.
    pub fn resolve_since(&self, since: Option<&str>, now: i64) -> Option<i64> {
        match since.map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) if s.eq_ignore_ascii_case(CHECKPOINT_KEYWORD) => read_checkpoint(&self.store_dir),
            Some(s) => parse_time_input_at(s, now),
            None => read_checkpoint(&self.store_dir)
                .or(Some(now - self.config.mcp.default_lookback_ms)),
        }
    }

    pub async fn search(&self, params: &SearchParams) -> Result<Value> {
        let now = self.now();
        let limit = self.clamp_limit(params.limit);
        let mut filter = EventFilter::for_search(params, now)?;
        filter.since_ms = self.resolve_since(params.since.as_deref(), now);

        let result = self.aggregator.search(&filter, limit, &params.backends).await?;
        let mut events = self.redactor.redact_events(result.events);
        let lengths = MessageLengths::of(&events);

        let max_message_chars = params
            .max_message_chars
            .unwrap_or(self.config.mcp.max_message_chars);
        let focus = params
            .contains
            .as_deref()
            .filter(|c| !c.is_empty())
            .or_else(|| filter.query.as_ref().and_then(|q| q.focus_term()));
        truncate_messages(&mut events, max_message_chars, focus);

        let mut payload = Map::new();
        payload.insert("format".into(), json!(params.format.as_str()));
        payload.insert("count".into(), json!(events.len()));
        payload.insert("truncated".into(), json!(result.truncated));
        match params.format {
            OutputFormat::Text => {
                let text = format_events_text(&events, params.template.as_deref());
                payload.insert("text".into(), Value::String(text));
            }
            OutputFormat::Json if !params.fields.is_empty() => {
                let projected: Vec<Value> = events
                    .iter()
                    .map(|e| Value::Object(project_event_fields(e, &params.fields, params.flatten)))
                    .collect();
                payload.insert("events".into(), Value::Array(projected));
            }
            OutputFormat::Json => {
                payload.insert("events".into(), json!(events));
            }
        }
        let payload = with_errors(payload, &result.errors);

        let options = GuardOptions {
            max_output_chars: params
                .max_output_chars
                .unwrap_or(self.config.mcp.max_output_chars),
            force: params.force,
            format: params.format,
            items: events.len(),
            truncated: result.truncated,
            limit: Some(limit),
        };
        Ok(guard_output(payload, &options, lengths).into_value())
    }

    pub async fn stats(&self, params: &StatsParams) -> Result<Value> {
        let now = self.now();
        let limit = self.clamp_limit(params.limit);
        let mut filter = EventFilter::for_stats(params, now);
        filter.since_ms = self.resolve_since(params.since.as_deref(), now);

        let result = self
            .aggregator
            .stats(&filter, params.group_by, limit, &params.backends)
            .await?;

        let mut payload = Map::new();
        payload.insert("group_by".into(), json!(params.group_by));
        payload.insert("buckets".into(), json!(result.buckets));
        payload.insert("truncated".into(), json!(result.truncated));
        let payload = with_errors(payload, &result.errors);

        let options = GuardOptions {
            max_output_chars: params
                .max_output_chars
                .unwrap_or(self.config.mcp.max_output_chars),
            force: params.force,
            format: OutputFormat::Json,
            items: result.buckets.len(),
            truncated: result.truncated,
            limit: Some(limit),
        };
        Ok(guard_output(payload, &options, MessageLengths::default()).into_value())
    }

    pub async fn sessions(&self, params: &SessionsParams) -> Result<Value> {
        let now = self.now();
        let limit = self.clamp_limit(params.limit);
        let mut filter = EventFilter::for_sessions(params, now);
        filter.since_ms = self.resolve_since(params.since.as_deref(), now);

        let result = self
            .aggregator
            .sessions(&filter, limit, &params.backends)
            .await?;

        let mut payload = Map::new();
        payload.insert("sessions".into(), json!(result.sessions));
        payload.insert("truncated".into(), json!(result.truncated));
        let payload = with_errors(payload, &result.errors);

        let options = GuardOptions {
            max_output_chars: params
                .max_output_chars
                .unwrap_or(self.config.mcp.max_output_chars),
            force: params.force,
            format: OutputFormat::Json,
            items: result.sessions.len(),
            truncated: result.truncated,
            limit: Some(limit),
        };
        Ok(guard_output(payload, &options, MessageLengths::default()).into_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::write_checkpoint;
    use crate::config::EnvSnapshot;
    use tempfile::TempDir;

    const NOW: i64 = 1_767_225_600_000;

    fn engine(dir: &Path) -> QueryEngine {
        let config = GuckConfig::default();
        let backends = build_backends(&config, dir, &EnvSnapshot::default());
        QueryEngine::new(config, dir, backends).with_fixed_now(NOW)
    }

    #[test]
    fn test_clamp_limit() {
        let dir = TempDir::new().unwrap();
        let engine = engine(dir.path());
        assert_eq!(engine.clamp_limit(None), 200);
        assert_eq!(engine.clamp_limit(Some(5)), 5);
        assert_eq!(engine.clamp_limit(Some(5000)), 200);
        assert_eq!(engine.clamp_limit(Some(0)), 1);
    }

    #[test]
    fn test_since_resolution() {
        let dir = TempDir::new().unwrap();
        let engine = engine(dir.path());

        assert_eq!(engine.resolve_since(None, NOW), Some(NOW - 300_000));
        assert_eq!(engine.resolve_since(Some("15m"), NOW), Some(NOW - 900_000));
        assert_eq!(engine.resolve_since(Some("checkpoint"), NOW), None);
        assert_eq!(engine.resolve_since(Some("whenever"), NOW), None);

        write_checkpoint(dir.path(), NOW - 42).unwrap();
        assert_eq!(engine.resolve_since(None, NOW), Some(NOW - 42));
        assert_eq!(engine.resolve_since(Some("Checkpoint"), NOW), Some(NOW - 42));
        assert_eq!(engine.resolve_since(Some("1h"), NOW), Some(NOW - 3_600_000));
    }

    #[tokio::test]
    async fn test_invalid_query_fails_before_search() {
        let dir = TempDir::new().unwrap();
        let params = SearchParams {
            query: Some("foo AND".into()),
            ..SearchParams::default()
        };
        let err = engine(dir.path()).search(&params).await.unwrap_err();
        assert_eq!(err.error_code(), "INVALID_QUERY");
    }
}
