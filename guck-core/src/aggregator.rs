//! Fan-out over several backends
//!
//! Per request: select the backends named in `backends[]` (by id or type),
//! query them concurrently, turn individual failures into [`BackendError`]
//! entries, then merge. Search results are re-checked against the query,
//! sorted newest first and cut to the limit.

use std::cmp::Ordering;
use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::backends::{
    BackendError, BackendSet, LogBackend, SessionAccumulator, SessionSummary, StatsAccumulator,
    StatsBucket,
};
use crate::error::{GuckError, Result};
use crate::event::Event;
use crate::filter::EventFilter;
use crate::params::GroupBy;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedSearch {
    pub events: Vec<Event>,
    pub truncated: bool,
    pub errors: Vec<BackendError>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedStats {
    pub buckets: Vec<StatsBucket>,
    pub truncated: bool,
    pub errors: Vec<BackendError>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedSessions {
    pub sessions: Vec<SessionSummary>,
    pub truncated: bool,
    pub errors: Vec<BackendError>,
}

/// Newest first; events whose `ts` does not parse sort last
pub fn compare_newest_first(a: &Event, b: &Event) -> Ordering {
    match (a.timestamp_ms(), b.timestamp_ms()) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn backend_error(backend: &dyn LogBackend, err: &GuckError) -> BackendError {
    warn!("Backend {} ({}) failed: {}", backend.id(), backend.kind(), err);
    BackendError::new(backend.kind().as_str(), backend.id(), err.to_string())
}

pub struct Aggregator {
    backends: Vec<Arc<dyn LogBackend>>,
    config_errors: Vec<BackendError>,
}

impl Aggregator {
    pub fn new(set: BackendSet) -> Self {
        Self {
            backends: set.backends,
            config_errors: set.errors,
        }
    }

    pub fn backends(&self) -> &[Arc<dyn LogBackend>] {
        &self.backends
    }

    /// Backends named by id or type, plus configuration errors for the same
    /// names. An empty request selects everything. A request that matches
    /// nothing at all is an error.
    pub fn select(&self, requested: &[String]) -> Result<(Vec<Arc<dyn LogBackend>>, Vec<BackendError>)> {
        let wanted: Vec<String> = requested
            .iter()
            .map(|r| r.trim().to_lowercase())
            .filter(|r| !r.is_empty())
            .collect();
        if wanted.is_empty() {
            return Ok((self.backends.clone(), self.config_errors.clone()));
        }

        let matches = |kind: &str, id: &str| {
            wanted
                .iter()
                .any(|w| w == &id.to_lowercase() || w == kind)
        };
        let selected: Vec<Arc<dyn LogBackend>> = self
            .backends
            .iter()
            .filter(|b| matches(b.kind().as_str(), b.id()))
            .cloned()
            .collect();
        let errors: Vec<BackendError> = self
            .config_errors
            .iter()
            .filter(|e| matches(&e.backend.to_lowercase(), &e.backend_id))
            .cloned()
            .collect();

        if selected.is_empty() && errors.is_empty() {
            return Err(GuckError::NoMatchingBackend {
                requested: requested.to_vec(),
            });
        }
        Ok((selected, errors))
    }

    pub async fn search(
        &self,
        filter: &EventFilter,
        limit: usize,
        requested: &[String],
    ) -> Result<AggregatedSearch> {
        let (backends, mut errors) = self.select(requested)?;
        debug!("Searching {} backends", backends.len());

        let results = join_all(backends.iter().map(|b| b.search(filter, limit))).await;

        let mut events = Vec::new();
        let mut truncated = false;
        for (backend, result) in backends.iter().zip(results) {
            match result {
                Ok(result) => {
                    truncated |= result.truncated;
                    events.extend(result.events);
                }
                Err(e) => errors.push(backend_error(backend.as_ref(), &e)),
            }
        }

        if let Some(query) = &filter.query {
            events.retain(|event| query.matches_message(event.message.as_deref()));
        }
        events.sort_by(compare_newest_first);
        if events.len() > limit {
            events.truncate(limit);
            truncated = true;
        }

        Ok(AggregatedSearch {
            events,
            truncated,
            errors,
        })
    }

    pub async fn stats(
        &self,
        filter: &EventFilter,
        group_by: GroupBy,
        limit: usize,
        requested: &[String],
    ) -> Result<AggregatedStats> {
        let (backends, mut errors) = self.select(requested)?;
        let results = join_all(backends.iter().map(|b| b.stats(filter, group_by, limit))).await;

        let mut acc = StatsAccumulator::new(group_by);
        let mut truncated = false;
        for (backend, result) in backends.iter().zip(results) {
            match result {
                Ok(result) => {
                    truncated |= result.truncated;
                    result.buckets.iter().for_each(|b| acc.merge_bucket(b));
                }
                Err(e) => errors.push(backend_error(backend.as_ref(), &e)),
            }
        }

        let merged = acc.finish(limit);
        Ok(AggregatedStats {
            buckets: merged.buckets,
            truncated: truncated || merged.truncated,
            errors,
        })
    }

    pub async fn sessions(
        &self,
        filter: &EventFilter,
        limit: usize,
        requested: &[String],
    ) -> Result<AggregatedSessions> {
        let (backends, mut errors) = self.select(requested)?;
        let results = join_all(backends.iter().map(|b| b.sessions(filter, limit))).await;

        let mut acc = SessionAccumulator::new();
        let mut truncated = false;
        for (backend, result) in backends.iter().zip(results) {
            match result {
                Ok(result) => {
                    truncated |= result.truncated;
                    result.sessions.iter().for_each(|s| acc.merge_summary(s));
                }
                Err(e) => errors.push(backend_error(backend.as_ref(), &e)),
            }
        }

        let merged = acc.finish(limit);
        Ok(AggregatedSessions {
            sessions: merged.sessions,
            truncated: truncated || merged.truncated,
            errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{
        BackendKind, SearchResult, SessionsResult, StatsResult,
    };
    use crate::event::{EmitContext, EventInput};
    use crate::query::compile;
    use async_trait::async_trait;

    /// Serves a fixed event list, or fails
    struct FixedBackend {
        kind: BackendKind,
        id: String,
        events: Vec<Event>,
        fail: bool,
    }

    impl FixedBackend {
        fn new(kind: BackendKind, id: &str, stamps: &[&str]) -> Arc<dyn LogBackend> {
            let ctx = EmitContext::new("api").with_session_id(id);
            let events = stamps
                .iter()
                .map(|ts| {
                    let mut input = EventInput::message(format!("{} at {}", id, ts));
                    input.ts = Some(ts.to_string());
                    input.normalize(&ctx)
                })
                .collect();
            Arc::new(Self {
                kind,
                id: id.to_string(),
                events,
                fail: false,
            })
        }

        fn failing(id: &str) -> Arc<dyn LogBackend> {
            Arc::new(Self {
                kind: BackendKind::Cloudwatch,
                id: id.to_string(),
                events: Vec::new(),
                fail: true,
            })
        }
    }

    #[async_trait]
    impl LogBackend for FixedBackend {
        fn kind(&self) -> BackendKind {
            self.kind
        }

        fn id(&self) -> &str {
            &self.id
        }

        async fn search(&self, filter: &EventFilter, limit: usize) -> Result<SearchResult> {
            if self.fail {
                return Err(GuckError::remote("cloudwatch", "throttled"));
            }
            let events: Vec<Event> = self
                .events
                .iter()
                .filter(|e| filter.matches(e))
                .take(limit)
                .cloned()
                .collect();
            Ok(SearchResult {
                events,
                truncated: false,
            })
        }

        async fn stats(&self, filter: &EventFilter, group_by: GroupBy, limit: usize) -> Result<StatsResult> {
            let mut acc = StatsAccumulator::new(group_by);
            self.events.iter().filter(|e| filter.matches(e)).for_each(|e| acc.add(e));
            Ok(acc.finish(limit))
        }

        async fn sessions(&self, filter: &EventFilter, limit: usize) -> Result<SessionsResult> {
            let mut acc = SessionAccumulator::new();
            self.events.iter().filter(|e| filter.matches(e)).for_each(|e| acc.add(e));
            Ok(acc.finish(limit))
        }
    }

    fn aggregator(backends: Vec<Arc<dyn LogBackend>>, errors: Vec<BackendError>) -> Aggregator {
        Aggregator::new(BackendSet { backends, errors })
    }

    fn two_backends() -> Aggregator {
        aggregator(
            vec![
                FixedBackend::new(
                    BackendKind::Local,
                    "a",
                    &["2026-01-01T00:01:00Z", "2026-01-01T00:04:00Z"],
                ),
                FixedBackend::new(
                    BackendKind::Cloudwatch,
                    "b",
                    &["2026-01-01T00:05:00Z", "2026-01-01T00:02:00Z", "2026-01-01T00:03:00Z"],
                ),
            ],
            Vec::new(),
        )
    }

    #[tokio::test]
    async fn test_merge_is_sorted_newest_first() {
        let result = two_backends()
            .search(&EventFilter::default(), 10, &[])
            .await
            .unwrap();
        let stamps: Vec<&str> = result.events.iter().map(|e| e.ts.as_str()).collect();
        assert_eq!(
            stamps,
            vec![
                "2026-01-01T00:05:00Z",
                "2026-01-01T00:04:00Z",
                "2026-01-01T00:03:00Z",
                "2026-01-01T00:02:00Z",
                "2026-01-01T00:01:00Z",
            ]
        );
        assert!(!result.truncated);
        assert!(result.errors.is_empty());
    }

    #[tokio::test]
    async fn test_merge_truncates_to_limit() {
        let result = two_backends()
            .search(&EventFilter::default(), 2, &[])
            .await
            .unwrap();
        assert_eq!(result.events.len(), 2);
        assert_eq!(result.events[0].ts, "2026-01-01T00:05:00Z");
        assert!(result.truncated);
    }

    #[tokio::test]
    async fn test_selection_by_id_and_type() {
        let agg = two_backends();
        let by_id = agg.search(&EventFilter::default(), 10, &["a".into()]).await.unwrap();
        assert_eq!(by_id.events.len(), 2);

        let by_type = agg
            .search(&EventFilter::default(), 10, &["CloudWatch".into()])
            .await
            .unwrap();
        assert_eq!(by_type.events.len(), 3);

        let err = agg
            .search(&EventFilter::default(), 10, &["loki".into()])
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "NO_MATCHING_BACKEND");
    }

    #[tokio::test]
    async fn test_backend_failure_is_isolated() {
        let agg = aggregator(
            vec![
                FixedBackend::new(BackendKind::Local, "local", &["2026-01-01T00:00:00Z"]),
                FixedBackend::failing("prod"),
            ],
            vec![BackendError::new("loki", "grafana", "Unknown backend type 'loki'")],
        );
        let result = agg.search(&EventFilter::default(), 10, &[]).await.unwrap();
        assert_eq!(result.events.len(), 1);
        assert_eq!(result.errors.len(), 2);
        assert_eq!(result.errors[0].backend_id, "grafana");
        assert_eq!(result.errors[1].backend, "cloudwatch");
        assert_eq!(result.errors[1].backend_id, "prod");
        assert!(result.errors[1].message.contains("throttled"));
    }

    #[tokio::test]
    async fn test_query_is_reapplied_after_merge() {
        /// Ignores the filter entirely
        struct Sloppy(Vec<Event>);

        #[async_trait]
        impl LogBackend for Sloppy {
            fn kind(&self) -> BackendKind {
                BackendKind::K8s
            }
            fn id(&self) -> &str {
                "sloppy"
            }
            async fn search(&self, _: &EventFilter, _: usize) -> Result<SearchResult> {
                Ok(SearchResult {
                    events: self.0.clone(),
                    truncated: false,
                })
            }
            async fn stats(&self, _: &EventFilter, _: GroupBy, _: usize) -> Result<StatsResult> {
                Ok(StatsResult::default())
            }
            async fn sessions(&self, _: &EventFilter, _: usize) -> Result<SessionsResult> {
                Ok(SessionsResult::default())
            }
        }

        let ctx = EmitContext::new("api");
        let agg = aggregator(
            vec![Arc::new(Sloppy(vec![
                EventInput::message("payment failed").normalize(&ctx),
                EventInput::message("payment ok").normalize(&ctx),
            ]))],
            Vec::new(),
        );
        let filter = EventFilter {
            query: Some(compile("payment AND failed").unwrap()),
            ..EventFilter::default()
        };
        let result = agg.search(&filter, 10, &[]).await.unwrap();
        assert_eq!(result.events.len(), 1);
        assert_eq!(result.events[0].message.as_deref(), Some("payment failed"));
    }

    #[tokio::test]
    async fn test_stats_and_sessions_merge() {
        let agg = two_backends();
        let stats = agg
            .stats(&EventFilter::default(), GroupBy::Type, 10, &[])
            .await
            .unwrap();
        assert_eq!(stats.buckets, vec![StatsBucket { key: "log".into(), count: 5 }]);

        let sessions = agg.sessions(&EventFilter::default(), 10, &[]).await.unwrap();
        assert_eq!(sessions.sessions.len(), 2);
        assert_eq!(sessions.sessions[0].session_id, "b");
        assert_eq!(sessions.sessions[0].last_ts, "2026-01-01T00:05:00Z");
        assert_eq!(sessions.sessions[1].event_count, 2);
    }

    #[test]
    fn test_unparseable_timestamps_sort_last() {
        let ctx = EmitContext::new("api");
        let mut bad = EventInput::message("x");
        bad.ts = Some("garbage".into());
        let mut good = EventInput::message("y");
        good.ts = Some("2026-01-01T00:00:00Z".into());
        let mut events = vec![bad.normalize(&ctx), good.normalize(&ctx)];
        events.sort_by(compare_newest_first);
        assert_eq!(events[0].ts, "2026-01-01T00:00:00Z");
    }
}
