//! Local JSONL store as a [`LogBackend`]
//!
//! Search keeps file-enumeration order (sorted paths) and stops at the first
//! `limit` matches; global time ordering is left to the aggregator.

use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::debug;

use super::{
    BackendKind, LogBackend, SearchResult, SessionAccumulator, SessionsResult, StatsAccumulator,
    StatsResult,
};
use crate::error::Result;
use crate::event::Event;
use crate::filter::EventFilter;
use crate::params::GroupBy;
use crate::storage::JsonlStore;

const DAY_MS: i64 = 86_400_000;

pub struct LocalBackend {
    id: String,
    store: JsonlStore,
}

impl LocalBackend {
    pub fn new(id: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            store: JsonlStore::new(dir),
        }
    }

    pub fn store(&self) -> &JsonlStore {
        &self.store
    }

    /// Candidate files, minus date partitions that lie wholly outside the
    /// filter's time bounds
    async fn candidate_files(&self, filter: &EventFilter) -> Result<Vec<PathBuf>> {
        let files = self.store.list_files(filter.service.as_deref()).await?;
        if !filter.has_time_bounds() {
            return Ok(files);
        }
        Ok(files
            .into_iter()
            .filter(|path| partition_overlaps(path, filter.since_ms, filter.until_ms))
            .collect())
    }

    /// Visit every matching event until the visitor breaks
    async fn for_each_match<F>(&self, filter: &EventFilter, mut visit: F) -> Result<ControlFlow<()>>
    where
        F: FnMut(Event) -> ControlFlow<()>,
    {
        let files = self.candidate_files(filter).await?;
        debug!("Scanning {} files under {}", files.len(), self.store.root().display());
        for path in files {
            let flow = self
                .store
                .scan_file(&path, |event| {
                    if filter.matches(&event) {
                        visit(event)
                    } else {
                        ControlFlow::Continue(())
                    }
                })
                .await;
            match flow {
                Ok(ControlFlow::Break(())) => return Ok(ControlFlow::Break(())),
                Ok(ControlFlow::Continue(())) => {}
                // Rotated away between listing and reading
                Err(e) => debug!("Skipping {}: {}", path.display(), e),
            }
        }
        Ok(ControlFlow::Continue(()))
    }
}

/// Whether the `YYYY-MM-DD` directory holding `path` can contain events in
/// `[since, until]`. Paths without a date partition are always kept.
fn partition_overlaps(path: &Path, since_ms: Option<i64>, until_ms: Option<i64>) -> bool {
    let day_start = path
        .parent()
        .and_then(Path::file_name)
        .and_then(|name| name.to_str())
        .and_then(|name| NaiveDate::parse_from_str(name, "%Y-%m-%d").ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis());
    let Some(day_start) = day_start else {
        return true;
    };
    let day_end = day_start + DAY_MS;
    if since_ms.is_some_and(|since| since >= day_end) {
        return false;
    }
    if until_ms.is_some_and(|until| until < day_start) {
        return false;
    }
    true
}

#[async_trait]
impl LogBackend for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn id(&self) -> &str {
        &self.id
    }

    async fn search(&self, filter: &EventFilter, limit: usize) -> Result<SearchResult> {
        let mut result = SearchResult::default();
        if limit == 0 {
            return Ok(result);
        }
        let flow = self
            .for_each_match(filter, |event| {
                result.events.push(event);
                if result.events.len() >= limit {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .await?;
        result.truncated = flow.is_break();
        Ok(result)
    }

    async fn stats(
        &self,
        filter: &EventFilter,
        group_by: GroupBy,
        limit: usize,
    ) -> Result<StatsResult> {
        let mut acc = StatsAccumulator::new(group_by);
        let _flow = self
            .for_each_match(filter, |event| {
                acc.add(&event);
                ControlFlow::Continue(())
            })
            .await?;
        Ok(acc.finish(limit))
    }

    async fn sessions(&self, filter: &EventFilter, limit: usize) -> Result<SessionsResult> {
        let mut acc = SessionAccumulator::new();
        let _flow = self
            .for_each_match(filter, |event| {
                acc.add(&event);
                ControlFlow::Continue(())
            })
            .await?;
        Ok(acc.finish(limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EmitContext, EventInput};
    use crate::time::parse_timestamp_ms;
    use tempfile::TempDir;

    fn seed(store: &JsonlStore, service: &str, run: &str, ts: &str, level: &str, msg: &str) {
        let mut input = EventInput::message(msg).with_level(level);
        input.ts = Some(ts.to_string());
        input.session_id = Some(format!("{}-session", run));
        store
            .append(&input.normalize(&EmitContext::new(service).with_run_id(run)))
            .unwrap();
    }

    #[test]
    fn test_partition_pruning() {
        let path = Path::new("/s/api/2026-01-02/run.jsonl");
        let ms = |ts: &str| parse_timestamp_ms(ts);
        assert!(partition_overlaps(path, ms("2026-01-02T12:00:00Z"), None));
        assert!(partition_overlaps(path, ms("2026-01-01T12:00:00Z"), None));
        assert!(!partition_overlaps(path, ms("2026-01-03T00:00:00Z"), None));
        assert!(!partition_overlaps(path, None, ms("2026-01-01T23:59:59Z")));
        assert!(partition_overlaps(Path::new("/s/api/other/run.jsonl"), ms("2030-01-01"), None));
    }

    #[tokio::test]
    async fn test_search_filters_and_limits() {
        let dir = TempDir::new().unwrap();
        let backend = LocalBackend::new("local", dir.path());
        for i in 0..4 {
            seed(backend.store(), "api", "r1", &format!("2026-01-01T00:0{}:00Z", i), "info", "tick");
        }
        seed(backend.store(), "web", "r2", "2026-01-01T00:00:00Z", "error", "boom");

        let filter = EventFilter {
            service: Some("api".into()),
            ..EventFilter::default()
        };
        let result = backend.search(&filter, 3).await.unwrap();
        assert_eq!(result.events.len(), 3);
        assert!(result.truncated);
        assert!(result.events.iter().all(|e| e.service == "api"));

        let result = backend.search(&filter, 10).await.unwrap();
        assert_eq!(result.events.len(), 4);
        assert!(!result.truncated);
    }

    #[tokio::test]
    async fn test_stats_and_sessions() {
        let dir = TempDir::new().unwrap();
        let backend = LocalBackend::new("local", dir.path());
        seed(backend.store(), "api", "r1", "2026-01-01T00:00:00Z", "info", "a");
        seed(backend.store(), "api", "r1", "2026-01-01T00:01:00Z", "error", "b");
        seed(backend.store(), "api", "r2", "2026-01-01T00:02:00Z", "warn", "c");

        let stats = backend
            .stats(&EventFilter::default(), GroupBy::Level, 10)
            .await
            .unwrap();
        assert_eq!(stats.buckets.len(), 3);
        assert!(stats.buckets.iter().all(|b| b.count == 1));

        let sessions = backend.sessions(&EventFilter::default(), 10).await.unwrap();
        assert_eq!(sessions.sessions.len(), 2);
        assert_eq!(sessions.sessions[0].session_id, "r2-session");
        assert_eq!(sessions.sessions[1].error_count, 1);
        assert_eq!(sessions.sessions[1].event_count, 2);
    }

    #[tokio::test]
    async fn test_missing_store_is_empty() {
        let dir = TempDir::new().unwrap();
        let backend = LocalBackend::new("local", dir.path().join("nope"));
        let result = backend.search(&EventFilter::default(), 10).await.unwrap();
        assert!(result.events.is_empty());
        assert!(!result.truncated);
    }
}
