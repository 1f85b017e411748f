//! Grouping state shared by backends and the aggregator merge

use std::cmp::Ordering;
use std::collections::HashMap;

use super::{SessionSummary, SessionsResult, StatsBucket, StatsResult};
use crate::event::Event;
use crate::params::GroupBy;
use crate::time::parse_timestamp_ms;

const UNKNOWN_BUCKET: &str = "unknown";

/// Grouping key for an event
pub fn group_key(event: &Event, group_by: GroupBy) -> String {
    match group_by {
        GroupBy::Type => event.event_type.clone(),
        GroupBy::Level => event.level.as_str().to_string(),
        GroupBy::Stage => event
            .data
            .as_ref()
            .and_then(|data| data.get("stage"))
            .and_then(|stage| stage.as_str())
            .unwrap_or(UNKNOWN_BUCKET)
            .to_string(),
    }
}

/// Counts per group
#[derive(Debug, Clone)]
pub struct StatsAccumulator {
    group_by: GroupBy,
    counts: HashMap<String, u64>,
}

impl StatsAccumulator {
    pub fn new(group_by: GroupBy) -> Self {
        Self {
            group_by,
            counts: HashMap::new(),
        }
    }

    pub fn add(&mut self, event: &Event) {
        *self.counts.entry(group_key(event, self.group_by)).or_default() += 1;
    }

    /// Fold in a bucket counted elsewhere
    pub fn merge_bucket(&mut self, bucket: &StatsBucket) {
        *self.counts.entry(bucket.key.clone()).or_default() += bucket.count;
    }

    /// Buckets by descending count (ties by key), cut to `limit`
    pub fn finish(self, limit: usize) -> StatsResult {
        let mut buckets: Vec<StatsBucket> = self
            .counts
            .into_iter()
            .map(|(key, count)| StatsBucket { key, count })
            .collect();
        buckets.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
        let truncated = buckets.len() > limit;
        buckets.truncate(limit);
        StatsResult { buckets, truncated }
    }
}

/// Per-session counters
#[derive(Debug, Clone, Default)]
pub struct SessionAccumulator {
    sessions: HashMap<String, SessionSummary>,
}

/// Later of two timestamps; unparseable values lose
fn later_ts(a: &str, b: &str) -> bool {
    match (parse_timestamp_ms(a), parse_timestamp_ms(b)) {
        (Some(a), Some(b)) => a > b,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

fn newest_first(a: &SessionSummary, b: &SessionSummary) -> Ordering {
    match (parse_timestamp_ms(&a.last_ts), parse_timestamp_ms(&b.last_ts)) {
        (Some(a_ms), Some(b_ms)) => b_ms.cmp(&a_ms),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.session_id.cmp(&b.session_id))
}

impl SessionAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count an event; events without a session are skipped
    pub fn add(&mut self, event: &Event) {
        let Some(session_id) = event.session_id.as_deref() else {
            return;
        };
        let errors = u64::from(event.level.is_error());
        match self.sessions.get_mut(session_id) {
            Some(summary) => {
                summary.event_count += 1;
                summary.error_count += errors;
                if later_ts(&event.ts, &summary.last_ts) {
                    summary.last_ts = event.ts.clone();
                }
            }
            None => {
                self.sessions.insert(
                    session_id.to_string(),
                    SessionSummary {
                        session_id: session_id.to_string(),
                        last_ts: event.ts.clone(),
                        event_count: 1,
                        error_count: errors,
                    },
                );
            }
        }
    }

    /// Fold in a summary computed elsewhere
    pub fn merge_summary(&mut self, other: &SessionSummary) {
        match self.sessions.get_mut(&other.session_id) {
            Some(summary) => {
                summary.event_count += other.event_count;
                summary.error_count += other.error_count;
                if later_ts(&other.last_ts, &summary.last_ts) {
                    summary.last_ts = other.last_ts.clone();
                }
            }
            None => {
                self.sessions.insert(other.session_id.clone(), other.clone());
            }
        }
    }

    /// Sessions by most recent `last_ts`, cut to `limit`
    pub fn finish(self, limit: usize) -> SessionsResult {
        let mut sessions: Vec<SessionSummary> = self.sessions.into_values().collect();
        sessions.sort_by(newest_first);
        let truncated = sessions.len() > limit;
        sessions.truncate(limit);
        SessionsResult {
            sessions,
            truncated,
        }
    }
}
