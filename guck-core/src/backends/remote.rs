//! Paging engine shared by the remote backends
//!
//! A remote source only knows how to fetch one page of already-normalized
//! events. [`RemoteBackend`] drives the paging, applies the shared filter,
//! enforces the limit and works out `truncated`.

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{
    BackendKind, LogBackend, SearchResult, SessionAccumulator, SessionsResult, StatsAccumulator,
    StatsResult,
};
use crate::error::Result;
use crate::event::Event;
use crate::filter::EventFilter;
use crate::params::GroupBy;

/// Most matching events a remote stats or sessions request will scan
pub const REMOTE_SCAN_LIMIT: usize = 5000;

/// Upper bound on pages fetched for one request
pub const MAX_PAGES: usize = 200;

/// Absolute time range pushed down to the source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeWindow {
    pub start_ms: Option<i64>,
    pub end_ms: Option<i64>,
}

impl TimeWindow {
    pub fn from_filter(filter: &EventFilter) -> Self {
        Self {
            start_ms: filter.since_ms,
            end_ms: filter.until_ms,
        }
    }
}

/// One page of events plus the cursor for the next, if any
#[derive(Debug)]
pub struct Page<C> {
    pub events: Vec<Event>,
    pub next: Option<C>,
}

impl<C> Page<C> {
    pub fn last(events: Vec<Event>) -> Self {
        Self { events, next: None }
    }
}

/// A paginated source of events
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Continuation state between pages
    type Cursor: Send + Sync;

    fn kind(&self) -> BackendKind;

    fn id(&self) -> &str;

    /// Fetch the page at `cursor` (`None` for the first page)
    async fn fetch_page(
        &self,
        window: &TimeWindow,
        cursor: Option<Self::Cursor>,
    ) -> Result<Page<Self::Cursor>>;
}

/// [`LogBackend`] over any [`LogSource`]
pub struct RemoteBackend<S> {
    source: S,
}

impl<S: LogSource> RemoteBackend<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Collect up to `limit` matching events
    async fn scan(&self, filter: &EventFilter, limit: usize) -> Result<SearchResult> {
        let window = TimeWindow::from_filter(filter);
        let mut result = SearchResult::default();
        if limit == 0 {
            return Ok(result);
        }

        let mut cursor = None;
        let mut pages = 0;
        loop {
            let page = self.source.fetch_page(&window, cursor).await?;
            pages += 1;
            let has_next = page.next.is_some();

            let mut events = page.events.into_iter();
            for event in events.by_ref() {
                if filter.matches(&event) {
                    result.events.push(event);
                    if result.events.len() >= limit {
                        break;
                    }
                }
            }

            if result.events.len() >= limit {
                result.truncated = events.len() > 0 || has_next;
                break;
            }
            if !has_next {
                break;
            }
            if pages >= MAX_PAGES {
                warn!(
                    "{} backend {}: stopping after {} pages",
                    self.source.kind(),
                    self.source.id(),
                    pages
                );
                result.truncated = true;
                break;
            }
            cursor = page.next;
        }

        debug!(
            "{} backend {}: {} events from {} pages",
            self.source.kind(),
            self.source.id(),
            result.events.len(),
            pages
        );
        Ok(result)
    }
}

#[async_trait]
impl<S: LogSource> LogBackend for RemoteBackend<S> {
    fn kind(&self) -> BackendKind {
        self.source.kind()
    }

    fn id(&self) -> &str {
        self.source.id()
    }

    async fn search(&self, filter: &EventFilter, limit: usize) -> Result<SearchResult> {
        self.scan(filter, limit).await
    }

    async fn stats(
        &self,
        filter: &EventFilter,
        group_by: GroupBy,
        limit: usize,
    ) -> Result<StatsResult> {
        let scanned = self.scan(filter, REMOTE_SCAN_LIMIT).await?;
        let mut acc = StatsAccumulator::new(group_by);
        scanned.events.iter().for_each(|event| acc.add(event));
        let mut result = acc.finish(limit);
        result.truncated |= scanned.truncated;
        Ok(result)
    }

    async fn sessions(&self, filter: &EventFilter, limit: usize) -> Result<SessionsResult> {
        let scanned = self.scan(filter, REMOTE_SCAN_LIMIT).await?;
        let mut acc = SessionAccumulator::new();
        scanned.events.iter().for_each(|event| acc.add(event));
        let mut result = acc.finish(limit);
        result.truncated |= scanned.truncated;
        Ok(result)
    }
}
