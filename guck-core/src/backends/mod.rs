//! Log backends
//!
//! Every source of events (the local JSONL store, CloudWatch Logs, Kubernetes
//! pod logs) sits behind [`LogBackend`]. The aggregator only ever sees this
//! trait; concrete remote clients are constructed by [`build_backends`] when
//! the configuration names them.

mod accumulate;
pub mod aws;
pub mod cloudwatch;
mod descriptor;
pub mod k8s;
pub mod local;
pub mod normalize;
pub mod remote;

pub use accumulate::{SessionAccumulator, StatsAccumulator};
pub use descriptor::{
    BackendDescriptor, CloudWatchConfig, K8sAuthMode, K8sConfig, LocalBackendConfig,
};

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::{BackendMode, EnvSnapshot, GuckConfig};
use crate::error::Result;
use crate::event::Event;
use crate::filter::EventFilter;
use crate::params::GroupBy;

/// Backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Local,
    Cloudwatch,
    K8s,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Local => "local",
            BackendKind::Cloudwatch => "cloudwatch",
            BackendKind::K8s => "k8s",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "local" => Some(BackendKind::Local),
            "cloudwatch" => Some(BackendKind::Cloudwatch),
            "k8s" | "kubernetes" => Some(BackendKind::K8s),
            _ => None,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Matching events, in backend order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub events: Vec<Event>,
    pub truncated: bool,
}

/// One stats group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsBucket {
    pub key: String,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsResult {
    pub buckets: Vec<StatsBucket>,
    pub truncated: bool,
}

/// Per-session counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub last_ts: String,
    pub event_count: u64,
    pub error_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionsResult {
    pub sessions: Vec<SessionSummary>,
    pub truncated: bool,
}

/// A failure isolated to one backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendError {
    /// Backend type, or the raw type string for unknown types
    pub backend: String,
    pub backend_id: String,
    pub message: String,
}

impl BackendError {
    pub fn new(
        backend: impl Into<String>,
        backend_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            backend: backend.into(),
            backend_id: backend_id.into(),
            message: message.into(),
        }
    }
}

/// A source of events that can be searched and aggregated.
///
/// `filter` is fully resolved: time bounds are absolute and the query is
/// compiled. Implementations apply [`EventFilter::matches`] to every event.
#[async_trait]
pub trait LogBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Configured id, the type name when none was given
    fn id(&self) -> &str;

    /// Up to `limit` matching events
    async fn search(&self, filter: &EventFilter, limit: usize) -> Result<SearchResult>;

    /// Counts per group, largest first, at most `limit` buckets
    async fn stats(&self, filter: &EventFilter, group_by: GroupBy, limit: usize)
        -> Result<StatsResult>;

    /// Sessions by most recent activity, at most `limit`
    async fn sessions(&self, filter: &EventFilter, limit: usize) -> Result<SessionsResult>;
}

/// Backends constructed from configuration plus the descriptors that could
/// not be turned into one
#[derive(Default)]
pub struct BackendSet {
    pub backends: Vec<Arc<dyn LogBackend>>,
    pub errors: Vec<BackendError>,
}

impl fmt::Debug for BackendSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<String> = self
            .backends
            .iter()
            .map(|b| format!("{}:{}", b.kind(), b.id()))
            .collect();
        f.debug_struct("BackendSet")
            .field("backends", &ids)
            .field("errors", &self.errors)
            .finish()
    }
}

/// Construct the configured backends.
///
/// Without `backend: "multi"` (or with an empty `backends` list) this is a
/// single local backend over `store_dir`. Descriptors with an unknown type or
/// missing required fields become [`BackendError`]s.
pub fn build_backends(config: &GuckConfig, store_dir: &Path, env: &EnvSnapshot) -> BackendSet {
    let mut set = BackendSet::default();

    if config.backend == BackendMode::Local || config.backends.is_empty() {
        set.backends
            .push(Arc::new(local::LocalBackend::new("local", store_dir)));
        return set;
    }

    for raw in &config.backends {
        let descriptor = match BackendDescriptor::from_value(raw) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                let (kind, id) = descriptor_identity(raw);
                warn!("Skipping backend {}: {}", id, e);
                set.errors.push(BackendError::new(kind, id, e.to_string()));
                continue;
            }
        };

        let backend: Result<Arc<dyn LogBackend>> = match descriptor {
            BackendDescriptor::Local(cfg) => {
                let dir = cfg
                    .dir
                    .as_deref()
                    .map(Path::new)
                    .unwrap_or(store_dir)
                    .to_path_buf();
                Ok(Arc::new(local::LocalBackend::new(cfg.id, dir)) as Arc<dyn LogBackend>)
            }
            BackendDescriptor::Cloudwatch(cfg) => cloudwatch::CloudWatchBackend::from_config(cfg, env)
                .map(|b| Arc::new(b) as Arc<dyn LogBackend>),
            BackendDescriptor::K8s(cfg) => k8s::K8sBackend::from_config(cfg, env)
                .map(|b| Arc::new(b) as Arc<dyn LogBackend>),
        };

        match backend {
            Ok(backend) => set.backends.push(backend),
            Err(e) => {
                let (kind, id) = descriptor_identity(raw);
                warn!("Skipping backend {}: {}", id, e);
                set.errors.push(BackendError::new(kind, id, e.to_string()));
            }
        }
    }

    set
}

/// Type and id of a raw descriptor for error reporting. Unknown types are
/// reported verbatim.
fn descriptor_identity(raw: &serde_json::Value) -> (String, String) {
    let raw_type = raw.get("type").and_then(|t| t.as_str());
    let kind = match raw_type {
        Some(t) => BackendKind::parse(t)
            .map(|k| k.as_str().to_string())
            .unwrap_or_else(|| t.to_string()),
        None => "unknown".to_string(),
    };
    let id = raw
        .get("id")
        .and_then(|t| t.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| kind.clone());
    (kind, id)
}
