//! # Guck Core
//!
//! Local-first telemetry: emit structured events into an append-only JSONL
//! store, then search, count and group them across the local store and
//! remote log backends (CloudWatch Logs, Kubernetes pod logs).
//!
//! - **Emit**: [`Emitter`] normalizes, redacts and appends events
//! - **Query**: [`QueryEngine`] fans a request out to every selected
//!   backend, merges the results, and shapes them for a size-limited reader
//! - **Backends**: anything implementing [`LogBackend`]
//!
//! ## Example
//!
//! ```rust,no_run
//! use guck_core::{load_config, Emitter, EventInput, LoadOptions, QueryEngine, SearchParams};
//!
//! # async fn run() -> guck_core::Result<()> {
//! let loaded = load_config(&LoadOptions::from_process());
//!
//! let emitter = Emitter::from_config(&loaded);
//! emitter.emit(EventInput::message("checkout failed").with_level("error"))?;
//!
//! let engine = QueryEngine::from_config(&loaded);
//! let params = SearchParams {
//!     query: Some("checkout AND failed".into()),
//!     ..SearchParams::default()
//! };
//! let payload = engine.search(&params).await?;
//! println!("{}", payload);
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod backends;
pub mod checkpoint;
pub mod config;
pub mod emit;
pub mod engine;
pub mod error;
pub mod event;
pub mod filter;
pub mod format;
pub mod guard;
pub mod params;
pub mod query;
pub mod redact;
pub mod storage;
pub mod time;

// Re-export main types
pub use aggregator::{AggregatedSearch, AggregatedSessions, AggregatedStats, Aggregator};
pub use backends::{
    build_backends, BackendError, BackendKind, BackendSet, LogBackend, SearchResult,
    SessionSummary, SessionsResult, StatsBucket, StatsResult,
};
pub use config::{load_config, EnvSnapshot, GuckConfig, LoadOptions, LoadedConfig, McpConfig};
pub use emit::{EmitOutcome, Emitter};
pub use engine::QueryEngine;
pub use error::{ErrorCategory, ErrorDetail, ErrorResponse, GuckError, Result};
pub use event::{EmitContext, Event, EventInput, EventSource, Level, SourceKind};
pub use filter::EventFilter;
pub use guard::{guard_output, Guarded, OutputWarning};
pub use params::{GroupBy, OutputFormat, SearchParams, SessionsParams, StatsParams};
pub use query::{compile, CompiledQuery, QueryError};
pub use redact::Redactor;
pub use storage::JsonlStore;
