//! Error types for Guck operations
//!
//! Every variant carries:
//! - A human-readable message
//! - A stable error code for programmatic handling
//! - A category for grouping
//!
//! Query compile failures are modelled separately by [`crate::query::QueryError`]
//! and only wrapped into [`GuckError::InvalidQuery`] when they cross into the
//! request pipeline.
//!
//! # Example
//!
//! ```rust
//! use guck_core::error::{GuckError, ErrorCategory};
//!
//! fn describe(err: &GuckError) -> &'static str {
//!     match err.category() {
//!         ErrorCategory::Validation => "fix the request",
//!         ErrorCategory::Backend => "a backend is unhappy",
//!         _ => "something else",
//!     }
//! }
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::query::QueryError;

/// Result type alias for Guck operations
pub type Result<T> = std::result::Result<T, GuckError>;

/// Error category for grouping related errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Caller sent something unusable
    Validation,
    /// Requested resource does not exist
    NotFound,
    /// Configuration is incomplete or contradictory
    Configuration,
    /// Local store I/O failed
    Storage,
    /// A remote backend (CloudWatch, Kubernetes, STS, EKS) failed
    Backend,
    /// Bug or invariant violation
    Internal,
}

/// Errors that can occur in Guck operations
#[derive(Error, Debug)]
pub enum GuckError {
    // ═══════════════════════════════════════════════════════════════════════
    // Request errors
    // ═══════════════════════════════════════════════════════════════════════

    /// Boolean search expression failed to compile
    #[error("Invalid query at position {}: {}", .0.position, .0.message)]
    InvalidQuery(QueryError),

    /// Request parameters are malformed or contradictory
    #[error("Invalid parameters: {reason}")]
    InvalidParameters { reason: String },

    /// `backends[]` filter matched nothing that is configured
    #[error("No configured backend matches {requested:?}. Check the `backends` list in .guck.json.")]
    NoMatchingBackend { requested: Vec<String> },

    // ═══════════════════════════════════════════════════════════════════════
    // Configuration errors
    // ═══════════════════════════════════════════════════════════════════════

    /// Backend type is not one of local, cloudwatch, k8s
    #[error("Unknown backend type '{backend_type}'")]
    UnknownBackendType { backend_type: String },

    /// A backend descriptor lacks a field it cannot work without
    #[error("Backend '{backend}' is missing required field '{field}'")]
    MissingBackendField { backend: String, field: String },

    /// Any other configuration problem
    #[error("Configuration error: {reason}")]
    Config { reason: String },

    // ═══════════════════════════════════════════════════════════════════════
    // Backend errors
    // ═══════════════════════════════════════════════════════════════════════

    /// Credentials could not be resolved or refreshed
    #[error("Authentication failed for {backend}: {reason}")]
    Auth { backend: String, reason: String },

    /// Remote API returned an error or an unexpected payload
    #[error("{backend} request failed: {reason}")]
    Remote { backend: String, reason: String },

    /// HTTP transport failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // ═══════════════════════════════════════════════════════════════════════
    // Infrastructure errors (serialization, storage, I/O)
    // ═══════════════════════════════════════════════════════════════════════

    /// JSON serialization or deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML (kubeconfig) parsing failed
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error that shouldn't happen
    #[error("Internal error: {reason}. This is a bug; please report it.")]
    Internal { reason: String },
}

impl GuckError {
    /// Shorthand for [`GuckError::Remote`]
    pub fn remote(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        GuckError::Remote {
            backend: backend.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for [`GuckError::Auth`]
    pub fn auth(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        GuckError::Auth {
            backend: backend.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for [`GuckError::InvalidParameters`]
    pub fn invalid_params(reason: impl Into<String>) -> Self {
        GuckError::InvalidParameters {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`GuckError::Config`]
    pub fn config(reason: impl Into<String>) -> Self {
        GuckError::Config {
            reason: reason.into(),
        }
    }

    /// Returns the error category for grouping
    pub fn category(&self) -> ErrorCategory {
        match self {
            GuckError::InvalidQuery(_)
            | GuckError::InvalidParameters { .. } => ErrorCategory::Validation,

            GuckError::NoMatchingBackend { .. } => ErrorCategory::NotFound,

            GuckError::UnknownBackendType { .. }
            | GuckError::MissingBackendField { .. }
            | GuckError::Config { .. }
            | GuckError::Yaml(_) => ErrorCategory::Configuration,

            GuckError::Auth { .. }
            | GuckError::Remote { .. }
            | GuckError::Http(_) => ErrorCategory::Backend,

            GuckError::Io(_) => ErrorCategory::Storage,

            GuckError::Json(_)
            | GuckError::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Returns the stable error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            GuckError::InvalidQuery(_) => "INVALID_QUERY",
            GuckError::InvalidParameters { .. } => "INVALID_PARAMETERS",
            GuckError::NoMatchingBackend { .. } => "NO_MATCHING_BACKEND",
            GuckError::UnknownBackendType { .. } => "UNKNOWN_BACKEND_TYPE",
            GuckError::MissingBackendField { .. } => "MISSING_BACKEND_FIELD",
            GuckError::Config { .. } => "CONFIG_ERROR",
            GuckError::Auth { .. } => "AUTH_ERROR",
            GuckError::Remote { .. } => "REMOTE_ERROR",
            GuckError::Http(_) => "HTTP_ERROR",
            GuckError::Json(_) => "JSON_ERROR",
            GuckError::Yaml(_) => "YAML_ERROR",
            GuckError::Io(_) => "IO_ERROR",
            GuckError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Converts this error to a JSON-serializable response object
    pub fn to_error_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: ErrorDetail {
                code: self.error_code().to_string(),
                message: self.to_string(),
                category: self.category(),
            },
        }
    }
}

impl From<QueryError> for GuckError {
    fn from(err: QueryError) -> Self {
        GuckError::InvalidQuery(err)
    }
}

/// JSON-serializable error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

/// Error detail for JSON responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Stable error code (e.g., "INVALID_QUERY")
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Error category
    pub category: ErrorCategory,
}
