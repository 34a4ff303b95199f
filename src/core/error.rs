//! Typed errors for filter configuration and request-time filtering
//!
//! Two categories exist and they never mix:
//!
//! - [`ConfigError`]: raised while building filters or the pipeline. These are
//!   fatal at application startup.
//! - [`FilterError`]: raised while a request is being filtered. These are
//!   surfaced to axum as an error response and never retried.
//!
//! # Example
//!
//! ```rust,ignore
//! use prefilter::prelude::*;
//!
//! match FilterSpec::builder("").build() {
//!     Err(ConfigError::EmptyTag) => println!("every filter needs a tag"),
//!     Err(e) => eprintln!("other error: {}", e),
//!     Ok(_) => unreachable!(),
//! }
//! ```

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors raised while building filters or a pipeline
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A filter entry is neither a filter instance nor a mapping of filter options
    #[error("invalid filter entry {value}: {reason}")]
    InvalidFilter { value: String, reason: String },

    /// A filter was declared without a tag
    #[error("filter tag must not be empty")]
    EmptyTag,

    /// A route pattern could not be compiled
    #[error("invalid route pattern '{pattern}' on filter '{tag}': {reason}")]
    InvalidPattern {
        tag: String,
        pattern: String,
        reason: String,
    },

    /// A configuration document could not be parsed
    #[error("failed to parse filter configuration: {0}")]
    Parse(String),

    /// The pipeline was installed on a router without routes
    #[error("router has no routes; register routes before installing the filter pipeline")]
    NoRoutes,

    /// A configuration file could not be read
    #[error("failed to read filter configuration '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    /// Build an [`ConfigError::InvalidFilter`] naming the offending value
    pub fn invalid_filter(value: &serde_json::Value, reason: impl Into<String>) -> Self {
        ConfigError::InvalidFilter {
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

// =============================================================================
// Request-time Errors
// =============================================================================

/// Errors raised while filtering a request
///
/// The pipeline never recovers from these: the first error aborts the
/// remaining filters and the route handler.
#[derive(Debug, Error)]
pub enum FilterError {
    /// An extractor failed while computing a parameter
    #[error("filter '{tag}' failed to extract '{param}': {source}")]
    Extraction {
        tag: String,
        param: String,
        #[source]
        source: anyhow::Error,
    },

    /// A custom filter or pre-handler failed
    #[error("filter '{tag}' failed: {source}")]
    Failed {
        tag: String,
        #[source]
        source: anyhow::Error,
    },

    /// The request body could not be buffered or decoded
    #[error("failed to read request body: {0}")]
    Body(String),
}

impl FilterError {
    /// Wrap an arbitrary failure raised by the filter named `tag`
    pub fn failed(tag: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        FilterError::Failed {
            tag: tag.into(),
            source: source.into(),
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            FilterError::Extraction { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            FilterError::Failed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            FilterError::Body(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            FilterError::Extraction { .. } => "FILTER_EXTRACTION_FAILED",
            FilterError::Failed { .. } => "FILTER_FAILED",
            FilterError::Body(_) => "INVALID_REQUEST_BODY",
        }
    }

    /// Convert to an error response
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            code: self.error_code().to_string(),
            message: self.to_string(),
        }
    }
}

/// Error response structure for HTTP responses
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

impl IntoResponse for FilterError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(self.to_response());
        (status, body).into_response()
    }
}
