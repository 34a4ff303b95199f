//! # Prefilter
//!
//! Declarative request filters for axum applications.
//!
//! ## Features
//!
//! - **Declarative Filters**: Describe a filter with a tag, a precedence, parameter descriptors and route rules
//! - **Ordered Execution**: Filters run by ascending precedence; ties keep registration order
//! - **Route Rules**: Include/exclude by endpoint name, route template, path or `*` glob, with exclude winning
//! - **Short-Circuit**: Any filter can answer the request itself (e.g. a redirect to login)
//! - **Configuration-Based**: Define filters in code or via YAML configuration
//! - **Template Ready**: Every registered tag is exposed to tera templates, `null` when it did not run
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use prefilter::prelude::*;
//! use axum::{Router, routing::get};
//!
//! let pipeline = FilterPipeline::builder()
//!     .filter_entry(FilterConfig::new("f1").with_params(["request_path"]))
//!     .filter_entry(FilterConfig::new("f2").with_params(["zed"]).with_exclude(["login"]))
//!     .name_route("/login", "login")
//!     .build()?;
//!
//! let app = pipeline.init(
//!     Router::new()
//!         .route("/", get(index))
//!         .route("/login", get(login)),
//! )?;
//!
//! async fn index(Filtered(ctx): Filtered) -> String {
//!     format!("{} {}", ctx.value("f1", "path"), ctx.value("f2", "zed"))
//! }
//! ```

pub mod config;
pub mod core;
pub mod server;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core Types ===
    pub use crate::core::{
        context::{FilterContext, FilterResult},
        error::{ConfigError, FilterError},
        filter::{DEFAULT_PRECEDENCE, Filter, FilterOutcome, FilterSpec, FilterSpecBuilder},
        param::{Param, ResolvedParam},
        request::{FilterRequest, UploadedFile},
        route::{MatchedRoute, RouteTable},
    };

    // === Configuration ===
    pub use crate::config::{FilterConfig, PipelineConfig};

    // === Pipeline ===
    pub use crate::server::{
        ActivePipeline, FilterEntry, FilterFactory, FilterPipeline, FilterPipelineBuilder,
        Filtered, PreHandler, RunFilters, SpecFactory, TemplateContext,
    };

    // === Re-exports ===
    pub use async_trait::async_trait;
    pub use serde_json::{Value, json};
}
