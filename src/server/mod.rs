//! Server module binding the filter pipeline to axum
//!
//! This module provides:
//! - `FilterPipeline`, the ordered set of filters and its builder
//! - The middleware that runs the pipeline before matched route handlers
//! - Extractors giving handlers access to the published results

pub mod extractors;
pub mod middleware;
pub mod pipeline;

pub use extractors::{ActivePipeline, Filtered, TemplateContext};
pub use middleware::{attach, capture_request, filter_middleware};
pub use pipeline::{
    FilterEntry, FilterFactory, FilterPipeline, FilterPipelineBuilder, PreHandler, RunFilters,
    SpecFactory, process_filters,
};
