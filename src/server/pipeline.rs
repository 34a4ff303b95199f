//! The ordered filter pipeline
//!
//! A [`FilterPipeline`] is built once at startup from filter instances and
//! configuration mappings, sorted by precedence (stable, so ties keep their
//! registration order), and then shared read-only by every request.
//!
//! # Example
//!
//! ```rust,ignore
//! use prefilter::prelude::*;
//!
//! let pipeline = FilterPipeline::builder()
//!     .filter(FilterSpec::builder("site").param("path").build()?)
//!     .filter_entry(FilterConfig::new("search").with_params(["q"]))
//!     .name_route("/login", "login")
//!     .build()?;
//!
//! let app = pipeline.init(Router::new().route("/", get(index)))?;
//! ```

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::config::{DEFAULT_MAX_BODY_BYTES, FilterConfig, PipelineConfig};
use crate::core::context::FilterContext;
use crate::core::error::{ConfigError, FilterError};
use crate::core::filter::{Filter, FilterOutcome, FilterSpec};
use crate::core::request::FilterRequest;
use crate::core::route::{MatchedRoute, RouteTable};

/// One element of the filter list handed to the pipeline
pub enum FilterEntry {
    /// A ready-made filter
    Instance(Arc<dyn Filter>),
    /// A typed configuration mapping, built by the pipeline's factory
    Config(FilterConfig),
    /// An untyped mapping (e.g. from YAML), validated then built by the factory
    Raw(Value),
}

impl fmt::Debug for FilterEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterEntry::Instance(filter) => {
                f.debug_tuple("Instance").field(&filter.tag()).finish()
            }
            FilterEntry::Config(config) => f.debug_tuple("Config").field(config).finish(),
            FilterEntry::Raw(value) => f.debug_tuple("Raw").field(value).finish(),
        }
    }
}

impl From<FilterSpec> for FilterEntry {
    fn from(spec: FilterSpec) -> Self {
        FilterEntry::Instance(Arc::new(spec))
    }
}

impl From<Arc<dyn Filter>> for FilterEntry {
    fn from(filter: Arc<dyn Filter>) -> Self {
        FilterEntry::Instance(filter)
    }
}

impl From<FilterConfig> for FilterEntry {
    fn from(config: FilterConfig) -> Self {
        FilterEntry::Config(config)
    }
}

impl From<Value> for FilterEntry {
    fn from(value: Value) -> Self {
        FilterEntry::Raw(value)
    }
}

/// Builds filters from configuration mappings
///
/// The default, [`SpecFactory`], builds a [`FilterSpec`]. Supply your own to
/// attach callbacks or return custom [`Filter`] implementations; any extra
/// keys of the mapping are available in [`FilterConfig::options`].
pub trait FilterFactory: Send + Sync {
    fn build(&self, config: FilterConfig) -> Result<Arc<dyn Filter>, ConfigError>;
}

/// Factory producing plain [`FilterSpec`] filters
#[derive(Debug, Clone, Copy, Default)]
pub struct SpecFactory;

impl FilterFactory for SpecFactory {
    fn build(&self, config: FilterConfig) -> Result<Arc<dyn Filter>, ConfigError> {
        Ok(Arc::new(FilterSpec::from_config(&config)?))
    }
}

impl<F> FilterFactory for F
where
    F: Fn(FilterConfig) -> Result<Arc<dyn Filter>, ConfigError> + Send + Sync,
{
    fn build(&self, config: FilterConfig) -> Result<Arc<dyn Filter>, ConfigError> {
        self(config)
    }
}

/// Code run before every matched route handler
///
/// The default, [`RunFilters`], runs the pipeline's filters. Replacing it
/// replaces filtering entirely; call [`FilterPipeline::run_filters`] from
/// your own handler to keep it.
#[async_trait]
pub trait PreHandler: Send + Sync {
    async fn before_request(
        &self,
        pipeline: &FilterPipeline,
        request: &FilterRequest,
        context: &mut FilterContext,
    ) -> Result<FilterOutcome, FilterError>;
}

/// Default pre-handler: run every applicable filter in precedence order
#[derive(Debug, Clone, Copy, Default)]
pub struct RunFilters;

#[async_trait]
impl PreHandler for RunFilters {
    async fn before_request(
        &self,
        pipeline: &FilterPipeline,
        request: &FilterRequest,
        context: &mut FilterContext,
    ) -> Result<FilterOutcome, FilterError> {
        pipeline.run_filters(request, context).await
    }
}

/// Ordered collection of filters plus the hook that runs them
pub struct FilterPipeline {
    filters: IndexMap<String, Arc<dyn Filter>>,
    pre_handler: Arc<dyn PreHandler>,
    custom_pre_handler: bool,
    routes: RouteTable,
    max_body_bytes: usize,
}

impl FilterPipeline {
    pub fn builder() -> FilterPipelineBuilder {
        FilterPipelineBuilder::new()
    }

    /// Build a pipeline from filters using every default
    pub fn new<I>(filters: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator,
        I::Item: Into<FilterEntry>,
    {
        Self::builder().filters(filters).build()
    }

    /// Build a pipeline from a loaded [`PipelineConfig`]
    pub fn from_config(config: PipelineConfig) -> Result<Self, ConfigError> {
        Self::builder().with_config(config).build()
    }

    /// Filters in execution order
    pub fn filters(&self) -> impl Iterator<Item = &Arc<dyn Filter>> {
        self.filters.values()
    }

    pub fn filter(&self, tag: &str) -> Option<&Arc<dyn Filter>> {
        self.filters.get(tag)
    }

    /// Tags in execution order
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.filters.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    /// Whether requests on this route need their form or multipart body decoded
    ///
    /// A custom pre-handler may read anything, so it always gets the body.
    pub fn reads_body(&self, route: &MatchedRoute, path: &str) -> bool {
        self.custom_pre_handler
            || self
                .filters
                .values()
                .any(|filter| filter.applies_to(route, path) && filter.reads_body())
    }

    /// Run the configured pre-handler
    pub async fn before_request(
        &self,
        request: &FilterRequest,
        context: &mut FilterContext,
    ) -> Result<FilterOutcome, FilterError> {
        self.pre_handler.before_request(self, request, context).await
    }

    /// Run every filter that applies to the request's route
    ///
    /// Requests without a matched route are not filtered. The first
    /// short-circuit or error stops the run.
    pub async fn run_filters(
        &self,
        request: &FilterRequest,
        context: &mut FilterContext,
    ) -> Result<FilterOutcome, FilterError> {
        let Some(route) = request.route() else {
            tracing::debug!(path = %request.path(), "no matched route, skipping filters");
            return Ok(FilterOutcome::Continue);
        };

        for filter in self.filters.values() {
            if !filter.applies_to(route, request.path()) {
                tracing::trace!(
                    tag = %filter.tag(),
                    endpoint = %route.endpoint(),
                    "filter skipped"
                );
                continue;
            }

            tracing::debug!(
                tag = %filter.tag(),
                precedence = filter.precedence(),
                endpoint = %route.endpoint(),
                "running filter"
            );

            let outcome = filter.filter_request(request, context).await?;
            if let FilterOutcome::ShortCircuit(response) = outcome {
                tracing::info!(
                    tag = %filter.tag(),
                    status = %response.status(),
                    "filter short-circuited request"
                );
                return Ok(FilterOutcome::ShortCircuit(response));
            }
        }

        Ok(FilterOutcome::Continue)
    }

    /// Template variables for a request: one entry per registered tag
    ///
    /// Tags whose filter did not run are `null`. Free-form context values
    /// are included too, but never shadow a tag.
    pub fn template_context(&self, context: &FilterContext) -> tera::Context {
        let mut template = tera::Context::new();
        for (key, value) in context.extras() {
            template.insert(key.as_str(), value);
        }
        for tag in self.filters.keys() {
            match context.result(tag) {
                Some(result) => template.insert(tag.as_str(), result),
                None => template.insert(tag.as_str(), &Value::Null),
            }
        }
        template
    }
}

impl fmt::Debug for FilterPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterPipeline")
            .field("filters", &self.filters.keys().collect::<Vec<_>>())
            .field("routes", &self.routes)
            .field("max_body_bytes", &self.max_body_bytes)
            .finish_non_exhaustive()
    }
}

/// Normalize filter entries into the ordered tag -> filter mapping
///
/// Mappings are built with `factory`; instances are taken as they are. The
/// result is sorted by ascending precedence with a stable sort. A later
/// filter with an already-used tag replaces the earlier one in place.
pub fn process_filters(
    entries: Vec<FilterEntry>,
    factory: &dyn FilterFactory,
) -> Result<IndexMap<String, Arc<dyn Filter>>, ConfigError> {
    let mut filters = entries
        .into_iter()
        .map(|entry| match entry {
            FilterEntry::Instance(filter) => Ok(filter),
            FilterEntry::Config(config) => factory.build(config),
            FilterEntry::Raw(value) => factory.build(FilterConfig::from_value(&value)?),
        })
        .collect::<Result<Vec<_>, _>>()?;

    filters.sort_by_key(|filter| filter.precedence());

    let mut ordered = IndexMap::with_capacity(filters.len());
    for filter in filters {
        let tag = filter.tag().to_string();
        if tag.trim().is_empty() {
            return Err(ConfigError::EmptyTag);
        }
        if ordered.insert(tag.clone(), filter).is_some() {
            tracing::warn!(tag = %tag, "duplicate filter tag, replacing earlier filter");
        }
    }
    Ok(ordered)
}

/// Builder for [`FilterPipeline`]
pub struct FilterPipelineBuilder {
    entries: Vec<FilterEntry>,
    pre_handler: Option<Arc<dyn PreHandler>>,
    factory: Arc<dyn FilterFactory>,
    routes: RouteTable,
    max_body_bytes: usize,
}

impl FilterPipelineBuilder {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            pre_handler: None,
            factory: Arc::new(SpecFactory),
            routes: RouteTable::new(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// Add a ready-made filter
    pub fn filter(mut self, filter: impl Filter + 'static) -> Self {
        self.entries.push(FilterEntry::Instance(Arc::new(filter)));
        self
    }

    /// Add a filter instance, configuration mapping or raw value
    pub fn filter_entry(mut self, entry: impl Into<FilterEntry>) -> Self {
        self.entries.push(entry.into());
        self
    }

    pub fn filters<I>(mut self, entries: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<FilterEntry>,
    {
        self.entries.extend(entries.into_iter().map(Into::into));
        self
    }

    /// Replace the default pre-handler
    pub fn with_pre_handler(mut self, handler: impl PreHandler + 'static) -> Self {
        self.pre_handler = Some(Arc::new(handler));
        self
    }

    /// Replace the factory used for configuration mappings
    pub fn with_filter_factory(mut self, factory: impl FilterFactory + 'static) -> Self {
        self.factory = Arc::new(factory);
        self
    }

    /// Give the route registered under `template` a logical endpoint name
    pub fn name_route(mut self, template: impl Into<String>, endpoint: impl Into<String>) -> Self {
        self.routes.name(template, endpoint);
        self
    }

    /// Limit for form and multipart bodies buffered for filters
    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    /// Merge a loaded configuration: filters, route names and body limit
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.entries
            .extend(config.filters.into_iter().map(FilterEntry::Raw));
        for (template, endpoint) in config.routes {
            self.routes.name(template, endpoint);
        }
        self.max_body_bytes = config.max_body_bytes;
        self
    }

    pub fn build(self) -> Result<FilterPipeline, ConfigError> {
        let filters = process_filters(self.entries, self.factory.as_ref())?;

        tracing::info!(
            filters = filters.len(),
            order = ?filters.keys().collect::<Vec<_>>(),
            "filter pipeline built"
        );

        Ok(FilterPipeline {
            filters,
            custom_pre_handler: self.pre_handler.is_some(),
            pre_handler: self.pre_handler.unwrap_or_else(|| Arc::new(RunFilters)),
            routes: self.routes,
            max_body_bytes: self.max_body_bytes,
        })
    }
}

impl Default for FilterPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
