//! Filters and the stock [`FilterSpec`] implementation
//!
//! A filter has a tag, a precedence and route rules, and turns a
//! [`FilterRequest`] into a [`FilterResult`] published into the request's
//! [`FilterContext`]. Filters may also end the request early by returning
//! [`FilterOutcome::ShortCircuit`].
//!
//! # Example
//!
//! ```rust,ignore
//! use prefilter::prelude::*;
//!
//! let filter = FilterSpec::builder("site")
//!     .precedence(50)
//!     .param(Param::request("path"))
//!     .param(Param::computed("path_to_upper"))
//!     .callback("path_to_upper", |req| Ok(json!(req.path().to_uppercase())))
//!     .exclude(["login", "static"])
//!     .build()?;
//! ```

use async_trait::async_trait;
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::context::{FilterContext, FilterResult};
use super::error::{ConfigError, FilterError};
use super::param::{Extractor, Param, ResolvedParam, form_field};
use super::request::FilterRequest;
use super::route::{MATCH_ALL, MatchedRoute, RouteRules, STATIC_ENDPOINT};
use crate::config::FilterConfig;

/// Precedence given to filters that do not declare one
pub const DEFAULT_PRECEDENCE: i32 = 100;

/// What the pipeline should do after a filter ran
pub enum FilterOutcome {
    /// Run the next filter (and eventually the route handler)
    Continue,
    /// Stop filtering and answer the request with this response
    ShortCircuit(Response),
}

impl FilterOutcome {
    /// Short-circuit with anything convertible into a response
    pub fn respond(response: impl IntoResponse) -> Self {
        FilterOutcome::ShortCircuit(response.into_response())
    }

    pub fn is_short_circuit(&self) -> bool {
        matches!(self, FilterOutcome::ShortCircuit(_))
    }
}

impl fmt::Debug for FilterOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterOutcome::Continue => write!(f, "Continue"),
            FilterOutcome::ShortCircuit(response) => f
                .debug_tuple("ShortCircuit")
                .field(&response.status())
                .finish(),
        }
    }
}

/// A unit of request filtering
///
/// Implement this directly for fully custom behaviour, or wrap a
/// [`FilterSpec`] and reuse [`FilterSpec::extract`].
#[async_trait]
pub trait Filter: Send + Sync {
    /// Unique key under which results are published
    fn tag(&self) -> &str;

    /// Lower values run first
    fn precedence(&self) -> i32 {
        DEFAULT_PRECEDENCE
    }

    /// Whether the filter runs on this route
    fn applies_to(&self, _route: &MatchedRoute, _path: &str) -> bool {
        true
    }

    /// Whether form and multipart bodies must be decoded before this filter runs
    fn reads_body(&self) -> bool {
        true
    }

    /// Filter one request
    async fn filter_request(
        &self,
        request: &FilterRequest,
        context: &mut FilterContext,
    ) -> Result<FilterOutcome, FilterError>;
}

/// Declarative filter: extracts its parameters and publishes them under its tag
#[derive(Debug, Clone)]
pub struct FilterSpec {
    tag: String,
    precedence: i32,
    params: Vec<ResolvedParam>,
    rules: RouteRules,
}

impl FilterSpec {
    pub fn builder(tag: impl Into<String>) -> FilterSpecBuilder {
        FilterSpecBuilder::new(tag)
    }

    /// Build a filter from a configuration mapping
    pub fn from_config(config: &FilterConfig) -> Result<Self, ConfigError> {
        FilterSpecBuilder::from_config(config).build()
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn precedence(&self) -> i32 {
        self.precedence
    }

    pub fn params(&self) -> &[ResolvedParam] {
        &self.params
    }

    /// Output names of the resolved parameters, in declaration order
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(ResolvedParam::name)
    }

    pub fn rules(&self) -> &RouteRules {
        &self.rules
    }

    /// Run every extractor against the request
    pub fn extract(&self, request: &FilterRequest) -> Result<FilterResult, FilterError> {
        let mut result = FilterResult::new(&self.tag);
        for param in &self.params {
            let value = param
                .extract(request)
                .map_err(|source| FilterError::Extraction {
                    tag: self.tag.clone(),
                    param: param.name().to_string(),
                    source,
                })?;
            result.set(param.name(), value);
        }
        Ok(result)
    }
}

#[async_trait]
impl Filter for FilterSpec {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn precedence(&self) -> i32 {
        self.precedence
    }

    fn applies_to(&self, route: &MatchedRoute, path: &str) -> bool {
        self.rules.allows(route, path)
    }

    fn reads_body(&self) -> bool {
        self.params.iter().any(ResolvedParam::reads_body)
    }

    async fn filter_request(
        &self,
        request: &FilterRequest,
        context: &mut FilterContext,
    ) -> Result<FilterOutcome, FilterError> {
        let result = self.extract(request)?;
        context.publish(result);
        Ok(FilterOutcome::Continue)
    }
}

/// Builder for [`FilterSpec`]
///
/// Parameters are resolved once, in [`build`](Self::build).
pub struct FilterSpecBuilder {
    tag: String,
    precedence: i32,
    params: Vec<Param>,
    callbacks: HashMap<String, Extractor>,
    include: Vec<String>,
    exclude: Vec<String>,
}

impl FilterSpecBuilder {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            precedence: DEFAULT_PRECEDENCE,
            params: Vec::new(),
            callbacks: HashMap::new(),
            include: vec![MATCH_ALL.to_string()],
            exclude: vec![STATIC_ENDPOINT.to_string()],
        }
    }

    /// Start from a configuration mapping; string params are parsed with [`Param::parse`]
    pub fn from_config(config: &FilterConfig) -> Self {
        Self {
            tag: config.tag.clone(),
            precedence: config.precedence,
            params: config.params.iter().map(|p| Param::parse(p)).collect(),
            callbacks: HashMap::new(),
            include: config.include.clone(),
            exclude: config.exclude.clone(),
        }
    }

    pub fn precedence(mut self, precedence: i32) -> Self {
        self.precedence = precedence;
        self
    }

    pub fn param(mut self, param: impl Into<Param>) -> Self {
        self.params.push(param.into());
        self
    }

    pub fn params<I>(mut self, params: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Param>,
    {
        self.params.extend(params.into_iter().map(Into::into));
        self
    }

    /// Register a named callback consumed by [`Param::Computed`] parameters
    pub fn callback<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&FilterRequest) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.callbacks.insert(name.into(), Arc::new(f));
        self
    }

    /// Replace the include patterns
    pub fn include<I>(mut self, patterns: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.include = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the exclude patterns (this drops the default `static` exclusion)
    pub fn exclude<I>(mut self, patterns: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.exclude = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn build(self) -> Result<FilterSpec, ConfigError> {
        if self.tag.trim().is_empty() {
            return Err(ConfigError::EmptyTag);
        }

        let rules = RouteRules::compile(&self.tag, &self.include, &self.exclude)?;

        let params = self
            .params
            .iter()
            .map(|param| {
                let extractor = param.direct_extractor().unwrap_or_else(|| {
                    match self.callbacks.get(param.name()) {
                        Some(callback) => callback.clone(),
                        None => {
                            tracing::warn!(
                                tag = %self.tag,
                                param = %param.name(),
                                "no callback for computed parameter, using form lookup"
                            );
                            form_field(param.name().to_string())
                        }
                    }
                });
                ResolvedParam::new(param.name(), extractor, param.reads_body())
            })
            .collect();

        Ok(FilterSpec {
            tag: self.tag,
            precedence: self.precedence,
            params,
            rules,
        })
    }
}
