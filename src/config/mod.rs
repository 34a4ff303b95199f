//! Configuration loading and management

use crate::core::error::ConfigError;
use crate::core::filter::DEFAULT_PRECEDENCE;
use crate::core::route::{MATCH_ALL, STATIC_ENDPOINT};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// Default limit for buffered form and multipart bodies (2 MiB)
pub const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

fn default_precedence() -> i32 {
    DEFAULT_PRECEDENCE
}

fn default_include() -> Vec<String> {
    vec![MATCH_ALL.to_string()]
}

fn default_exclude() -> Vec<String> {
    vec![STATIC_ENDPOINT.to_string()]
}

fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

/// Configuration mapping describing one filter
///
/// Keys not listed here are kept in `options` and handed to the pipeline's
/// filter factory untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Unique tag results are published under
    #[serde(alias = "filter_tag")]
    pub tag: String,

    /// Lower values run first
    #[serde(default = "default_precedence", alias = "filter_precedence")]
    pub precedence: i32,

    /// Parameter descriptors (`request_path`, `get_user`, `zed`, ...)
    #[serde(default, alias = "filter_params")]
    pub params: Vec<String>,

    /// Routes the filter runs on
    #[serde(default = "default_include", alias = "filter_on")]
    pub include: Vec<String>,

    /// Routes the filter never runs on
    #[serde(default = "default_exclude", alias = "filter_skip", alias = "filter_pass")]
    pub exclude: Vec<String>,

    /// Extra options for custom filter factories
    #[serde(flatten)]
    pub options: IndexMap<String, Value>,
}

impl FilterConfig {
    /// Create a configuration with default precedence and route rules
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            precedence: DEFAULT_PRECEDENCE,
            params: Vec::new(),
            include: default_include(),
            exclude: default_exclude(),
            options: IndexMap::new(),
        }
    }

    pub fn with_precedence(mut self, precedence: i32) -> Self {
        self.precedence = precedence;
        self
    }

    pub fn with_params<I>(mut self, params: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.params = params.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_include<I>(mut self, patterns: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.include = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_exclude<I>(mut self, patterns: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.exclude = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    /// Get a custom option
    pub fn option(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }

    /// Interpret a raw configuration value as a filter mapping
    ///
    /// Anything that is not a mapping, or a mapping that does not describe a
    /// filter, is rejected with an error naming the value.
    pub fn from_value(value: &Value) -> Result<Self, ConfigError> {
        if !value.is_object() {
            return Err(ConfigError::invalid_filter(
                value,
                "expected a filter instance or a mapping of filter options",
            ));
        }
        serde_json::from_value(value.clone())
            .map_err(|e| ConfigError::invalid_filter(value, e.to_string()))
    }
}

/// Complete configuration for a filter pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Filter mappings, validated when the pipeline is built
    #[serde(default)]
    pub filters: Vec<Value>,

    /// Route template -> endpoint name
    #[serde(default)]
    pub routes: IndexMap<String, String>,

    /// Largest form or multipart body buffered for filters
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl PipelineConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Validate every filter entry
    pub fn filter_configs(&self) -> Result<Vec<FilterConfig>, ConfigError> {
        self.filters.iter().map(FilterConfig::from_value).collect()
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            routes: IndexMap::new(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}
