//! Route identity and include/exclude matching
//!
//! axum identifies a matched route by its template (`/users/{id}`). Filters
//! are usually written against logical endpoint names instead (`login`,
//! `static`), so a [`RouteTable`] maps templates to endpoint names and a
//! [`MatchedRoute`] carries both.

use regex::Regex;
use std::collections::HashMap;

use super::error::ConfigError;

/// Pattern that matches every route
pub const MATCH_ALL: &str = "all";

/// Endpoint name of the host's static-asset route
pub const STATIC_ENDPOINT: &str = "static";

/// The route a request resolved to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedRoute {
    endpoint: String,
    template: String,
}

impl MatchedRoute {
    pub fn new(endpoint: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            template: template.into(),
        }
    }

    /// Logical endpoint name (falls back to the template for unnamed routes)
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Route template as registered with the router
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Endpoint name without its dotted group prefix (`admin.login` → `login`)
    pub fn short_name(&self) -> &str {
        self.endpoint
            .rsplit('.')
            .next()
            .unwrap_or(self.endpoint.as_str())
    }
}

/// Maps route templates to logical endpoint names
#[derive(Debug, Clone)]
pub struct RouteTable {
    names: HashMap<String, String>,
}

impl RouteTable {
    /// Create a table with only the static-asset endpoint registered
    pub fn new() -> Self {
        let mut names = HashMap::new();
        names.insert("/static".to_string(), STATIC_ENDPOINT.to_string());
        names.insert("/static/{*path}".to_string(), STATIC_ENDPOINT.to_string());
        Self { names }
    }

    /// Name the route registered under `template`
    pub fn name(&mut self, template: impl Into<String>, endpoint: impl Into<String>) {
        self.names.insert(template.into(), endpoint.into());
    }

    /// Endpoint name for a template, if one was registered
    pub fn endpoint_for(&self, template: &str) -> Option<&str> {
        self.names.get(template).map(String::as_str)
    }

    /// Resolve a matched template into a [`MatchedRoute`]
    pub fn resolve(&self, template: &str) -> MatchedRoute {
        let endpoint = self.endpoint_for(template).unwrap_or(template);
        MatchedRoute::new(endpoint, template)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}

/// A single include/exclude pattern
#[derive(Debug, Clone)]
pub enum RoutePattern {
    /// Matches every route
    All,
    /// Matches an endpoint name, template or path exactly
    Exact(String),
    /// `*` wildcard pattern, compiled to an anchored regex
    Glob { raw: String, regex: Regex },
}

impl RoutePattern {
    /// Parse a pattern string; `tag` names the owning filter in errors
    pub fn parse(tag: &str, pattern: &str) -> Result<Self, ConfigError> {
        if pattern.trim().is_empty() {
            return Err(ConfigError::InvalidPattern {
                tag: tag.to_string(),
                pattern: pattern.to_string(),
                reason: "pattern must not be empty".to_string(),
            });
        }
        if pattern == MATCH_ALL {
            return Ok(RoutePattern::All);
        }
        if !pattern.contains('*') {
            return Ok(RoutePattern::Exact(pattern.to_string()));
        }

        let body = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let regex = Regex::new(&format!("^{}$", body)).map_err(|e| ConfigError::InvalidPattern {
            tag: tag.to_string(),
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;

        Ok(RoutePattern::Glob {
            raw: pattern.to_string(),
            regex,
        })
    }

    /// The pattern as originally written
    pub fn as_str(&self) -> &str {
        match self {
            RoutePattern::All => MATCH_ALL,
            RoutePattern::Exact(s) => s,
            RoutePattern::Glob { raw, .. } => raw,
        }
    }

    /// Check the pattern against a route and the concrete request path
    pub fn matches(&self, route: &MatchedRoute, path: &str) -> bool {
        let candidates = [route.endpoint(), route.short_name(), route.template(), path];
        match self {
            RoutePattern::All => true,
            RoutePattern::Exact(s) => candidates.contains(&s.as_str()),
            RoutePattern::Glob { regex, .. } => candidates.iter().any(|c| regex.is_match(c)),
        }
    }
}

/// Include/exclude rules deciding whether a filter runs on a route
#[derive(Debug, Clone)]
pub struct RouteRules {
    include: Vec<RoutePattern>,
    exclude: Vec<RoutePattern>,
}

impl RouteRules {
    /// Compile include and exclude pattern lists for the filter `tag`
    pub fn compile<I, E>(tag: &str, include: I, exclude: E) -> Result<Self, ConfigError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        let include = include
            .into_iter()
            .map(|p| RoutePattern::parse(tag, p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        let exclude = exclude
            .into_iter()
            .map(|p| RoutePattern::parse(tag, p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { include, exclude })
    }

    pub fn include(&self) -> &[RoutePattern] {
        &self.include
    }

    pub fn exclude(&self) -> &[RoutePattern] {
        &self.exclude
    }

    /// Exclusion is checked first and always wins
    pub fn allows(&self, route: &MatchedRoute, path: &str) -> bool {
        if self.exclude.iter().any(|p| p.matches(route, path)) {
            return false;
        }
        self.include.iter().any(|p| p.matches(route, path))
    }
}

impl Default for RouteRules {
    /// Include everything except the static-asset endpoint
    fn default() -> Self {
        Self {
            include: vec![RoutePattern::All],
            exclude: vec![RoutePattern::Exact(STATIC_ENDPOINT.to_string())],
        }
    }
}
