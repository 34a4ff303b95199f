//! Filter parameter descriptors
//!
//! Each parameter a filter declares becomes a `(name, extractor)` pair when
//! the filter is built. The descriptor decides where the value comes from:
//!
//! - [`Param::Function`]: a caller-supplied function of the request
//! - [`Param::RequestField`]: a request attribute such as `path` or `method`
//! - [`Param::Computed`]: a named callback registered on the filter
//! - [`Param::FormField`]: a query, form, route argument or file lookup
//!
//! # Example
//!
//! ```rust,ignore
//! use prefilter::prelude::*;
//!
//! let params = vec![
//!     Param::request("path"),
//!     Param::form("zed"),
//!     Param::function("agent", |req| Ok(json!(req.header("user-agent")))),
//! ];
//! ```

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use super::request::{BODY_FIELDS, FilterRequest, REQUEST_FIELDS};

/// Extraction function invoked once per request
pub type Extractor = Arc<dyn Fn(&FilterRequest) -> anyhow::Result<Value> + Send + Sync>;

/// Prefix selecting a request attribute in string descriptors
pub const REQUEST_PREFIX: &str = "request_";

/// Prefix selecting a registered callback in string descriptors
pub const COMPUTED_PREFIX: &str = "get_";

/// Declares where a filter parameter's value comes from
#[derive(Clone)]
pub enum Param {
    /// Value computed by a function of the request
    Function { name: String, extractor: Extractor },
    /// A request attribute, see [`FilterRequest::field`]
    RequestField(String),
    /// A callback registered on the filter under this name
    Computed(String),
    /// Query/form value, route argument or uploaded file
    FormField(String),
}

impl Param {
    pub fn function<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&FilterRequest) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Param::Function {
            name: name.into(),
            extractor: Arc::new(f),
        }
    }

    pub fn request(attr: impl Into<String>) -> Self {
        Param::RequestField(attr.into())
    }

    pub fn computed(name: impl Into<String>) -> Self {
        Param::Computed(name.into())
    }

    pub fn form(name: impl Into<String>) -> Self {
        Param::FormField(name.into())
    }

    /// Interpret a string descriptor from configuration
    ///
    /// `request_<attr>` and any bare known request attribute select a request
    /// field, `get_<name>` selects a registered callback, and everything else
    /// is a form lookup.
    pub fn parse(descriptor: &str) -> Self {
        if let Some(attr) = descriptor.strip_prefix(REQUEST_PREFIX) {
            return Param::request(attr);
        }
        if let Some(name) = descriptor.strip_prefix(COMPUTED_PREFIX) {
            return Param::computed(name);
        }
        if REQUEST_FIELDS.contains(&descriptor) {
            return Param::request(descriptor);
        }
        Param::form(descriptor)
    }

    /// Output name of the parameter
    pub fn name(&self) -> &str {
        match self {
            Param::Function { name, .. } => name,
            Param::RequestField(name) | Param::Computed(name) | Param::FormField(name) => name,
        }
    }

    /// Whether the value may come from a form or multipart body
    ///
    /// Functions and callbacks are opaque, so they are assumed to need it.
    pub fn reads_body(&self) -> bool {
        match self {
            Param::RequestField(attr) => BODY_FIELDS.contains(&attr.as_str()),
            Param::Function { .. } | Param::Computed(_) | Param::FormField(_) => true,
        }
    }

    /// Extractor for descriptors that do not depend on filter callbacks
    pub(crate) fn direct_extractor(&self) -> Option<Extractor> {
        match self {
            Param::Function { extractor, .. } => Some(extractor.clone()),
            Param::RequestField(attr) => Some(request_field(attr.clone())),
            Param::FormField(name) => Some(form_field(name.clone())),
            Param::Computed(_) => None,
        }
    }
}

impl fmt::Debug for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Param::Function { name, .. } => f.debug_tuple("Function").field(name).finish(),
            Param::RequestField(name) => f.debug_tuple("RequestField").field(name).finish(),
            Param::Computed(name) => f.debug_tuple("Computed").field(name).finish(),
            Param::FormField(name) => f.debug_tuple("FormField").field(name).finish(),
        }
    }
}

impl From<&str> for Param {
    fn from(descriptor: &str) -> Self {
        Param::parse(descriptor)
    }
}

impl From<String> for Param {
    fn from(descriptor: String) -> Self {
        Param::parse(&descriptor)
    }
}

pub(crate) fn request_field(attr: String) -> Extractor {
    Arc::new(move |req: &FilterRequest| -> anyhow::Result<Value> {
        Ok(req.field(&attr))
    })
}

pub(crate) fn form_field(name: String) -> Extractor {
    Arc::new(move |req: &FilterRequest| -> anyhow::Result<Value> {
        Ok(req.lookup(&name))
    })
}

/// A parameter after resolution: an output name bound to its extractor
#[derive(Clone)]
pub struct ResolvedParam {
    name: String,
    extractor: Extractor,
    reads_body: bool,
}

impl ResolvedParam {
    pub(crate) fn new(name: impl Into<String>, extractor: Extractor, reads_body: bool) -> Self {
        Self {
            name: name.into(),
            extractor,
            reads_body,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn reads_body(&self) -> bool {
        self.reads_body
    }

    /// Run the extractor against a request
    pub fn extract(&self, request: &FilterRequest) -> anyhow::Result<Value> {
        (self.extractor)(request)
    }
}

impl fmt::Debug for ResolvedParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedParam")
            .field("name", &self.name)
            .field("reads_body", &self.reads_body)
            .finish_non_exhaustive()
    }
}
