//! Core module containing the filter model: requests, parameters, routes and results

pub mod context;
pub mod error;
pub mod filter;
pub mod param;
pub mod request;
pub mod route;

pub use context::{FilterContext, FilterResult};
pub use error::{ConfigError, ErrorResponse, FilterError};
pub use filter::{DEFAULT_PRECEDENCE, Filter, FilterOutcome, FilterSpec, FilterSpecBuilder};
pub use param::{Extractor, Param, ResolvedParam};
pub use request::{FilterRequest, REQUEST_FIELDS, UploadedFile};
pub use route::{MatchedRoute, RoutePattern, RouteRules, RouteTable};
