//! Request snapshot consumed by filters
//!
//! A [`FilterRequest`] is captured once per request, before any filter runs.
//! Extractors only ever see this snapshot, so every filter observes the same
//! request state regardless of what earlier filters did.

use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, Uri, header};
use cookie::Cookie;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value, json};

use super::route::MatchedRoute;

/// Request attributes reachable through [`FilterRequest::field`]
pub const REQUEST_FIELDS: &[&str] = &[
    "path",
    "full_path",
    "url",
    "method",
    "scheme",
    "host",
    "query_string",
    "args",
    "form",
    "values",
    "files",
    "view_args",
    "headers",
    "cookies",
    "content_type",
    "user_agent",
    "endpoint",
    "url_rule",
];

/// Request attributes decoded from a form or multipart body
pub const BODY_FIELDS: &[&str] = &["form", "values", "files"];

/// A file received in a `multipart/form-data` body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadedFile {
    /// Form field the file was sent under
    pub field: String,
    /// Client-supplied file name
    pub filename: String,
    /// Declared content type of the part
    pub content_type: Option<String>,
    /// Size of the file in bytes
    pub size: usize,
    /// Raw file contents
    #[serde(skip)]
    pub data: Bytes,
}

impl UploadedFile {
    /// Create an uploaded file record
    pub fn new(
        field: impl Into<String>,
        filename: impl Into<String>,
        content_type: Option<String>,
        data: Bytes,
    ) -> Self {
        Self {
            field: field.into(),
            filename: filename.into(),
            content_type,
            size: data.len(),
            data,
        }
    }
}

/// Immutable view of an incoming request
#[derive(Debug, Clone)]
pub struct FilterRequest {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    route: Option<MatchedRoute>,
    view_args: IndexMap<String, String>,
    args: Vec<(String, String)>,
    form: Vec<(String, String)>,
    files: Vec<UploadedFile>,
}

impl FilterRequest {
    /// Create a request snapshot; query parameters are decoded from `uri`
    pub fn new(method: Method, uri: Uri) -> Self {
        let args = decode_pairs(uri.query().unwrap_or_default().as_bytes());
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            route: None,
            view_args: IndexMap::new(),
            args,
            form: Vec::new(),
            files: Vec::new(),
        }
    }

    /// Set the route this request matched
    pub fn with_route(mut self, route: MatchedRoute) -> Self {
        self.route = Some(route);
        self
    }

    /// Replace the request headers
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Append a single header
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Add a route argument (path parameter)
    pub fn with_view_arg(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.view_args.insert(name.into(), value.into());
        self
    }

    /// Add a decoded form field
    pub fn with_form_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.push((name.into(), value.into()));
        self
    }

    /// Decode and append an `application/x-www-form-urlencoded` body
    pub fn with_form_body(mut self, body: &[u8]) -> Self {
        self.form.extend(decode_pairs(body));
        self
    }

    /// Add an uploaded file
    pub fn with_file(mut self, file: UploadedFile) -> Self {
        self.files.push(file);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn query_string(&self) -> &str {
        self.uri.query().unwrap_or_default()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get a header as a string, if present and valid UTF-8
    pub fn header(&self, name: impl header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The matched route, or `None` when the request hit no route
    pub fn route(&self) -> Option<&MatchedRoute> {
        self.route.as_ref()
    }

    /// Decoded query parameters, in request order
    pub fn args(&self) -> &[(String, String)] {
        &self.args
    }

    /// Decoded form fields, in body order
    pub fn form(&self) -> &[(String, String)] {
        &self.form
    }

    pub fn files(&self) -> &[UploadedFile] {
        &self.files
    }

    pub fn view_args(&self) -> &IndexMap<String, String> {
        &self.view_args
    }

    /// First value of a query parameter
    pub fn arg(&self, name: &str) -> Option<&str> {
        first_value(&self.args, name)
    }

    /// Get a named request attribute as a JSON value
    ///
    /// Unknown attributes yield `Value::Null` rather than an error.
    pub fn field(&self, attr: &str) -> Value {
        match attr {
            "path" => json!(self.path()),
            "full_path" => json!(format!("{}?{}", self.path(), self.query_string())),
            "url" => json!(self.url()),
            "method" => json!(self.method.as_str()),
            "scheme" => json!(self.scheme()),
            "host" => self.host().map_or(Value::Null, |h| json!(h)),
            "query_string" => json!(self.query_string()),
            "args" => pairs_to_object(&self.args),
            "form" => pairs_to_object(&self.form),
            "values" => {
                let mut combined = self.args.clone();
                combined.extend(self.form.iter().cloned());
                pairs_to_object(&combined)
            }
            "files" => {
                let mut files = Map::new();
                for file in &self.files {
                    files
                        .entry(file.field.clone())
                        .or_insert_with(|| json!(file));
                }
                Value::Object(files)
            }
            "view_args" => json!(self.view_args),
            "headers" => self.headers_object(),
            "cookies" => self.cookies_object(),
            "content_type" => self
                .header(header::CONTENT_TYPE)
                .map_or(Value::Null, |v| json!(v)),
            "user_agent" => self
                .header(header::USER_AGENT)
                .map_or(Value::Null, |v| json!(v)),
            "endpoint" => self
                .route
                .as_ref()
                .map_or(Value::Null, |r| json!(r.endpoint())),
            "url_rule" => self
                .route
                .as_ref()
                .map_or(Value::Null, |r| json!(r.template())),
            _ => Value::Null,
        }
    }

    /// Look up a named value in query/form values, then route arguments,
    /// then uploaded files
    ///
    /// Empty values are skipped; `Value::Null` when nothing matches.
    pub fn lookup(&self, name: &str) -> Value {
        if let Some(value) = first_non_empty(&self.args, name) {
            return json!(value);
        }
        if let Some(value) = first_non_empty(&self.form, name) {
            return json!(value);
        }
        if let Some(value) = self.view_args.get(name).filter(|v| !v.is_empty()) {
            return json!(value);
        }
        self.files
            .iter()
            .find(|f| f.field == name)
            .map_or(Value::Null, |f| json!(f))
    }

    fn scheme(&self) -> &str {
        self.uri.scheme_str().unwrap_or("http")
    }

    fn host(&self) -> Option<&str> {
        self.uri.host().or_else(|| self.header(header::HOST))
    }

    fn url(&self) -> String {
        let path = self
            .uri
            .path_and_query()
            .map_or_else(|| self.path().to_string(), |pq| pq.to_string());
        match self.host() {
            Some(host) => format!("{}://{}{}", self.scheme(), host, path),
            None => path,
        }
    }

    fn headers_object(&self) -> Value {
        let mut headers: Map<String, Value> = Map::new();
        for (name, value) in &self.headers {
            let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
            match headers.get_mut(name.as_str()) {
                Some(Value::String(existing)) => {
                    existing.push_str(", ");
                    existing.push_str(&value);
                }
                _ => {
                    headers.insert(name.as_str().to_string(), Value::String(value));
                }
            }
        }
        Value::Object(headers)
    }

    fn cookies_object(&self) -> Value {
        let mut cookies = Map::new();
        for raw in self.headers.get_all(header::COOKIE) {
            let Ok(raw) = raw.to_str() else {
                continue;
            };
            for cookie in Cookie::split_parse_encoded(raw).flatten() {
                cookies
                    .entry(cookie.name().to_string())
                    .or_insert_with(|| json!(cookie.value_trimmed()));
            }
        }
        Value::Object(cookies)
    }
}

/// Decode `application/x-www-form-urlencoded` pairs
pub(crate) fn decode_pairs(input: &[u8]) -> Vec<(String, String)> {
    url::form_urlencoded::parse(input).into_owned().collect()
}

fn first_value<'a>(pairs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

fn first_non_empty<'a>(pairs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, v)| k == name && !v.is_empty())
        .map(|(_, v)| v.as_str())
}

// Multi-value keys keep their first value.
fn pairs_to_object(pairs: &[(String, String)]) -> Value {
    let mut object = Map::new();
    for (key, value) in pairs {
        object
            .entry(key.clone())
            .or_insert_with(|| Value::String(value.clone()));
    }
    Value::Object(object)
}
