//! Axum binding for the filter pipeline
//!
//! The pipeline is installed with `route_layer`, so it only sees requests
//! that matched a route. For each request it captures a [`FilterRequest`]
//! snapshot, runs the pre-handler and either answers with a short-circuit
//! response or hands the populated [`FilterContext`] to the route handler
//! through request extensions.
//!
//! Form and multipart bodies are only buffered when a filter that applies to
//! the matched route reads them.

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::{
    FromRequest, FromRequestParts, MatchedPath, Multipart, RawPathParams, Request, State,
};
use axum::http::header::CONTENT_TYPE;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use mime::Mime;
use std::sync::Arc;

use crate::core::context::FilterContext;
use crate::core::error::{ConfigError, FilterError};
use crate::core::filter::FilterOutcome;
use crate::core::request::{FilterRequest, UploadedFile};
use crate::core::route::RouteTable;
use crate::server::pipeline::FilterPipeline;

impl FilterPipeline {
    /// Install the pipeline on every route registered so far
    ///
    /// Routes added to the router after this call are not filtered. Fails
    /// with [`ConfigError::NoRoutes`] when the router has no routes yet.
    pub fn init<S>(self, router: Router<S>) -> Result<Router<S>, ConfigError>
    where
        S: Clone + Send + Sync + 'static,
    {
        attach(Arc::new(self), router)
    }
}

/// Install a shared pipeline on a router
pub fn attach<S>(
    pipeline: Arc<FilterPipeline>,
    router: Router<S>,
) -> Result<Router<S>, ConfigError>
where
    S: Clone + Send + Sync + 'static,
{
    if !router.has_routes() {
        return Err(ConfigError::NoRoutes);
    }

    tracing::info!(
        filters = pipeline.len(),
        order = ?pipeline.tags().collect::<Vec<_>>(),
        "installing request filters"
    );
    Ok(router.route_layer(middleware::from_fn_with_state(pipeline, filter_middleware)))
}

/// Middleware function running the pipeline before the route handler
pub async fn filter_middleware(
    State(pipeline): State<Arc<FilterPipeline>>,
    request: Request,
    next: Next,
) -> Response {
    let body_limit = body_limit(&pipeline, &request);
    let (filter_request, mut request) =
        match capture_request(request, pipeline.routes(), body_limit).await {
            Ok(captured) => captured,
            Err(err) => {
                tracing::warn!(error = %err, "could not read request for filtering");
                return err.into_response();
            }
        };

    let mut context = FilterContext::new();
    match pipeline.before_request(&filter_request, &mut context).await {
        Ok(FilterOutcome::Continue) => {}
        Ok(FilterOutcome::ShortCircuit(response)) => return response,
        Err(err) => {
            tracing::error!(
                error = %err,
                method = %filter_request.method(),
                path = %filter_request.path(),
                "request filter failed"
            );
            return err.into_response();
        }
    }

    request.extensions_mut().insert(context);
    request.extensions_mut().insert(pipeline);
    next.run(request).await
}

/// Body limit for a request, or `None` when no applicable filter reads the body
fn body_limit(pipeline: &FilterPipeline, request: &Request) -> Option<usize> {
    let reads_body = match request.extensions().get::<MatchedPath>() {
        Some(matched) => {
            let route = pipeline.routes().resolve(matched.as_str());
            pipeline.reads_body(&route, request.uri().path())
        }
        None => false,
    };
    reads_body.then(|| pipeline.max_body_bytes())
}

/// Build the filter snapshot of a request
///
/// With a `body_limit`, form and multipart bodies are buffered (up to that
/// many bytes) and decoded; the returned request carries the same body so
/// handlers can still read it. Without one the body is left untouched.
pub async fn capture_request(
    request: Request,
    routes: &RouteTable,
    body_limit: Option<usize>,
) -> Result<(FilterRequest, Request), FilterError> {
    let (mut parts, body) = request.into_parts();

    let mut snapshot = FilterRequest::new(parts.method.clone(), parts.uri.clone())
        .with_headers(parts.headers.clone());

    if let Some(matched) = parts.extensions.get::<MatchedPath>() {
        snapshot = snapshot.with_route(routes.resolve(matched.as_str()));
    }

    if let Ok(params) = RawPathParams::from_request_parts(&mut parts, &()).await {
        for (name, value) in params.iter() {
            snapshot = snapshot.with_view_arg(name, value);
        }
    }

    let Some(limit) = body_limit else {
        return Ok((snapshot, Request::from_parts(parts, body)));
    };

    let content_type = parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let body = match body_kind(&content_type) {
        Some(BodyKind::Form) => {
            let bytes = buffer_body(body, limit).await?;
            snapshot = snapshot.with_form_body(&bytes);
            Body::from(bytes)
        }
        Some(BodyKind::Multipart) => {
            let bytes = buffer_body(body, limit).await?;
            snapshot = read_multipart(snapshot, &content_type, bytes.clone()).await?;
            Body::from(bytes)
        }
        None => body,
    };

    Ok((snapshot, Request::from_parts(parts, body)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    Form,
    Multipart,
}

/// Media types are compared case-insensitively, ignoring parameters
fn body_kind(content_type: &str) -> Option<BodyKind> {
    let media: Mime = content_type.parse().ok()?;
    if media.type_() == mime::APPLICATION && media.subtype() == mime::WWW_FORM_URLENCODED {
        Some(BodyKind::Form)
    } else if media.type_() == mime::MULTIPART && media.subtype() == mime::FORM_DATA {
        Some(BodyKind::Multipart)
    } else {
        None
    }
}

async fn buffer_body(body: Body, limit: usize) -> Result<Bytes, FilterError> {
    axum::body::to_bytes(body, limit)
        .await
        .map_err(|e| FilterError::Body(e.to_string()))
}

async fn read_multipart(
    mut snapshot: FilterRequest,
    content_type: &str,
    bytes: Bytes,
) -> Result<FilterRequest, FilterError> {
    let request = axum::http::Request::builder()
        .header(CONTENT_TYPE, content_type)
        .body(Body::from(bytes))
        .map_err(|e| FilterError::Body(e.to_string()))?;

    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|e| FilterError::Body(e.to_string()))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| FilterError::Body(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let filename = field.file_name().map(str::to_string);
        let part_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| FilterError::Body(e.to_string()))?;

        snapshot = match filename {
            // a file input left blank arrives as a part with an empty filename
            Some(filename) if filename.trim().is_empty() => snapshot,
            Some(filename) => {
                snapshot.with_file(UploadedFile::new(name, filename, part_type, data))
            }
            None => snapshot.with_form_field(name, String::from_utf8_lossy(&data).into_owned()),
        };
    }

    Ok(snapshot)
}
