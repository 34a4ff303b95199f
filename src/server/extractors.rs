//! Handler-side access to filter results
//!
//! Route handlers behind a [`FilterPipeline`] read what the filters
//! published with these extractors:
//!
//! ```rust,ignore
//! async fn index(Filtered(ctx): Filtered) -> String {
//!     format!("path = {}", ctx.value("site", "path"))
//! }
//!
//! async fn page(TemplateContext(vars): TemplateContext) -> Html<String> {
//!     Html(Tera::one_off("{{ site.path }}", &vars, true).unwrap_or_default())
//! }
//! ```

use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::request::Parts;
use std::convert::Infallible;
use std::ops::Deref;
use std::sync::Arc;

use crate::core::context::FilterContext;
use crate::server::pipeline::FilterPipeline;

/// The filter results of the current request
///
/// Empty when the route is not behind a pipeline.
#[derive(Debug, Clone, Default)]
pub struct Filtered(pub FilterContext);

impl Deref for Filtered {
    type Target = FilterContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<S> FromRequestParts<S> for Filtered
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let context = parts
            .extensions
            .get::<FilterContext>()
            .cloned()
            .unwrap_or_default();
        Ok(Filtered(context))
    }
}

/// The pipeline that filtered the current request
#[derive(Debug, Clone)]
pub struct ActivePipeline(pub Arc<FilterPipeline>);

impl Deref for ActivePipeline {
    type Target = FilterPipeline;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<S> FromRequestParts<S> for ActivePipeline
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Arc<FilterPipeline>>()
            .cloned()
            .map(ActivePipeline)
            .ok_or((
                StatusCode::INTERNAL_SERVER_ERROR,
                "route is not behind a filter pipeline",
            ))
    }
}

/// Template variables for the current request
///
/// Holds every registered tag (`null` when its filter did not run) plus the
/// free-form context values.
#[derive(Debug, Clone)]
pub struct TemplateContext(pub tera::Context);

impl<S> FromRequestParts<S> for TemplateContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let context = parts
            .extensions
            .get::<FilterContext>()
            .cloned()
            .unwrap_or_default();

        let template = match parts.extensions.get::<Arc<FilterPipeline>>() {
            Some(pipeline) => pipeline.template_context(&context),
            None => {
                let mut template = tera::Context::new();
                for (key, value) in context.extras() {
                    template.insert(key.as_str(), value);
                }
                for result in context.results() {
                    template.insert(result.tag(), result);
                }
                template
            }
        };
        Ok(TemplateContext(template))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::FilterResult;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::json;

    fn parts() -> Parts {
        Request::builder()
            .uri("/")
            .body(Body::empty())
            .unwrap()
            .into_parts()
            .0
    }

    #[tokio::test]
    async fn test_filtered_defaults_to_empty() {
        let mut parts = parts();
        let Filtered(ctx) = Filtered::from_request_parts(&mut parts, &()).await.unwrap();
        assert!(ctx.is_empty());
    }

    #[tokio::test]
    async fn test_filtered_reads_extension() {
        let mut parts = parts();
        let mut ctx = FilterContext::new();
        let mut result = FilterResult::new("f1");
        result.set("path", json!("/"));
        ctx.publish(result);
        parts.extensions.insert(ctx);

        let filtered = Filtered::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(filtered.value("f1", "path"), &json!("/"));
    }

    #[tokio::test]
    async fn test_active_pipeline_missing_is_rejected() {
        let mut parts = parts();
        let rejection = ActivePipeline::from_request_parts(&mut parts, &())
            .await
            .unwrap_err();
        assert_eq!(rejection.0, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_template_context_without_pipeline() {
        let mut parts = parts();
        let mut ctx = FilterContext::new();
        ctx.publish(FilterResult::new("f1"));
        ctx.set("flag", json!(true));
        parts.extensions.insert(ctx);

        let TemplateContext(vars) = TemplateContext::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        let vars = vars.into_json();
        assert_eq!(vars["f1"], json!({}));
        assert_eq!(vars["flag"], json!(true));
    }
}
