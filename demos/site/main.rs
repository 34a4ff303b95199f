//! Demo site
//!
//! Three filters share the same parameters but differ in where they run:
//! - `index_only` only runs on the `index` endpoint (`/includeme`)
//! - `skip_dontincludeme` runs everywhere except the `/dontincludeme` path
//! - `everywhere` keeps the default rules
//!
//! Try `curl 'http://127.0.0.1:3000/justhere?my_val=42'`.

use anyhow::Result;
use axum::Router;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use prefilter::prelude::*;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

const INDEX_TEMPLATE: &str = include_str!("templates/index.html");

fn request_summary(request: &FilterRequest) -> anyhow::Result<Value> {
    let args: Vec<String> = request
        .args()
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect();
    Ok(json!({
        "method": request.method().as_str().to_lowercase(),
        "user_agent": request.header("user-agent").unwrap_or("-"),
        "args": args.join(", "),
    }))
}

fn site_filter(tag: &str) -> FilterSpecBuilder {
    FilterSpec::builder(tag)
        .param(Param::function("request_summary", request_summary))
        .param("my_val")
}

fn render(page: &str, TemplateContext(mut vars): TemplateContext) -> Response {
    vars.insert("page", page);
    match tera::Tera::one_off(INDEX_TEMPLATE, &vars, true) {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "template rendering failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn index(vars: TemplateContext) -> Response {
    render("includeme", vars)
}

async fn anyroute(vars: TemplateContext) -> Response {
    render("justhere", vars)
}

async fn nothing(vars: TemplateContext) -> Response {
    render("dontincludeme", vars)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,prefilter=debug")),
        )
        .init();

    let pipeline = FilterPipeline::builder()
        .filter(site_filter("index_only").include(["index"]).build()?)
        .filter(site_filter("skip_dontincludeme").exclude(["/dontincludeme"]).build()?)
        .filter(site_filter("everywhere").build()?)
        .name_route("/includeme", "index")
        .name_route("/justhere", "anyroute")
        .name_route("/dontincludeme", "nothing")
        .build()?;

    let app = pipeline
        .init(
            Router::new()
                .route("/includeme", get(index))
                .route("/justhere", get(anyroute))
                .route("/dontincludeme", get(nothing)),
        )?
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;

    println!("🚀 prefilter demo running on http://127.0.0.1:3000");
    println!("    GET /includeme      - all three filters");
    println!("    GET /justhere       - skip_dontincludeme and everywhere");
    println!("    GET /dontincludeme  - everywhere only");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("shutting down");
}
