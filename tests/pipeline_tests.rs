//! End-to-end tests of a filtered axum application
//!
//! These tests drive a real router through `axum_test::TestServer` and check
//! what handlers observe after the pipeline ran.

use axum::Router;
use axum::extract::Path;
use axum::http::StatusCode;
use axum::http::header::LOCATION;
use axum::response::IntoResponse;
use axum::routing::get;
use axum_test::TestServer;
use prefilter::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

// =============================================================================
// Handlers
// =============================================================================

/// Echo every published result as JSON
async fn dump(Filtered(ctx): Filtered) -> axum::Json<Value> {
    let mut body = serde_json::Map::new();
    for result in ctx.results() {
        body.insert(result.tag().to_string(), json!(result));
    }
    axum::Json(Value::Object(body))
}

async fn item(Path(id): Path<String>, Filtered(ctx): Filtered) -> axum::Json<Value> {
    axum::Json(json!({"id": id, "seen": ctx.value("item", "id")}))
}

fn app(pipeline: FilterPipeline) -> TestServer {
    let router = pipeline.init(
        Router::new()
            .route("/", get(dump))
            .route("/abc", get(dump))
            .route("/app_route", get(dump))
            .route("/login", get(dump))
            .route("/dontincludeme", get(dump))
            .route("/static/{*path}", get(dump))
            .route("/items/{id}", get(item)),
    );
    let router = router.expect("Failed to install filters");
    TestServer::try_new(router).expect("Failed to create test server")
}

// =============================================================================
// Parameter resolution
// =============================================================================

mod resolution_tests {
    use super::*;

    #[tokio::test]
    async fn test_request_field_param() {
        let pipeline = FilterPipeline::new([FilterConfig::new("f1").with_params(["request_path"])]);
        let server = app(pipeline.unwrap());

        let response = server.get("/abc").await;
        response.assert_status_ok();

        let body: Value = response.json();
        assert_eq!(body["f1"]["path"], "/abc");
    }

    #[tokio::test]
    async fn test_form_field_param() {
        let pipeline = FilterPipeline::new([FilterConfig::new("f2").with_params(["zed"])]);
        let server = app(pipeline.unwrap());

        let response = server.get("/").add_query_param("zed", "9").await;
        let body: Value = response.json();
        assert_eq!(body["f2"]["zed"], "9");
    }

    #[tokio::test]
    async fn test_missing_form_field_is_null() {
        let pipeline = FilterPipeline::new([FilterConfig::new("f2").with_params(["zed"])]);
        let server = app(pipeline.unwrap());

        let body: Value = server.get("/").await.json();
        assert!(body["f2"].as_object().unwrap().contains_key("zed"));
        assert_eq!(body["f2"]["zed"], Value::Null);
    }

    #[tokio::test]
    async fn test_computed_param() {
        let spec = FilterSpec::builder("upper")
            .param("get_path_to_upper")
            .callback("path_to_upper", |r| Ok(json!(r.path().to_uppercase())))
            .build()
            .unwrap();
        let server = app(FilterPipeline::new([spec]).unwrap());

        let body: Value = server.get("/app_route").await.json();
        assert_eq!(body["upper"]["path_to_upper"], "/APP_ROUTE");
    }

    #[tokio::test]
    async fn test_route_argument_lookup() {
        let pipeline = FilterPipeline::new([FilterConfig::new("item").with_params(["id"])]);
        let server = app(pipeline.unwrap());

        let body: Value = server.get("/items/42").await.json();
        assert_eq!(body["id"], "42");
        assert_eq!(body["seen"], "42");
    }

    #[tokio::test]
    async fn test_query_wins_over_route_argument() {
        let pipeline = FilterPipeline::new([FilterConfig::new("item").with_params(["id"])]);
        let server = app(pipeline.unwrap());

        let body: Value = server.get("/items/42").add_query_param("id", "7").await.json();
        assert_eq!(body["seen"], "7");
    }
}

// =============================================================================
// Route rules
// =============================================================================

mod route_rule_tests {
    use super::*;

    fn pipeline() -> FilterPipeline {
        FilterPipeline::builder()
            .filter_entry(FilterConfig::new("index_only").with_include(["index"]))
            .filter_entry(FilterConfig::new("skip_path").with_exclude(["/dontincludeme"]))
            .filter_entry(FilterConfig::new("f3").with_exclude(["login"]))
            .filter_entry(FilterConfig::new("everywhere"))
            .name_route("/", "index")
            .name_route("/login", "login")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_include_by_endpoint() {
        let server = app(pipeline());

        let index: Value = server.get("/").await.json();
        assert!(index.get("index_only").is_some());

        let other: Value = server.get("/abc").await.json();
        assert!(other.get("index_only").is_none());
    }

    #[tokio::test]
    async fn test_exclude_by_endpoint() {
        let server = app(pipeline());

        let body: Value = server.get("/login").await.json();
        assert!(body.get("f3").is_none());
        assert!(body.get("everywhere").is_some());
    }

    #[tokio::test]
    async fn test_exclude_by_path() {
        let server = app(pipeline());

        let body: Value = server.get("/dontincludeme").await.json();
        assert!(body.get("skip_path").is_none());
        assert!(body.get("f3").is_some());
    }

    #[tokio::test]
    async fn test_exclude_wins_over_include() {
        let pipeline = FilterPipeline::builder()
            .filter_entry(
                FilterConfig::new("both")
                    .with_include(["login"])
                    .with_exclude(["login"]),
            )
            .name_route("/login", "login")
            .build()
            .unwrap();
        let server = app(pipeline);

        let body: Value = server.get("/login").await.json();
        assert!(body.get("both").is_none());
    }

    #[tokio::test]
    async fn test_static_excluded_by_default() {
        let server = app(pipeline());

        let body: Value = server.get("/static/app.css").await.json();
        assert_eq!(body, json!({}));
    }

    #[tokio::test]
    async fn test_glob_pattern() {
        let server = app(
            FilterPipeline::new([FilterConfig::new("item")
                .with_params(["id"])
                .with_include(["/items/*"])])
            .unwrap(),
        );

        let hit: Value = server.get("/items/1").await.json();
        assert_eq!(hit["seen"], "1");

        let miss: Value = server.get("/abc").await.json();
        assert!(miss.get("item").is_none());
    }
}

// =============================================================================
// Ordering and short-circuit
// =============================================================================

mod execution_tests {
    use super::*;

    struct Guard;

    #[async_trait]
    impl Filter for Guard {
        fn tag(&self) -> &str {
            "guard"
        }

        fn precedence(&self) -> i32 {
            10
        }

        async fn filter_request(
            &self,
            request: &FilterRequest,
            _context: &mut FilterContext,
        ) -> Result<FilterOutcome, FilterError> {
            if request.arg("token").is_some() {
                Ok(FilterOutcome::Continue)
            } else {
                Ok(FilterOutcome::respond((StatusCode::FOUND, [(LOCATION, "/login")])))
            }
        }
    }

    struct Counter {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Filter for Counter {
        fn tag(&self) -> &str {
            "counter"
        }

        fn precedence(&self) -> i32 {
            200
        }

        async fn filter_request(
            &self,
            _request: &FilterRequest,
            _context: &mut FilterContext,
        ) -> Result<FilterOutcome, FilterError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(FilterOutcome::Continue)
        }
    }

    #[tokio::test]
    async fn test_short_circuit_skips_later_filters_and_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = FilterPipeline::builder()
            .filter(Counter { calls: calls.clone() })
            .filter(Guard)
            .build()
            .unwrap();
        let server = app(pipeline);

        let response = server.get("/abc").await;
        response.assert_status(StatusCode::FOUND);
        assert_eq!(response.header(LOCATION), "/login");
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let response = server.get("/abc").add_query_param("token", "t").await;
        response.assert_status_ok();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_results_published_in_precedence_order() {
        async fn tags(Filtered(ctx): Filtered) -> axum::Json<Value> {
            axum::Json(json!(ctx.tags().collect::<Vec<_>>()))
        }

        let pipeline = FilterPipeline::new([
            FilterConfig::new("late").with_precedence(200),
            FilterConfig::new("early").with_precedence(-1),
            FilterConfig::new("middle"),
            FilterConfig::new("middle_too"),
        ])
        .unwrap();
        let router = pipeline.init(Router::new().route("/", get(tags))).unwrap();
        let server = TestServer::try_new(router).expect("Failed to create test server");

        let body: Value = server.get("/").await.json();
        assert_eq!(body, json!(["early", "middle", "middle_too", "late"]));
    }

    #[tokio::test]
    async fn test_extractor_error_is_500() {
        let spec = FilterSpec::builder("user")
            .param(Param::function("user", |_| Err(anyhow::anyhow!("user store unavailable"))))
            .build()
            .unwrap();
        let server = app(FilterPipeline::new([spec]).unwrap());

        let response = server.get("/").await;
        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);

        let body: Value = response.json();
        assert_eq!(body["code"], "FILTER_EXTRACTION_FAILED");
    }

    #[tokio::test]
    async fn test_unmatched_route_is_plain_404() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = FilterPipeline::builder()
            .filter(Counter { calls: calls.clone() })
            .build()
            .unwrap();
        let server = app(pipeline);

        let response = server.get("/does/not/exist").await;
        response.assert_status(StatusCode::NOT_FOUND);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_repeated_requests_see_same_results() {
        let pipeline = FilterPipeline::new([FilterConfig::new("f").with_params(["path", "zed"])]);
        let server = app(pipeline.unwrap());

        let first: Value = server.get("/abc").add_query_param("zed", "1").await.json();
        let second: Value = server.get("/abc").add_query_param("zed", "1").await.json();
        assert_eq!(first, second);
    }

    #[test]
    fn test_init_without_routes_is_config_error() {
        let pipeline = FilterPipeline::new([FilterConfig::new("f")]).unwrap();

        let err = pipeline.init(Router::<()>::new()).unwrap_err();
        assert!(matches!(err, ConfigError::NoRoutes));
    }

    #[tokio::test]
    async fn test_active_pipeline_extractor() {
        async fn tags(pipeline: ActivePipeline) -> impl IntoResponse {
            axum::Json(json!(pipeline.tags().collect::<Vec<_>>()))
        }

        let pipeline = FilterPipeline::new([
            FilterConfig::new("b").with_precedence(2),
            FilterConfig::new("a").with_precedence(1),
        ])
        .unwrap();
        let router = pipeline.init(Router::new().route("/tags", get(tags))).unwrap();
        let server = TestServer::try_new(router).expect("Failed to create test server");

        let body: Value = server.get("/tags").await.json();
        assert_eq!(body, json!(["a", "b"]));
    }
}
