//! Tests for building pipelines from configuration
//!
//! Covers YAML loading from disk, legacy key aliases and equivalence between
//! configured and hand-built filters.

use axum::http::{Method, Uri};
use prefilter::prelude::*;
use std::io::Write;
use tempfile::NamedTempFile;

fn routed(uri: &'static str, endpoint: &str) -> FilterRequest {
    let request = FilterRequest::new(Method::GET, Uri::from_static(uri));
    let template = request.path().to_string();
    request.with_route(MatchedRoute::new(endpoint, template))
}

fn write_yaml(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(content.as_bytes())
        .expect("Failed to write temp file");
    file
}

#[tokio::test]
async fn test_pipeline_from_yaml_file() {
    let file = write_yaml(
        r#"
filters:
  - tag: f1
    params: [request_path]
  - tag: f2
    precedence: 50
    params: [zed]
  - filter_tag: f3
    filter_params: [zed]
    filter_skip: [login]
routes:
  /login: login
"#,
    );

    let config = PipelineConfig::from_yaml_file(file.path()).unwrap();
    let pipeline = FilterPipeline::from_config(config).unwrap();

    let tags: Vec<_> = pipeline.tags().collect();
    assert_eq!(tags, vec!["f2", "f1", "f3"]);

    let mut ctx = FilterContext::new();
    pipeline
        .run_filters(&routed("/login?zed=9", "login"), &mut ctx)
        .await
        .unwrap();
    assert_eq!(ctx.value("f1", "path"), &json!("/login"));
    assert_eq!(ctx.value("f2", "zed"), &json!("9"));
    assert!(ctx.result("f3").is_none());
}

#[test]
fn test_missing_file_is_io_error() {
    let err = PipelineConfig::from_yaml_file("/definitely/not/here.yaml").unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
    assert!(err.to_string().contains("/definitely/not/here.yaml"));
}

#[test]
fn test_malformed_yaml_is_parse_error() {
    let file = write_yaml("filters: [unclosed");
    let err = PipelineConfig::from_yaml_file(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn test_invalid_filter_entry_fails_pipeline_build() {
    let config = PipelineConfig::from_yaml_str("filters:\n  - 42\n").unwrap();
    let err = FilterPipeline::from_config(config).unwrap_err();
    match err {
        ConfigError::InvalidFilter { value, .. } => assert_eq!(value, "42"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_invalid_pattern_fails_pipeline_build() {
    let config = FilterConfig::new("f").with_include([""]);
    let err = FilterPipeline::new([config]).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidPattern { .. }));
}

#[tokio::test]
async fn test_configured_and_built_filters_agree() {
    let configured = FilterPipeline::new([json!({
        "tag": "site",
        "precedence": 10,
        "params": ["request_method", "zed", "view_args"],
        "exclude": ["login"]
    })])
    .unwrap();

    let built = FilterPipeline::new([FilterSpec::builder("site")
        .precedence(10)
        .params([
            Param::request("method"),
            Param::form("zed"),
            Param::request("view_args"),
        ])
        .exclude(["login"])
        .build()
        .unwrap()])
    .unwrap();

    for (uri, endpoint) in [("/?zed=1", "index"), ("/login?zed=2", "login")] {
        let request = routed(uri, endpoint);
        let mut left = FilterContext::new();
        let mut right = FilterContext::new();
        configured.run_filters(&request, &mut left).await.unwrap();
        built.run_filters(&request, &mut right).await.unwrap();
        assert_eq!(left.result("site"), right.result("site"));
    }
}
