//! Admin API routing tests

mod helpers;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use graph_common::config::TransformersConfig;
use graph_common::vocab::{rdf, sdo};
use graph_common::{Resource, Statement};
use graph_jobs::{build_router, build_scheduler, AppState};
use helpers::Harness;
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

fn app(harness: &Harness, transformers: &TransformersConfig) -> axum::Router {
    let scheduler = Arc::new(build_scheduler(harness.services.clone(), transformers));
    build_router(AppState::new(scheduler, Arc::clone(&harness.metrics)))
}

async fn send(app: axum::Router, method: &str, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_health() {
    let harness = Harness::new();
    let (status, body) = send(app(&harness, &TransformersConfig::default()), "GET", "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "graph-jobs");
}

#[tokio::test]
async fn test_jobs_listed_in_dependency_order() {
    let harness = Harness::new();
    let (status, body) = send(app(&harness, &TransformersConfig::default()), "GET", "/api/admin/jobs").await;
    assert_eq!(status, StatusCode::OK);

    let names: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|job| job["name"].as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        vec![
            "replace_subject_identifiers",
            "replace_linked_identifiers",
            "assign_internal_types",
            "merge_duplicates"
        ]
    );
    assert_eq!(body[0]["running"], false);
    assert!(body[0]["last_run"].is_null());
}

#[tokio::test]
async fn test_run_job_reports_outcome() {
    let harness = Harness::new();
    harness
        .load(vec![Statement::new(Resource::blank("b1"), rdf::TYPE, sdo::VIDEO_OBJECT)])
        .await;
    let app = app(&harness, &TransformersConfig::default());

    let (status, body) = send(app.clone(), "POST", "/api/admin/jobs/replace_subject_identifiers/run").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["job"], "replace_subject_identifiers");
    assert_eq!(body["processed"], 1);

    let (_, jobs) = send(app.clone(), "GET", "/api/admin/jobs").await;
    assert_eq!(jobs[0]["last_run"]["status"], "completed");

    let (status, metrics) = send(app, "GET", "/api/admin/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(metrics["counters"].is_object());
}

#[tokio::test]
async fn test_unknown_job_is_404() {
    let harness = Harness::new();
    let (status, body) = send(
        app(&harness, &TransformersConfig::default()),
        "POST",
        "/api/admin/jobs/compact/run",
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_disabled_type_transformer_fails_job() {
    let harness = Harness::new();
    let transformers = TransformersConfig {
        type_coercion: false,
        ..TransformersConfig::default()
    };
    let app = app(&harness, &transformers);

    let (status, body) = send(app.clone(), "POST", "/api/admin/jobs/assign_internal_types/run").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"]["message"].as_str().unwrap().contains("disabled"));

    let (_, jobs) = send(app, "GET", "/api/admin/jobs").await;
    assert_eq!(jobs[2]["last_run"]["status"], "failed");
}
