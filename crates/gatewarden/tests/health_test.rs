//! integration tests for the `/health` endpoint

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use gatewarden::create_app;
use gatewarden_store::MemStore;
use gatewarden_types::Config;
use serde::Deserialize;
use tower::ServiceExt;

/// response from the `/health` endpoint
#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
}

/// test that GET /health returns pass status
#[tokio::test]
async fn test_health_endpoint_returns_pass() {
    let app = create_app(MemStore::new(), Config::default());

    let request = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .expect("failed to build request");

    let response = app.oneshot(request).await.expect("request failed");

    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response
        .headers()
        .get("content-type")
        .expect("should have content-type header")
        .to_str()
        .expect("content-type should be valid string");
    assert!(
        content_type.contains("application/health+json"),
        "content-type should be application/health+json, got: {}",
        content_type
    );

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read body");
    let health_response: HealthResponse =
        serde_json::from_slice(&body).expect("failed to parse response");

    assert_eq!(health_response.status, "pass");
}
