//! Health endpoint smoke test.

mod common;

use axum::http::StatusCode;
use common::*;

#[tokio::test]
async fn health_reports_ok_with_live_database() {
    let t = build_test_app().await;

    let response = get(t.app.clone(), "/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["db_healthy"], true);
    assert!(body["version"].is_string());
}
