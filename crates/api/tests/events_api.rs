//! Integration tests for the persisted event read surface.

mod common;

use axum::http::StatusCode;
use common::*;
use gatewatch_core::counting::ReversalPolicy;
use gatewatch_pipeline::{JobDescriptor, JobPhase, ScriptedDetector};
use tower::ServiceExt;

/// Run a crossing scenario to completion and return its job id.
async fn run_crossing_job(t: &TestApp, camera: &str) -> String {
    let descriptor = JobDescriptor::file_video("synthetic.mp4", camera, true, crossing_line(), None);
    let job_id = t.manager.submit(descriptor).unwrap();
    wait_for_phase(&t.manager, &job_id, JobPhase::Completed).await;
    job_id
}

#[tokio::test]
async fn events_expose_the_contract_columns() {
    let t = build_test_app_with(
        ScriptedDetector::moving_box(&CROSSING_PATH, 30, 0.9, 0),
        3,
        |cfg| cfg.reversal_policy = ReversalPolicy::FirstOnly,
    )
    .await;
    run_crossing_job(&t, "cam-events").await;

    let response = get(t.app.clone(), "/events").await;
    assert_eq!(response.status(), StatusCode::OK);
    let rows = body_json(response).await;
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 1);

    let row = &rows[0];
    assert!(row["id"].is_i64());
    assert_eq!(row["event_type"], "entry");
    assert_eq!(row["camera_id"], "cam-events");
    assert!(row["track_id"].is_i64());
    assert!(row["confidence"].is_f64());
    assert!(row["timestamp"].is_string());
    assert_eq!(row["frame_index"], 2);
    let bbox: Vec<i64> = serde_json::from_str(row["bbox"].as_str().unwrap()).unwrap();
    assert_eq!(bbox.len(), 4);
    assert_eq!(row["line_id"], "entry_line");
}

#[tokio::test]
async fn events_filter_by_camera_and_type() {
    let t = build_test_app_with(
        ScriptedDetector::moving_box(&CROSSING_PATH, 30, 0.9, 0),
        3,
        |_| {},
    )
    .await;
    run_crossing_job(&t, "cam-a").await;
    run_crossing_job(&t, "cam-b").await;

    let response = get(t.app.clone(), "/events?camera_id=cam-a").await;
    let rows = body_json(response).await;
    assert_eq!(rows.as_array().unwrap().len(), 1);

    let response = get(t.app.clone(), "/events?event_type=exit").await;
    let rows = body_json(response).await;
    assert!(rows.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn summary_aggregates_per_camera() {
    let t = build_test_app_with(
        ScriptedDetector::moving_box(&CROSSING_PATH, 30, 0.9, 0),
        3,
        |_| {},
    )
    .await;
    run_crossing_job(&t, "cam-sum").await;

    let response = get(t.app.clone(), "/events/summary").await;
    assert_eq!(response.status(), StatusCode::OK);
    let summary = body_json(response).await;
    let entries = summary.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["camera_id"], "cam-sum");
    assert_eq!(entries[0]["entry_count"], 1);
    assert_eq!(entries[0]["exit_count"], 0);
    assert_eq!(entries[0]["net_count"], 1);
}

#[tokio::test]
async fn history_records_completions() {
    let t = build_test_app().await;

    let request = multipart_upload("/jobs/video", "clip.mp4", b"fake");
    let response = t.app.clone().oneshot(request).await.unwrap();
    let job_id = body_json(response).await["job_id"].as_str().unwrap().to_string();
    wait_for_phase(&t.manager, &job_id, JobPhase::Completed).await;

    let response = get(t.app.clone(), "/history").await;
    assert_eq!(response.status(), StatusCode::OK);
    let rows = body_json(response).await;
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["file_type"], "video");
    assert!(rows[0]["file_name"].as_str().unwrap().ends_with(".mp4"));
}
