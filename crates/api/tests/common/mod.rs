// All functions in this module are shared test helpers. Not every test
// binary uses every helper, so we suppress dead_code warnings at the module
// level.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use gatewatch_api::config::ServerConfig;
use gatewatch_api::router::build_app_router;
use gatewatch_api::state::AppState;
use gatewatch_core::counting::LineConfig;
use gatewatch_core::Detector;
use gatewatch_pipeline::{
    EventWriter, JobManager, JobPhase, PipelineConfig, ScriptedDetector, SourceFactory,
    SyntheticSpec,
};

/// Centers that cross the 60% vertical line between frames 1 and 2
/// (100x100 synthetic frames).
pub const CROSSING_PATH: [(i32, i32); 3] = [(40, 50), (55, 50), (70, 50)];

pub fn crossing_line() -> LineConfig {
    LineConfig::new(60.0, 0.0, 60.0, 100.0).unwrap()
}

/// A fully wired application over an in-memory database, a synthetic frame
/// source, and a scripted detector.
pub struct TestApp {
    pub app: Router,
    pub pool: gatewatch_db::DbPool,
    pub manager: Arc<JobManager>,
    _media_dir: tempfile::TempDir,
}

/// Build the test app with an empty detector script and 3-frame files.
pub async fn build_test_app() -> TestApp {
    build_test_app_with(ScriptedDetector::default(), 3, |_| {}).await
}

/// Build the test app with a custom detector script, synthetic file length,
/// and pipeline tweaks. Uses the same router/middleware stack as production.
pub async fn build_test_app_with(
    script: ScriptedDetector,
    total_frames: u64,
    tweak: impl FnOnce(&mut PipelineConfig),
) -> TestApp {
    let media_dir = tempfile::tempdir().expect("tempdir");
    // A single connection: each in-memory SQLite connection is its own
    // database.
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory pool");
    gatewatch_db::init_schema(&pool).await.expect("schema init");

    let mut pipeline = PipelineConfig {
        media_dir: media_dir.path().to_path_buf(),
        entry_line: crossing_line(),
        ..Default::default()
    };
    tweak(&mut pipeline);

    let config = ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["*".to_string()],
        request_timeout_secs: 30,
        database_url: "sqlite::memory:".to_string(),
        pipeline: pipeline.clone(),
    };

    let detector: Arc<dyn Detector> = Arc::new(script);
    let store = EventWriter::new(pool.clone(), media_dir.path());
    let manager = JobManager::start(
        pipeline,
        Arc::clone(&detector),
        store,
        SourceFactory::Synthetic(SyntheticSpec {
            width: 100,
            height: 100,
            fps: 30.0,
            total_frames,
        }),
    );

    let state = AppState {
        pool: pool.clone(),
        config: Arc::new(config.clone()),
        manager: Arc::clone(&manager),
        detector,
    };

    TestApp {
        app: build_app_router(state, &config),
        pool,
        manager,
        _media_dir: media_dir,
    }
}

/// Poll the manager until the job reaches the phase, or panic.
pub async fn wait_for_phase(manager: &JobManager, job_id: &str, phase: JobPhase) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if matches!(manager.status(job_id).map(|s| s.phase), Ok(p) if p == phase) {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {job_id} never reached {phase:?}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ---------------------------------------------------------------------------
// Shared HTTP test helpers
// ---------------------------------------------------------------------------

/// Collect the response body into a `serde_json::Value`.
pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Send a JSON request with the given HTTP method.
pub async fn send_json(
    app: Router,
    method: Method,
    uri: &str,
    body: serde_json::Value,
) -> axum::response::Response {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// POST JSON to the given URI and return the response.
pub async fn post_json(
    app: Router,
    uri: &str,
    body: serde_json::Value,
) -> axum::response::Response {
    send_json(app, Method::POST, uri, body).await
}

/// POST with an empty body.
pub async fn post_empty(app: Router, uri: &str) -> axum::response::Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// GET from the given URI.
pub async fn get(app: Router, uri: &str) -> axum::response::Response {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    app.oneshot(request).await.unwrap()
}

/// Build a multipart request body with a single `file` field.
pub fn multipart_upload(uri: &str, file_name: &str, data: &[u8]) -> Request<Body> {
    let boundary = "gwtestboundary1234";
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap()
}
