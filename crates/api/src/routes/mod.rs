pub mod detect;
pub mod events;
pub mod health;
pub mod jobs;
pub mod rtsp;
pub mod stream;

use axum::Router;

use crate::state::AppState;

/// Build the REST route tree.
///
/// ```text
/// /jobs                 list active + recently terminated jobs
/// /jobs/video           submit an uploaded video job (multipart)
/// /jobs/rtsp            submit a continuous RTSP job
/// /jobs/{id}            status snapshot
/// /jobs/{id}/pause      control
/// /jobs/{id}/resume     control
/// /jobs/{id}/stop       control
/// /jobs/{id}/seek       control (file jobs only)
/// /stream/{id}          live MJPEG of annotated frames
/// /rtsp/test            pre-flight RTSP probe
/// /detect/image         one-shot still image detection
/// /events               persisted crossing events
/// /events/summary       per-camera totals
/// /history              completion records
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/jobs", jobs::router())
        .nest("/stream", stream::router())
        .nest("/rtsp", rtsp::router())
        .nest("/detect", detect::router())
        .merge(events::router())
}
