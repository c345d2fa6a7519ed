//! Route definitions for the `/jobs` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;

/// Routes mounted at `/jobs`.
///
/// ```text
/// GET    /                -> list_jobs
/// POST   /video           -> submit_video
/// POST   /rtsp            -> submit_rtsp
/// GET    /{id}            -> get_status
/// POST   /{id}/pause      -> pause_job
/// POST   /{id}/resume     -> resume_job
/// POST   /{id}/stop       -> stop_job
/// POST   /{id}/seek       -> seek_job
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(jobs::list_jobs))
        .route("/video", post(jobs::submit_video))
        .route("/rtsp", post(jobs::submit_rtsp))
        .route("/{id}", get(jobs::get_status))
        .route("/{id}/pause", post(jobs::pause_job))
        .route("/{id}/resume", post(jobs::resume_job))
        .route("/{id}/stop", post(jobs::stop_job))
        .route("/{id}/seek", post(jobs::seek_job))
}
