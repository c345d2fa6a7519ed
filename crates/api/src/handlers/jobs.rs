//! Handlers for the `/jobs` resource: submission, status, and control.

use std::path::{Path as FsPath, PathBuf};

use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use gatewatch_pipeline::{JobDescriptor, JobKind, JobStatus};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Upload extensions accepted for video jobs.
const ALLOWED_VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "avi", "mov", "mkv"];

// ---------------------------------------------------------------------------
// Request / response types (field names are part of the contract)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SubmitVideoParams {
    pub count_enabled: Option<bool>,
    pub camera_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitVideoResponse {
    pub job_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmitRtspRequest {
    pub camera_id: String,
    pub rtsp_url: String,
    pub camera_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitRtspResponse {
    pub job_id: String,
    pub stream_url: String,
}

#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: String,
    pub kind: JobKind,
    pub camera_id: String,
    #[serde(flatten)]
    pub status: JobStatus,
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub ok: bool,
    #[serde(flatten)]
    pub status: JobStatus,
}

#[derive(Debug, Deserialize)]
pub struct SeekRequest {
    pub delta_frames: i64,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Pull the `file` field out of a multipart upload and persist it under
/// `uploads/`, enforcing the allowed extension set.
async fn save_upload(
    state: &AppState,
    multipart: &mut Multipart,
    allowed: &[&str],
) -> AppResult<PathBuf> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let extension = FsPath::new(&file_name)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if !allowed.contains(&extension.as_str()) {
            return Err(AppError::BadRequest(format!(
                "unsupported media type '{file_name}', expected one of {allowed:?}"
            )));
        }

        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("upload read failed: {e}")))?;
        if data.is_empty() {
            return Err(AppError::BadRequest("uploaded file is empty".into()));
        }

        let dir = state.config.pipeline.media_dir.join("uploads");
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| AppError::InternalError(e.to_string()))?;
        let stored = dir.join(format!("{}.{extension}", uuid::Uuid::new_v4()));
        tokio::fs::write(&stored, &data)
            .await
            .map_err(|e| AppError::InternalError(e.to_string()))?;
        return Ok(stored);
    }
    Err(AppError::BadRequest("missing 'file' field".into()))
}

fn status_response(state: &AppState, job_id: &str) -> AppResult<JobStatusResponse> {
    let descriptor = state.manager.descriptor(job_id)?;
    let status = state.manager.status(job_id)?;
    Ok(JobStatusResponse {
        job_id: descriptor.job_id,
        kind: descriptor.kind,
        camera_id: descriptor.camera_id,
        status,
    })
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

/// POST /jobs/video
///
/// Submit an uploaded video for background processing. Returns 202 with the
/// job id; progress and the live preview are available immediately.
pub async fn submit_video(
    State(state): State<AppState>,
    Query(params): Query<SubmitVideoParams>,
    mut multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let stored = save_upload(&state, &mut multipart, &ALLOWED_VIDEO_EXTENSIONS).await?;

    let camera_id = params.camera_id.unwrap_or_else(|| "upload".to_string());
    let mut descriptor = JobDescriptor::file_video(
        stored.to_string_lossy(),
        camera_id,
        params.count_enabled.unwrap_or(true),
        state.config.pipeline.entry_line,
        None,
    );
    descriptor.output_path = Some(
        state
            .config
            .pipeline
            .media_dir
            .join("outputs")
            .join("videos")
            .join(format!("{}.mp4", descriptor.job_id)),
    );

    let job_id = state.manager.submit(descriptor)?;
    tracing::info!(job_id = %job_id, "Video job submitted");

    Ok((StatusCode::ACCEPTED, Json(SubmitVideoResponse { job_id })))
}

/// POST /jobs/rtsp
///
/// Submit a continuous RTSP stream. Returns 202 with the job id and the
/// MJPEG preview URL.
pub async fn submit_rtsp(
    State(state): State<AppState>,
    Json(req): Json<SubmitRtspRequest>,
) -> AppResult<impl IntoResponse> {
    let descriptor = JobDescriptor::rtsp_stream(
        req.rtsp_url,
        req.camera_id,
        state.config.pipeline.entry_line,
    );
    let job_id = state.manager.submit(descriptor)?;
    tracing::info!(
        job_id = %job_id,
        camera_name = req.camera_name.as_deref().unwrap_or(""),
        "RTSP job submitted",
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitRtspResponse {
            stream_url: format!("/stream/{job_id}"),
            job_id,
        }),
    ))
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// GET /jobs -- all active and recently terminated jobs.
pub async fn list_jobs(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    Ok(Json(state.manager.list()))
}

/// GET /jobs/{id} -- coherent status snapshot. 404 for unknown or expired
/// ids.
pub async fn get_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(status_response(&state, &job_id)?))
}

// ---------------------------------------------------------------------------
// Control
// ---------------------------------------------------------------------------

/// POST /jobs/{id}/pause
pub async fn pause_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    state.manager.pause(&job_id)?;
    Ok(Json(OkResponse { ok: true }))
}

/// POST /jobs/{id}/resume
pub async fn resume_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    state.manager.resume(&job_id)?;
    Ok(Json(OkResponse { ok: true }))
}

/// POST /jobs/{id}/stop
///
/// Returns immediately; termination is observable via status polling or
/// the stream ending.
pub async fn stop_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let status = state.manager.stop(&job_id)?;
    Ok(Json(StopResponse { ok: true, status }))
}

/// POST /jobs/{id}/seek
///
/// Enqueue a relative seek; takes effect on the worker's next iteration.
pub async fn seek_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(req): Json<SeekRequest>,
) -> AppResult<impl IntoResponse> {
    state.manager.seek(&job_id, req.delta_frames)?;
    Ok(Json(OkResponse { ok: true }))
}
