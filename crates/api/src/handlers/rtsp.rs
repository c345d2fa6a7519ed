//! Pre-flight RTSP probing.

use axum::extract::State;
use axum::Json;
use gatewatch_pipeline::source::probe_source;
use serde::{Deserialize, Serialize};

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RtspTestRequest {
    pub rtsp_url: String,
}

#[derive(Debug, Serialize)]
pub struct RtspTestResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// POST /rtsp/test
///
/// Probe an RTSP URL before committing to a job. Always 200; the body says
/// whether the stream is usable.
pub async fn test_rtsp(
    State(_state): State<AppState>,
    Json(req): Json<RtspTestRequest>,
) -> Json<RtspTestResponse> {
    match probe_source(&req.rtsp_url, true).await {
        Ok(props) => Json(RtspTestResponse {
            ok: true,
            width: Some(props.width),
            height: Some(props.height),
            fps: Some(props.fps),
            reason: None,
        }),
        Err(e) => {
            tracing::warn!(rtsp_url = %req.rtsp_url, error = %e, "RTSP probe failed");
            Json(RtspTestResponse {
                ok: false,
                width: None,
                height: None,
                fps: None,
                reason: Some(e.to_string()),
            })
        }
    }
}
