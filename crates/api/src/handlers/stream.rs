//! The MJPEG streaming handler: a thin adapter between a job's
//! [`FrameBroadcaster`] and the HTTP multipart wire protocol.
//!
//! Each part is framed exactly as
//!
//! ```text
//! --<boundary>\r\n
//! Content-Type: image/jpeg\r\n
//! Content-Length: <len>\r\n
//! \r\n
//! <jpeg bytes>\r\n
//! ```
//!
//! No terminating boundary is written on stream end; clients observe the
//! connection closing. The boundary is generated per response.
//!
//! [`FrameBroadcaster`]: gatewatch_pipeline::FrameBroadcaster

use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use gatewatch_pipeline::NextFrame;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// GET /stream/{id}
///
/// Live MJPEG of the job's annotated frames. A subscriber joining during a
/// terminal phase receives zero parts and a clean end of body. Unknown or
/// expired job ids get a 404 with no body.
pub async fn stream_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<Response> {
    let mut subscription = state.manager.broadcaster(&job_id)?.subscribe();
    let boundary = format!("gw{}", uuid::Uuid::new_v4().simple());
    let content_type = format!("multipart/x-mixed-replace; boundary={boundary}");
    tracing::info!(job_id = %job_id, "MJPEG subscriber connected");

    let stream = async_stream::stream! {
        // Dropping this stream (client disconnect) drops the subscription,
        // which is the unsubscribe.
        let cancel = CancellationToken::new();
        loop {
            match subscription.next(&cancel).await {
                NextFrame::Frame(frame) => {
                    let part_head = format!(
                        "--{boundary}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
                        frame.bytes.len()
                    );
                    let mut part = Vec::with_capacity(part_head.len() + frame.bytes.len() + 2);
                    part.extend_from_slice(part_head.as_bytes());
                    part.extend_from_slice(&frame.bytes);
                    part.extend_from_slice(b"\r\n");
                    yield Ok::<Bytes, std::convert::Infallible>(Bytes::from(part));
                }
                NextFrame::Ended | NextFrame::Canceled => {
                    tracing::debug!(job_id = %job_id, "MJPEG stream ended");
                    break;
                }
            }
        }
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(stream))
        .map_err(|e| AppError::InternalError(e.to_string()))
}
