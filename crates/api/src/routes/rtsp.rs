//! Route definitions for RTSP utilities.

use axum::routing::post;
use axum::Router;

use crate::handlers::rtsp;
use crate::state::AppState;

/// Routes mounted at `/rtsp`.
pub fn router() -> Router<AppState> {
    Router::new().route("/test", post(rtsp::test_rtsp))
}
