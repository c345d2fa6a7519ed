//! Route definitions for live MJPEG streaming.

use axum::routing::get;
use axum::Router;

use crate::handlers::stream;
use crate::state::AppState;

/// Routes mounted at `/stream`.
pub fn router() -> Router<AppState> {
    Router::new().route("/{id}", get(stream::stream_job))
}
