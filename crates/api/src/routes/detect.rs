//! Route definitions for one-shot detection.

use axum::routing::post;
use axum::Router;

use crate::handlers::detect;
use crate::state::AppState;

/// Routes mounted at `/detect`.
pub fn router() -> Router<AppState> {
    Router::new().route("/image", post(detect::detect_image))
}
