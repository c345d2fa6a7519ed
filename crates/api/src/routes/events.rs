//! Route definitions for the persisted event stream.

use axum::routing::get;
use axum::Router;

use crate::handlers::events;
use crate::state::AppState;

/// Event and history routes (mounted at the root).
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/events", get(events::list_events))
        .route("/events/summary", get(events::events_summary))
        .route("/history", get(events::list_history))
}
