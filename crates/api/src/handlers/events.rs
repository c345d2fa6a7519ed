//! Read side of the persisted event stream.

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use gatewatch_db::models::event::EventQuery;
use gatewatch_db::repositories::{CompletionRepo, EventRepo};
use serde::Deserialize;

use crate::error::AppResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<i64>,
}

/// GET /events -- persisted crossing events, newest first.
///
/// Optional filters: `camera_id`, `event_type`, `limit`.
pub async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<EventQuery>,
) -> AppResult<impl IntoResponse> {
    let rows = EventRepo::list(&state.pool, &query).await?;
    Ok(Json(rows))
}

/// GET /events/summary -- per-camera entry/exit totals from the raw event
/// stream.
pub async fn events_summary(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let summary = EventRepo::summary(&state.pool).await?;
    Ok(Json(summary))
}

/// GET /history -- completion records, newest first.
pub async fn list_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> AppResult<impl IntoResponse> {
    let rows = CompletionRepo::list(&state.pool, params.limit.unwrap_or(100)).await?;
    Ok(Json(rows))
}
