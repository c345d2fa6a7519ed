//! Crossing-event rows and insert payloads.

use gatewatch_core::counting::CrossingEvent;
use gatewatch_core::types::Timestamp;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `crossing_events` table. Column names are part of the
/// external contract.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CrossingEventRow {
    pub id: i64,
    /// `entry` or `exit`.
    pub event_type: String,
    pub camera_id: String,
    pub track_id: i64,
    pub confidence: f64,
    pub timestamp: Timestamp,
    pub frame_index: i64,
    /// JSON array of four ints: `[x1, y1, x2, y2]`.
    pub bbox: String,
    pub line_id: String,
    pub notes: Option<String>,
}

/// Insert payload for `crossing_events`.
///
/// Also the journal line format: when the database is unavailable the same
/// payload is appended to the on-disk journal as one JSON object per line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCrossingEvent {
    pub event_type: String,
    pub camera_id: String,
    pub track_id: i64,
    pub confidence: f64,
    pub timestamp: Timestamp,
    pub frame_index: i64,
    pub bbox: String,
    pub line_id: String,
    pub notes: Option<String>,
}

impl NewCrossingEvent {
    /// Build an insert payload from a counted crossing.
    pub fn from_crossing(
        ev: &CrossingEvent,
        line_id: impl Into<String>,
        notes: Option<String>,
    ) -> Self {
        Self {
            event_type: ev.direction.as_str().to_string(),
            camera_id: ev.camera_id.clone(),
            track_id: ev.track_id as i64,
            confidence: ev.confidence as f64,
            timestamp: ev.timestamp,
            frame_index: ev.frame_index as i64,
            bbox: serde_json::to_string(&ev.bbox.to_array()).unwrap_or_else(|_| "[]".into()),
            line_id: line_id.into(),
            notes,
        }
    }
}

/// Filters for reading back events.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventQuery {
    pub camera_id: Option<String>,
    pub event_type: Option<String>,
    pub limit: Option<i64>,
}

/// Per-camera entry/exit totals from the raw event stream.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CameraSummary {
    pub camera_id: String,
    pub entry_count: i64,
    pub exit_count: i64,
    pub net_count: i64,
}
