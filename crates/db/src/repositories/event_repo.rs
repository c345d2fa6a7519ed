//! Repository for the `crossing_events` table (append-only event stream).

use crate::models::event::{CameraSummary, CrossingEventRow, EventQuery, NewCrossingEvent};
use crate::DbPool;

/// Column list for `crossing_events` SELECT queries.
const COLUMNS: &str = "\
    id, event_type, camera_id, track_id, confidence, \
    timestamp, frame_index, bbox, line_id, notes";

/// Provides query operations for crossing events.
pub struct EventRepo;

impl EventRepo {
    /// Insert a single crossing event. Returns the new row id.
    pub async fn insert(pool: &DbPool, event: &NewCrossingEvent) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO crossing_events \
             (event_type, camera_id, track_id, confidence, timestamp, \
              frame_index, bbox, line_id, notes) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.event_type)
        .bind(&event.camera_id)
        .bind(event.track_id)
        .bind(event.confidence)
        .bind(event.timestamp)
        .bind(event.frame_index)
        .bind(&event.bbox)
        .bind(&event.line_id)
        .bind(&event.notes)
        .execute(pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// List events, newest first, with optional camera/type filters.
    pub async fn list(
        pool: &DbPool,
        query: &EventQuery,
    ) -> Result<Vec<CrossingEventRow>, sqlx::Error> {
        let mut sql = format!("SELECT {COLUMNS} FROM crossing_events");
        let mut clauses = Vec::new();
        if query.camera_id.is_some() {
            clauses.push("camera_id = ?");
        }
        if query.event_type.is_some() {
            clauses.push("event_type = ?");
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY timestamp DESC, id DESC LIMIT ?");

        let mut q = sqlx::query_as::<_, CrossingEventRow>(&sql);
        if let Some(camera_id) = &query.camera_id {
            q = q.bind(camera_id);
        }
        if let Some(event_type) = &query.event_type {
            q = q.bind(event_type);
        }
        q.bind(query.limit.unwrap_or(100).clamp(1, 1000))
            .fetch_all(pool)
            .await
    }

    /// Count events by direction for one camera.
    pub async fn count_for_camera(
        pool: &DbPool,
        camera_id: &str,
    ) -> Result<(i64, i64), sqlx::Error> {
        let entries: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM crossing_events \
             WHERE camera_id = ? AND event_type = 'entry'",
        )
        .bind(camera_id)
        .fetch_one(pool)
        .await?;

        let exits: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM crossing_events \
             WHERE camera_id = ? AND event_type = 'exit'",
        )
        .bind(camera_id)
        .fetch_one(pool)
        .await?;

        Ok((entries, exits))
    }

    /// Per-camera entry/exit totals across the whole event stream.
    pub async fn summary(pool: &DbPool) -> Result<Vec<CameraSummary>, sqlx::Error> {
        sqlx::query_as::<_, CameraSummary>(
            "SELECT camera_id, \
                    SUM(CASE WHEN event_type = 'entry' THEN 1 ELSE 0 END) AS entry_count, \
                    SUM(CASE WHEN event_type = 'exit' THEN 1 ELSE 0 END) AS exit_count, \
                    SUM(CASE WHEN event_type = 'entry' THEN 1 ELSE -1 END) AS net_count \
             FROM crossing_events \
             GROUP BY camera_id \
             ORDER BY camera_id",
        )
        .fetch_all(pool)
        .await
    }
}
