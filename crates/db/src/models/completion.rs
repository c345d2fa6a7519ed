//! Completion records: one row per finished image, video, or stream job.

use gatewatch_core::types::Timestamp;
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `completions` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CompletionRow {
    pub id: i64,
    /// `image`, `video`, or `stream`.
    pub file_type: String,
    pub file_name: String,
    pub object_count: i64,
    pub entry_count: i64,
    pub exit_count: i64,
    pub net_count: i64,
    pub created_at: Timestamp,
}

/// Insert payload for `completions`.
#[derive(Debug, Clone)]
pub struct NewCompletion {
    pub file_type: String,
    pub file_name: String,
    pub object_count: i64,
    pub entry_count: i64,
    pub exit_count: i64,
    pub net_count: i64,
}
