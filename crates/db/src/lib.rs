//! Gatewatch event store.
//!
//! Crossing events and job completions are persisted to an embedded SQLite
//! database through `sqlx`. The schema is created on startup; there is no
//! separate migration step.

use sqlx::sqlite::SqlitePoolOptions;

pub mod journal;
pub mod models;
pub mod repositories;

pub type DbPool = sqlx::SqlitePool;

/// Create a connection pool from a database URL
/// (e.g. `sqlite://gatewatch.db?mode=rwc` or `sqlite::memory:`).
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
}

/// Verify the database answers queries.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await.map(|_| ())
}

/// Create tables and indexes if they do not exist yet.
pub async fn init_schema(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS crossing_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_type TEXT NOT NULL,
            camera_id TEXT NOT NULL,
            track_id INTEGER NOT NULL,
            confidence REAL NOT NULL,
            timestamp TEXT NOT NULL,
            frame_index INTEGER NOT NULL,
            bbox TEXT NOT NULL,
            line_id TEXT NOT NULL,
            notes TEXT
        )",
    )
    .execute(pool)
    .await?;

    for index in [
        "CREATE INDEX IF NOT EXISTS idx_crossing_events_timestamp \
         ON crossing_events (timestamp)",
        "CREATE INDEX IF NOT EXISTS idx_crossing_events_event_type \
         ON crossing_events (event_type)",
        "CREATE INDEX IF NOT EXISTS idx_crossing_events_camera_id \
         ON crossing_events (camera_id)",
    ] {
        sqlx::query(index).execute(pool).await?;
    }

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS completions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            file_type TEXT NOT NULL,
            file_name TEXT NOT NULL,
            object_count INTEGER NOT NULL,
            entry_count INTEGER NOT NULL,
            exit_count INTEGER NOT NULL,
            net_count INTEGER NOT NULL,
            created_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
pub(crate) async fn test_pool() -> DbPool {
    // A single connection: each in-memory SQLite connection is its own
    // database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory pool");
    init_schema(&pool).await.expect("schema init");
    pool
}
