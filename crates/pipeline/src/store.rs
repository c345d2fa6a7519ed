//! The shared write endpoint for crossing events and completions.
//!
//! Workers treat this as a write-only capability. Failed event inserts are
//! retried with exponential backoff; once the retry budget is exhausted the
//! event goes to the on-disk journal and the job continues. Counts are kept
//! either way: the journal preserves durability, so increments are never
//! rolled back.

use std::path::Path;
use std::time::Duration;

use gatewatch_core::counting::CrossingEvent;
use gatewatch_db::journal::EventJournal;
use gatewatch_db::models::completion::NewCompletion;
use gatewatch_db::models::event::NewCrossingEvent;
use gatewatch_db::repositories::{CompletionRepo, EventRepo};
use gatewatch_db::DbPool;

use crate::error::PipelineError;

/// Insert attempts per event before falling back to the journal.
const STORE_ATTEMPTS: u32 = 3;
/// First retry delay; doubles per attempt.
const STORE_RETRY_BASE: Duration = Duration::from_millis(50);

/// Identifier of the single configured counting line in persisted rows.
const LINE_ID: &str = "entry_line";

/// Serialized writer over the event store plus the journal fallback.
#[derive(Debug, Clone)]
pub struct EventWriter {
    pool: DbPool,
    journal: EventJournal,
}

impl EventWriter {
    pub fn new(pool: DbPool, journal_dir: impl AsRef<Path>) -> Self {
        Self {
            pool,
            journal: EventJournal::new(journal_dir),
        }
    }

    /// Persist one crossing event.
    ///
    /// Errors only when the database AND the journal both fail; callers log
    /// that and keep the job running.
    pub async fn record_event(
        &self,
        event: &CrossingEvent,
        notes: Option<String>,
    ) -> Result<(), PipelineError> {
        let row = NewCrossingEvent::from_crossing(event, LINE_ID, notes);

        let mut delay = STORE_RETRY_BASE;
        for attempt in 1..=STORE_ATTEMPTS {
            match EventRepo::insert(&self.pool, &row).await {
                Ok(_) => return Ok(()),
                Err(e) if attempt < STORE_ATTEMPTS => {
                    tracing::warn!(
                        camera_id = %row.camera_id,
                        attempt,
                        error = %e,
                        "Event insert failed, retrying",
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(e) => {
                    tracing::warn!(
                        camera_id = %row.camera_id,
                        error = %e,
                        journal = %self.journal.path().display(),
                        "Event store unavailable after {STORE_ATTEMPTS} attempts, journaling event",
                    );
                    return self
                        .journal
                        .append(&row)
                        .await
                        .map_err(|je| PipelineError::Store(format!("journal write failed: {je}")));
                }
            }
        }
        Ok(())
    }

    /// Persist a completion record (best effort, single attempt).
    pub async fn record_completion(&self, completion: &NewCompletion) -> Result<(), PipelineError> {
        CompletionRepo::insert(&self.pool, completion)
            .await
            .map(|_| ())
            .map_err(|e| PipelineError::Store(e.to_string()))
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}
