//! Durable on-disk journal for events that could not be written to the
//! database.
//!
//! One JSON object per line, append-only. The journal is a last-resort sink:
//! a write here means the database was unavailable after retries, and the
//! operator is expected to replay the file once the store recovers.

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

use crate::models::event::NewCrossingEvent;

/// Append-only JSONL journal.
#[derive(Debug, Clone)]
pub struct EventJournal {
    path: PathBuf,
}

impl EventJournal {
    /// Journal at `<dir>/events.journal`.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join("events.journal"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event as a JSON line, creating the file (and parent
    /// directory) on first use.
    pub async fn append(&self, event: &NewCrossingEvent) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut line = serde_json::to_vec(event).map_err(std::io::Error::other)?;
        line.push(b'\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await
    }
}
