//! Job phases and race-free status snapshots.

use std::time::Instant;

use parking_lot::RwLock;
use serde::Serialize;

/// Lifecycle phase of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobPhase {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Stopped,
}

impl JobPhase {
    /// Terminal phases admit no further state change.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobPhase::Completed | JobPhase::Failed | JobPhase::Stopped)
    }
}

/// Source metadata, filled in once the source is opened.
#[derive(Debug, Clone, Serialize)]
pub struct StreamProperties {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Known for files, `None` for live streams.
    pub total_frames: Option<u64>,
}

/// Mutable job state, read by pollers as a coherent snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub phase: JobPhase,
    /// `0.0..=1.0` for file jobs; undefined (absent) for RTSP.
    pub progress: Option<f64>,
    pub frames_in: u64,
    pub frames_out: u64,
    pub entry_count: u64,
    pub exit_count: u64,
    pub net_count: i64,
    /// Exponentially weighted moving average of the processing rate.
    pub fps_measured: f64,
    pub uptime_s: f64,
    pub error: Option<String>,
    pub stream_properties: Option<StreamProperties>,
    pub last_frame_index: Option<u64>,
    /// When the job reached a terminal phase. Drives registry retention;
    /// not part of the wire contract.
    #[serde(skip)]
    pub terminal_since: Option<Instant>,
}

impl JobStatus {
    fn new() -> Self {
        Self {
            phase: JobPhase::Pending,
            progress: None,
            frames_in: 0,
            frames_out: 0,
            entry_count: 0,
            exit_count: 0,
            net_count: 0,
            fps_measured: 0.0,
            uptime_s: 0.0,
            error: None,
            stream_properties: None,
            last_frame_index: None,
            terminal_since: None,
        }
    }
}

/// Owner-writes, anyone-reads cell around a [`JobStatus`].
///
/// The worker is the only writer; readers always get a self-consistent copy
/// (no torn `entry_count` vs `exit_count`). Terminal phases are sticky.
#[derive(Debug)]
pub struct StatusCell {
    inner: RwLock<JobStatus>,
}

impl StatusCell {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(JobStatus::new()),
        }
    }

    /// Coherent copy of the current status.
    pub fn snapshot(&self) -> JobStatus {
        self.inner.read().clone()
    }

    pub fn phase(&self) -> JobPhase {
        self.inner.read().phase
    }

    /// Apply a mutation under the write lock.
    ///
    /// Ignored once the job is terminal: counts and frames freeze at the
    /// terminal transition.
    pub fn update(&self, f: impl FnOnce(&mut JobStatus)) {
        let mut status = self.inner.write();
        if status.phase.is_terminal() {
            return;
        }
        f(&mut status);
    }

    /// Move to a terminal phase exactly once; later calls are no-ops.
    pub fn set_terminal(&self, phase: JobPhase, error: Option<String>) {
        debug_assert!(phase.is_terminal());
        let mut status = self.inner.write();
        if status.phase.is_terminal() {
            return;
        }
        status.phase = phase;
        status.error = error;
        status.terminal_since = Some(Instant::now());
    }
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new()
    }
}
