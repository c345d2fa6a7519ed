use gatewatch_core::{CoreError, DetectorError};

use crate::status::JobPhase;

/// Errors surfaced by the processing plane.
///
/// Each variant maps to one stable machine-readable code at the API
/// boundary; see the API crate's error module.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Unknown (or already expired) job id.
    #[error("job not found: {0}")]
    NotFound(String),

    /// An RTSP stream is already active for this camera.
    #[error("camera {0} already has an active stream")]
    AlreadyExists(String),

    /// Concurrent job cap reached.
    #[error("concurrent job limit ({0}) reached")]
    ResourceExhausted(usize),

    /// Control operation incompatible with the current phase.
    #[error("cannot {op} a job in phase {phase:?}")]
    InvalidState { op: &'static str, phase: JobPhase },

    /// Operation only meaningful for uploaded-video jobs.
    #[error("{0} is only valid for file video jobs")]
    InvalidKind(&'static str),

    /// The source could not be opened, decoded, or (for RTSP) reconnected.
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    /// The detector capability failed beyond the per-frame retry budget.
    #[error(transparent)]
    Detector(#[from] DetectorError),

    /// The event store and the fallback journal both failed.
    #[error("event store failure: {0}")]
    Store(String),

    /// Invalid domain input (line coordinates, detections, thresholds).
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
