//! Pipeline tuning knobs, shared by every job.

use std::path::PathBuf;
use std::time::Duration;

use gatewatch_core::counting::{LineConfig, ReversalPolicy};
use gatewatch_core::tracker::TrackerConfig;

/// Process-wide pipeline configuration.
///
/// The API crate populates this from environment variables; tests construct
/// it directly. Defaults are suitable for local development.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum simultaneously active (non-terminal) jobs.
    pub max_concurrent_jobs: usize,
    /// RTSP read-failure reconnect attempts before the job fails.
    pub rtsp_reconnect_attempts: u32,
    /// Fixed delay between reconnect attempts.
    pub rtsp_reconnect_delay: Duration,
    /// Default frame-rate cap for RTSP jobs that do not set their own.
    /// Zero disables pacing.
    pub rtsp_fps_cap: f64,
    /// JPEG quality for broadcast frames, 1..=100.
    pub jpeg_quality: u8,
    /// Minimum IoU for detection/track association.
    pub track_iou_min: f64,
    /// Consecutive missed frames before a track is destroyed.
    pub track_miss_max: u32,
    /// Per-track centroid history bound.
    pub track_history_len: usize,
    /// Dead band around the counting line, in pixels.
    pub crossing_threshold_px: f64,
    /// Confidence floor for detections entering the tracker.
    pub min_det_conf: f32,
    /// Restrict counting/tracking to one detector class, if set.
    pub target_class_id: Option<u32>,
    /// Whether a track may be counted in both directions.
    pub reversal_policy: ReversalPolicy,
    /// Default counting line for jobs submitted without one.
    pub entry_line: LineConfig,
    /// How long terminated jobs stay visible in the registry.
    pub job_retention: Duration,
    /// Per-job control queue capacity.
    pub control_queue_cap: usize,
    /// Grace period before a worker that ignored STOP is force-cancelled.
    pub stop_grace: Duration,
    /// Shutdown drain budget before remaining workers are force-closed.
    pub drain_timeout: Duration,
    /// Root directory for uploads, processed outputs, and the event journal.
    pub media_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
            rtsp_reconnect_attempts: 3,
            rtsp_reconnect_delay: Duration::from_secs(5),
            rtsp_fps_cap: 15.0,
            jpeg_quality: 85,
            track_iou_min: 0.3,
            track_miss_max: 30,
            track_history_len: 30,
            crossing_threshold_px: 5.0,
            min_det_conf: 0.3,
            target_class_id: None,
            reversal_policy: ReversalPolicy::FirstOnly,
            // Vertical line through the middle of the frame.
            entry_line: LineConfig {
                x1_pct: 50.0,
                y1_pct: 0.0,
                x2_pct: 50.0,
                y2_pct: 100.0,
            },
            job_retention: Duration::from_secs(30 * 60),
            control_queue_cap: 8,
            stop_grace: Duration::from_secs(10),
            drain_timeout: Duration::from_secs(15),
            media_dir: PathBuf::from("media"),
        }
    }
}

impl PipelineConfig {
    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            iou_min: self.track_iou_min,
            miss_max: self.track_miss_max,
            history_len: self.track_history_len,
            min_confidence: self.min_det_conf,
        }
    }
}
