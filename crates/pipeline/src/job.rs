//! Job descriptors: the immutable submission-time definition of a job.

use std::path::PathBuf;

use gatewatch_core::counting::LineConfig;
use gatewatch_core::CoreError;
use serde::Serialize;

/// What kind of source a job processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    FileVideo,
    RtspStream,
}

impl JobKind {
    /// The `file_type` value used in completion records.
    pub fn file_type(&self) -> &'static str {
        match self {
            JobKind::FileVideo => "video",
            JobKind::RtspStream => "stream",
        }
    }
}

/// Immutable per-job definition. Built once at submission and never mutated.
#[derive(Debug, Clone)]
pub struct JobDescriptor {
    /// Opaque unique id, assigned at construction.
    pub job_id: String,
    pub kind: JobKind,
    /// File path (FileVideo) or RTSP URL (RtspStream).
    pub source: String,
    pub camera_id: String,
    pub count_enabled: bool,
    pub line: LineConfig,
    /// Frame-rate cap for this job; zero means "use the process default
    /// for RTSP, unpaced for files".
    pub fps_cap: f64,
    /// Where to write the annotated output video (FileVideo only).
    pub output_path: Option<PathBuf>,
}

impl JobDescriptor {
    /// Descriptor for an uploaded video file.
    pub fn file_video(
        source: impl Into<String>,
        camera_id: impl Into<String>,
        count_enabled: bool,
        line: LineConfig,
        output_path: Option<PathBuf>,
    ) -> Self {
        Self {
            job_id: uuid::Uuid::new_v4().to_string(),
            kind: JobKind::FileVideo,
            source: source.into(),
            camera_id: camera_id.into(),
            count_enabled,
            line,
            fps_cap: 0.0,
            output_path,
        }
    }

    /// Descriptor for a continuous RTSP stream.
    pub fn rtsp_stream(
        rtsp_url: impl Into<String>,
        camera_id: impl Into<String>,
        line: LineConfig,
    ) -> Self {
        Self {
            job_id: uuid::Uuid::new_v4().to_string(),
            kind: JobKind::RtspStream,
            source: rtsp_url.into(),
            camera_id: camera_id.into(),
            count_enabled: true,
            line,
            fps_cap: 0.0,
            output_path: None,
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.source.is_empty() {
            return Err(CoreError::Validation("job source must not be empty".into()));
        }
        if self.camera_id.is_empty() {
            return Err(CoreError::Validation("camera_id must not be empty".into()));
        }
        if !self.fps_cap.is_finite() || self.fps_cap < 0.0 {
            return Err(CoreError::Validation(format!(
                "fps_cap {} must be finite and non-negative",
                self.fps_cap
            )));
        }
        self.line.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line() -> LineConfig {
        LineConfig::new(50.0, 0.0, 50.0, 100.0).unwrap()
    }

    #[test]
    fn descriptors_get_unique_ids() {
        let a = JobDescriptor::rtsp_stream("rtsp://cam/1", "cam-1", line());
        let b = JobDescriptor::rtsp_stream("rtsp://cam/1", "cam-1", line());
        assert_ne!(a.job_id, b.job_id);
    }

    #[test]
    fn empty_source_is_rejected() {
        let desc = JobDescriptor::file_video("", "cam-1", true, line(), None);
        assert!(desc.validate().is_err());
    }

    #[test]
    fn nan_fps_cap_is_rejected() {
        let mut desc = JobDescriptor::rtsp_stream("rtsp://cam/1", "cam-1", line());
        desc.fps_cap = f64::NAN;
        assert!(desc.validate().is_err());
    }
}
