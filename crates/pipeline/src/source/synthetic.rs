//! In-memory frame fabrication.
//!
//! Produces black rgb24 frames at a fixed size, either a bounded run (file
//! jobs) or endless (stream jobs). Paired with a scripted detector this
//! exercises the whole pipeline without ffmpeg, a camera, or a model.

use gatewatch_core::Frame;

use crate::error::PipelineError;
use crate::status::StreamProperties;

/// Shape of the fabricated stream.
#[derive(Debug, Clone)]
pub struct SyntheticSpec {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Frame count for bounded (file-like) runs.
    pub total_frames: u64,
}

impl Default for SyntheticSpec {
    fn default() -> Self {
        Self {
            width: 100,
            height: 100,
            fps: 30.0,
            total_frames: 100,
        }
    }
}

pub struct SyntheticSource {
    props: StreamProperties,
    endless: bool,
    next_index: u64,
}

impl SyntheticSource {
    pub fn new(spec: SyntheticSpec, endless: bool) -> Self {
        Self {
            props: StreamProperties {
                width: spec.width,
                height: spec.height,
                fps: spec.fps,
                total_frames: (!endless).then_some(spec.total_frames),
            },
            endless,
            next_index: 0,
        }
    }

    pub fn properties(&self) -> &StreamProperties {
        &self.props
    }

    pub async fn read_frame(&mut self) -> Result<Option<Frame>, PipelineError> {
        if !self.endless {
            let total = self.props.total_frames.unwrap_or(0);
            if self.next_index >= total {
                return Ok(None);
            }
        }
        let index = self.next_index;
        self.next_index += 1;
        let data = vec![0u8; self.props.width as usize * self.props.height as usize * 3];
        let frame = Frame::from_rgb24(
            index,
            self.props.width,
            self.props.height,
            data,
            chrono::Utc::now(),
        )?;
        Ok(Some(frame))
    }

    pub fn seek_by(&mut self, delta: i64) -> Result<u64, PipelineError> {
        let mut target = self.next_index as i64 + delta;
        if target < 0 {
            target = 0;
        }
        if let Some(total) = self.props.total_frames {
            target = target.min(total.saturating_sub(1) as i64);
        }
        self.next_index = target as u64;
        Ok(self.next_index)
    }

    pub fn resume_from(&mut self, index: u64) {
        self.next_index = index;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bounded_source_ends() {
        let mut src = SyntheticSource::new(
            SyntheticSpec {
                total_frames: 3,
                ..Default::default()
            },
            false,
        );
        for expected in 0..3 {
            let frame = src.read_frame().await.unwrap().unwrap();
            assert_eq!(frame.index, expected);
        }
        assert!(src.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn endless_source_keeps_going() {
        let mut src = SyntheticSource::new(
            SyntheticSpec {
                total_frames: 1,
                ..Default::default()
            },
            true,
        );
        for _ in 0..10 {
            assert!(src.read_frame().await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn seek_clamps_to_bounds() {
        let mut src = SyntheticSource::new(
            SyntheticSpec {
                total_frames: 10,
                ..Default::default()
            },
            false,
        );
        assert_eq!(src.seek_by(-5).unwrap(), 0);
        assert_eq!(src.seek_by(100).unwrap(), 9);
    }
}
