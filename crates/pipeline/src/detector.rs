//! Detector backends.
//!
//! The pipeline only depends on the [`Detector`] trait; concrete backends
//! plug in at process wiring time. The ONNX Runtime backend lives behind
//! the `onnx` cargo feature; the scripted backend replays predefined
//! detections and drives tests and demos.

use gatewatch_core::{Detection, Detector, DetectorError, Frame};
use parking_lot::Mutex;

#[cfg(feature = "onnx")]
pub mod onnx;
#[cfg(feature = "onnx")]
pub use onnx::OnnxDetector;

/// Replays a predefined detection sequence keyed by frame index.
///
/// Frames beyond the script produce no detections.
#[derive(Debug, Default)]
pub struct ScriptedDetector {
    frames: Vec<Vec<Detection>>,
}

impl ScriptedDetector {
    pub fn new(frames: Vec<Vec<Detection>>) -> Self {
        Self { frames }
    }

    /// Script a single box moving through the listed centers, one frame per
    /// center, with a fixed box half-size.
    pub fn moving_box(centers: &[(i32, i32)], half: i32, confidence: f32, class_id: u32) -> Self {
        let frames = centers
            .iter()
            .map(|&(cx, cy)| {
                let bbox = gatewatch_core::BBox {
                    x1: cx - half,
                    y1: cy - half,
                    x2: cx + half,
                    y2: cy + half,
                };
                vec![Detection {
                    bbox,
                    confidence,
                    class_id,
                }]
            })
            .collect();
        Self { frames }
    }
}

impl Detector for ScriptedDetector {
    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, DetectorError> {
        Ok(self
            .frames
            .get(frame.index as usize)
            .cloned()
            .unwrap_or_default())
    }
}

/// Serializes calls into a non-reentrant backend.
///
/// One inference in flight at a time across all jobs; wrap a backend in
/// this when its runtime is not safe for concurrent calls. This is a
/// documented throughput constraint, not a correctness knob.
pub struct SerialDetector {
    inner: Box<dyn Detector>,
    gate: Mutex<()>,
}

impl SerialDetector {
    pub fn new(inner: Box<dyn Detector>) -> Self {
        Self {
            inner,
            gate: Mutex::new(()),
        }
    }
}

impl Detector for SerialDetector {
    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, DetectorError> {
        let _guard = self.gate.lock();
        self.inner.detect(frame)
    }
}
