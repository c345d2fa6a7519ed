//! The object-detector capability.
//!
//! The detector itself is an external collaborator: anything that can map a
//! frame to a set of scored boxes can drive the pipeline. Implementations
//! live next to the code that owns their runtime (the pipeline crate ships
//! an ONNX Runtime backend and a scripted one for tests and demos).

use crate::error::CoreError;
use crate::frame::Frame;
use crate::geometry::BBox;

/// A single detection in one frame: box, confidence, class.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: BBox,
    pub confidence: f32,
    pub class_id: u32,
}

impl Detection {
    pub fn new(bbox: BBox, confidence: f32, class_id: u32) -> Result<Self, CoreError> {
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(CoreError::Validation(format!(
                "confidence {confidence} outside [0, 1]"
            )));
        }
        Ok(Self {
            bbox,
            confidence,
            class_id,
        })
    }

    /// Validate an already-constructed detection (inputs from external
    /// detector backends are not trusted).
    pub fn validate(&self) -> Result<(), CoreError> {
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(CoreError::Validation(format!(
                "confidence {} outside [0, 1]",
                self.confidence
            )));
        }
        if self.bbox.x1 >= self.bbox.x2 || self.bbox.y1 >= self.bbox.y2 {
            return Err(CoreError::Validation(format!(
                "degenerate bounding box {:?}",
                self.bbox
            )));
        }
        Ok(())
    }
}

/// Error raised by a detector backend.
#[derive(Debug, thiserror::Error)]
#[error("detector failure: {0}")]
pub struct DetectorError(pub String);

/// Opaque inference capability: frame in, scored boxes out.
///
/// Implementations must be shareable across jobs. A backend that is not
/// reentrant should be wrapped so calls are serialized before it is handed
/// to the pipeline.
pub trait Detector: Send + Sync {
    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, DetectorError>;
}
