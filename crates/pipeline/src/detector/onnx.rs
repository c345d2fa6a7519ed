//! YOLO-family detector on ONNX Runtime.
//!
//! Expects a detection model with input `images` of shape
//! `[1, 3, size, size]` and output `[1, 4 + num_classes, anchors]`
//! (YOLOv8 layout). Preprocessing letterboxes the frame to the model size;
//! postprocessing decodes, thresholds, and NMS-filters the candidates back
//! into frame pixel coordinates.

use std::path::Path;

use gatewatch_core::{BBox, Detection, Detector, DetectorError, Frame};
use image::imageops::FilterType;
use image::RgbImage;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use parking_lot::Mutex;

/// Backend configuration.
#[derive(Debug, Clone)]
pub struct OnnxConfig {
    /// Square model input size in pixels.
    pub input_size: u32,
    /// Candidate confidence floor before NMS.
    pub conf_threshold: f32,
    /// NMS IoU threshold.
    pub iou_threshold: f32,
}

impl Default for OnnxConfig {
    fn default() -> Self {
        Self {
            input_size: 640,
            conf_threshold: 0.25,
            iou_threshold: 0.45,
        }
    }
}

/// ONNX Runtime detector. `Session::run` takes `&mut self`, so the session
/// sits behind a mutex: one inference in flight at a time.
pub struct OnnxDetector {
    session: Mutex<Session>,
    cfg: OnnxConfig,
}

impl OnnxDetector {
    pub fn load(model_path: &Path, cfg: OnnxConfig) -> Result<Self, DetectorError> {
        let session = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.commit_from_file(model_path))
            .map_err(|e| DetectorError(format!("failed to load {}: {e}", model_path.display())))?;
        Ok(Self {
            session: Mutex::new(session),
            cfg,
        })
    }

    /// Letterbox the frame into a `[1, 3, size, size]` CHW buffer, returning
    /// the scale used so boxes can be mapped back.
    fn preprocess(&self, img: &RgbImage) -> (Vec<f32>, f32) {
        let size = self.cfg.input_size as usize;
        let (w, h) = img.dimensions();
        let scale = (size as f32 / w as f32).min(size as f32 / h as f32);
        let (new_w, new_h) = (
            (w as f32 * scale).round() as u32,
            (h as f32 * scale).round() as u32,
        );
        let resized = image::imageops::resize(img, new_w, new_h, FilterType::Triangle);

        let plane = size * size;
        let mut input = vec![0.5f32; 3 * plane];
        for (x, y, pixel) in resized.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            let [r, g, b] = pixel.0;
            input[y * size + x] = r as f32 / 255.0;
            input[plane + y * size + x] = g as f32 / 255.0;
            input[2 * plane + y * size + x] = b as f32 / 255.0;
        }
        (input, scale)
    }
}

impl Detector for OnnxDetector {
    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, DetectorError> {
        let img = frame.to_rgb_image();
        let (input, scale) = self.preprocess(&img);

        let mut session = self.session.lock();
        let size = self.cfg.input_size as usize;
        let tensor = Tensor::from_array(([1, 3, size, size], input))
            .map_err(|e| DetectorError(format!("input tensor: {e}")))?;
        let outputs = session
            .run(ort::inputs!["images" => tensor])
            .map_err(|e| DetectorError(format!("inference: {e}")))?;
        let output = outputs
            .iter()
            .next()
            .map(|(_, value)| value)
            .ok_or_else(|| DetectorError("model produced no outputs".into()))?;
        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError(format!("output tensor: {e}")))?;

        // [1, 4 + nc, anchors]
        if shape.len() != 3 {
            return Err(DetectorError(format!("unexpected output shape {shape:?}")));
        }
        let channels = shape[1] as usize;
        let anchors = shape[2] as usize;
        if channels < 5 {
            return Err(DetectorError(format!("unexpected output shape {shape:?}")));
        }
        let num_classes = channels - 4;
        let at = |c: usize, a: usize| data[c * anchors + a];

        let mut candidates: Vec<Detection> = Vec::new();
        for a in 0..anchors {
            let (mut best_class, mut best_score) = (0u32, 0f32);
            for c in 0..num_classes {
                let score = at(4 + c, a);
                if score > best_score {
                    best_score = score;
                    best_class = c as u32;
                }
            }
            if best_score < self.cfg.conf_threshold {
                continue;
            }

            // cx/cy/w/h in model space -> corners in frame space.
            let cx = at(0, a) / scale;
            let cy = at(1, a) / scale;
            let bw = at(2, a) / scale;
            let bh = at(3, a) / scale;
            let x1 = ((cx - bw / 2.0).round() as i32).clamp(0, frame.width as i32 - 1);
            let y1 = ((cy - bh / 2.0).round() as i32).clamp(0, frame.height as i32 - 1);
            let x2 = ((cx + bw / 2.0).round() as i32).clamp(0, frame.width as i32 - 1);
            let y2 = ((cy + bh / 2.0).round() as i32).clamp(0, frame.height as i32 - 1);
            let Ok(bbox) = BBox::new(x1, y1, x2, y2) else {
                continue;
            };
            candidates.push(Detection {
                bbox,
                confidence: best_score.min(1.0),
                class_id: best_class,
            });
        }

        Ok(non_max_suppression(candidates, self.cfg.iou_threshold as f64))
    }
}

/// Per-class NMS: keep the highest-confidence box, drop overlapping peers.
fn non_max_suppression(mut candidates: Vec<Detection>, iou_threshold: f64) -> Vec<Detection> {
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<Detection> = Vec::new();
    for candidate in candidates {
        let overlaps = kept.iter().any(|k| {
            k.class_id == candidate.class_id && k.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !overlaps {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x1: i32, conf: f32, class_id: u32) -> Detection {
        Detection {
            bbox: BBox::new(x1, 0, x1 + 100, 100).unwrap(),
            confidence: conf,
            class_id,
        }
    }

    #[test]
    fn nms_keeps_highest_confidence() {
        let kept = non_max_suppression(vec![det(0, 0.6, 0), det(10, 0.9, 0)], 0.45);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].confidence, 0.9);
    }

    #[test]
    fn nms_keeps_different_classes() {
        let kept = non_max_suppression(vec![det(0, 0.6, 0), det(10, 0.9, 1)], 0.45);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn nms_keeps_disjoint_boxes() {
        let kept = non_max_suppression(vec![det(0, 0.6, 0), det(500, 0.9, 0)], 0.45);
        assert_eq!(kept.len(), 2);
    }
}
