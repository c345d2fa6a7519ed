//! Greedy-IoU multi-object tracking.
//!
//! Detections are associated to existing tracks by repeatedly pairing the
//! globally highest IoU above the match threshold. Unmatched detections of
//! sufficient confidence open new tracks; tracks missing for too many
//! consecutive frames are destroyed.

use std::collections::VecDeque;

use crate::detect::Detection;
use crate::error::CoreError;
use crate::geometry::{BBox, Point};

/// Tracker tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct TrackerConfig {
    /// Minimum IoU to consider a detection/track pair a match.
    pub iou_min: f64,
    /// Consecutive missed frames before a track is destroyed.
    pub miss_max: u32,
    /// Bound on the per-track centroid history.
    pub history_len: usize,
    /// Minimum confidence for an unmatched detection to open a new track.
    pub min_confidence: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            iou_min: 0.3,
            miss_max: 30,
            history_len: 30,
            min_confidence: 0.3,
        }
    }
}

/// A persistent identity over a sequence of associated detections.
#[derive(Debug, Clone)]
pub struct Track {
    /// Monotonically increasing id, unique within a job. Opaque to callers.
    pub id: u64,
    pub bbox: BBox,
    pub confidence: f32,
    pub class_id: u32,
    pub last_frame_seen: u64,
    centers: VecDeque<Point>,
    misses: u32,
}

impl Track {
    fn new(id: u64, det: &Detection, frame_index: u64, history_len: usize) -> Self {
        let mut centers = VecDeque::with_capacity(history_len);
        centers.push_back(det.bbox.center());
        Self {
            id,
            bbox: det.bbox,
            confidence: det.confidence,
            class_id: det.class_id,
            last_frame_seen: frame_index,
            centers,
            misses: 0,
        }
    }

    fn update(&mut self, det: &Detection, frame_index: u64, history_len: usize) {
        self.bbox = det.bbox;
        self.confidence = det.confidence;
        self.class_id = det.class_id;
        self.last_frame_seen = frame_index;
        self.misses = 0;
        if self.centers.len() == history_len {
            self.centers.pop_front();
        }
        self.centers.push_back(det.bbox.center());
    }

    /// Current centroid.
    pub fn center(&self) -> Point {
        // A track always holds at least its creation centroid.
        *self.centers.back().unwrap_or(&Point { x: 0.0, y: 0.0 })
    }

    /// The last trajectory segment `(previous, current)`, if the track has
    /// been seen in at least two frames.
    pub fn last_segment(&self) -> Option<(Point, Point)> {
        let n = self.centers.len();
        if n < 2 {
            return None;
        }
        Some((self.centers[n - 2], self.centers[n - 1]))
    }
}

/// Associates per-frame detections into persistent tracks.
#[derive(Debug)]
pub struct MultiObjectTracker {
    cfg: TrackerConfig,
    next_id: u64,
    tracks: Vec<Track>,
}

impl MultiObjectTracker {
    pub fn new(cfg: TrackerConfig) -> Self {
        Self {
            cfg,
            next_id: 0,
            tracks: Vec::new(),
        }
    }

    /// Advance the tracker by one frame.
    ///
    /// Association is greedy on the globally highest IoU; ties break toward
    /// the lower detection index, then the lower track index, so identical
    /// detection sequences reproduce identical track ids and lifetimes.
    ///
    /// An empty detection set is valid and only ages tracks.
    pub fn step(&mut self, frame_index: u64, detections: &[Detection]) -> Result<(), CoreError> {
        for det in detections {
            det.validate()?;
        }

        // All candidate pairs above the threshold.
        let mut pairs: Vec<(f64, usize, usize)> = Vec::new();
        for (ti, track) in self.tracks.iter().enumerate() {
            for (di, det) in detections.iter().enumerate() {
                let iou = track.bbox.iou(&det.bbox);
                if iou >= self.cfg.iou_min {
                    pairs.push((iou, di, ti));
                }
            }
        }
        // Highest IoU first; on equal IoU the lower detection index wins,
        // then the lower track index.
        pairs.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.cmp(&b.1))
                .then(a.2.cmp(&b.2))
        });

        let mut det_used = vec![false; detections.len()];
        let mut track_used = vec![false; self.tracks.len()];
        for (_, di, ti) in pairs {
            if det_used[di] || track_used[ti] {
                continue;
            }
            det_used[di] = true;
            track_used[ti] = true;
            self.tracks[ti].update(&detections[di], frame_index, self.cfg.history_len);
        }

        // Unmatched tracks age; destroy past the miss limit.
        for (ti, track) in self.tracks.iter_mut().enumerate() {
            if !track_used[ti] {
                track.misses += 1;
            }
        }
        let miss_max = self.cfg.miss_max;
        self.tracks.retain(|t| t.misses <= miss_max);

        // Unmatched detections above the confidence floor open new tracks.
        for (di, det) in detections.iter().enumerate() {
            if det_used[di] || det.confidence < self.cfg.min_confidence {
                continue;
            }
            let id = self.next_id;
            self.next_id += 1;
            self.tracks
                .push(Track::new(id, det, frame_index, self.cfg.history_len));
        }

        Ok(())
    }

    /// All live tracks.
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Tracks that were matched in the given frame.
    pub fn tracks_seen_at(&self, frame_index: u64) -> impl Iterator<Item = &Track> {
        self.tracks
            .iter()
            .filter(move |t| t.last_frame_seen == frame_index)
    }

    /// Drop all track state, keeping the id counter so ids stay unique
    /// across a discontinuity (e.g. a seek).
    pub fn reset(&mut self) {
        self.tracks.clear();
    }

    /// How many distinct track ids have ever been issued.
    pub fn ids_issued(&self) -> u64 {
        self.next_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x1: i32, y1: i32, x2: i32, y2: i32, conf: f32) -> Detection {
        Detection::new(BBox::new(x1, y1, x2, y2).unwrap(), conf, 0).unwrap()
    }

    #[test]
    fn empty_update_is_valid() {
        let mut tracker = MultiObjectTracker::new(TrackerConfig::default());
        tracker.step(0, &[]).unwrap();
        assert!(tracker.tracks().is_empty());
    }

    #[test]
    fn new_detection_opens_track() {
        let mut tracker = MultiObjectTracker::new(TrackerConfig::default());
        tracker.step(0, &[det(10, 10, 50, 50, 0.9)]).unwrap();
        assert_eq!(tracker.tracks().len(), 1);
        assert_eq!(tracker.tracks()[0].id, 0);
    }

    #[test]
    fn low_confidence_unmatched_detection_is_dropped() {
        let mut tracker = MultiObjectTracker::new(TrackerConfig::default());
        tracker.step(0, &[det(10, 10, 50, 50, 0.1)]).unwrap();
        assert!(tracker.tracks().is_empty());
    }

    #[test]
    fn track_id_persists_across_frames() {
        let mut tracker = MultiObjectTracker::new(TrackerConfig::default());
        tracker.step(0, &[det(10, 10, 50, 50, 0.9)]).unwrap();
        tracker.step(1, &[det(12, 12, 52, 52, 0.9)]).unwrap();
        assert_eq!(tracker.tracks().len(), 1);
        assert_eq!(tracker.tracks()[0].id, 0);
        assert_eq!(tracker.tracks()[0].last_frame_seen, 1);
    }

    #[test]
    fn low_confidence_matched_detection_still_updates() {
        // The confidence floor gates track creation, not track updates.
        let mut tracker = MultiObjectTracker::new(TrackerConfig::default());
        tracker.step(0, &[det(10, 10, 50, 50, 0.9)]).unwrap();
        tracker.step(1, &[det(11, 11, 51, 51, 0.2)]).unwrap();
        assert_eq!(tracker.tracks().len(), 1);
        assert_eq!(tracker.tracks()[0].last_frame_seen, 1);
    }

    #[test]
    fn track_destroyed_after_miss_limit() {
        let cfg = TrackerConfig {
            miss_max: 3,
            ..Default::default()
        };
        let mut tracker = MultiObjectTracker::new(cfg);
        tracker.step(0, &[det(10, 10, 50, 50, 0.9)]).unwrap();
        for frame in 1..=3 {
            tracker.step(frame, &[]).unwrap();
            assert_eq!(tracker.tracks().len(), 1, "alive at miss {frame}");
        }
        tracker.step(4, &[]).unwrap();
        assert!(tracker.tracks().is_empty());
    }

    #[test]
    fn greedy_matching_prefers_highest_iou() {
        let mut tracker = MultiObjectTracker::new(TrackerConfig::default());
        tracker
            .step(0, &[det(0, 0, 100, 100, 0.9), det(200, 0, 300, 100, 0.9)])
            .unwrap();
        // Both detections overlap track 0, but the second overlaps more.
        tracker
            .step(1, &[det(40, 0, 140, 100, 0.9), det(5, 0, 105, 100, 0.9)])
            .unwrap();
        let t0 = tracker.tracks().iter().find(|t| t.id == 0).unwrap();
        assert_eq!(t0.bbox, BBox::new(5, 0, 105, 100).unwrap());
    }

    #[test]
    fn iou_tie_breaks_toward_lower_detection_index() {
        let mut tracker = MultiObjectTracker::new(TrackerConfig::default());
        tracker.step(0, &[det(0, 0, 100, 100, 0.9)]).unwrap();
        // Two identical detections: the first one must claim the track.
        tracker
            .step(1, &[det(0, 0, 100, 100, 0.9), det(0, 0, 100, 100, 0.9)])
            .unwrap();
        assert_eq!(tracker.tracks().len(), 2);
        let t0 = tracker.tracks().iter().find(|t| t.id == 0).unwrap();
        assert!(t0.last_segment().is_some());
        let t1 = tracker.tracks().iter().find(|t| t.id == 1).unwrap();
        assert!(t1.last_segment().is_none());
    }

    #[test]
    fn deterministic_ids_for_identical_sequences() {
        let run = || {
            let mut tracker = MultiObjectTracker::new(TrackerConfig::default());
            tracker
                .step(0, &[det(0, 0, 50, 50, 0.9), det(100, 100, 150, 150, 0.8)])
                .unwrap();
            tracker
                .step(1, &[det(102, 102, 152, 152, 0.8), det(2, 2, 52, 52, 0.9)])
                .unwrap();
            tracker
                .tracks()
                .iter()
                .map(|t| (t.id, t.bbox))
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn history_is_bounded() {
        let cfg = TrackerConfig {
            history_len: 4,
            ..Default::default()
        };
        let mut tracker = MultiObjectTracker::new(cfg);
        for frame in 0..20 {
            let off = frame as i32;
            tracker.step(frame, &[det(off, 0, off + 50, 50, 0.9)]).unwrap();
        }
        let (prev, cur) = tracker.tracks()[0].last_segment().unwrap();
        assert_eq!(cur.x - prev.x, 1.0);
        assert_eq!(tracker.tracks()[0].centers.len(), 4);
    }

    #[test]
    fn reset_clears_tracks_but_keeps_id_counter() {
        let mut tracker = MultiObjectTracker::new(TrackerConfig::default());
        tracker.step(0, &[det(10, 10, 50, 50, 0.9)]).unwrap();
        tracker.reset();
        assert!(tracker.tracks().is_empty());
        tracker.step(1, &[det(10, 10, 50, 50, 0.9)]).unwrap();
        assert_eq!(tracker.tracks()[0].id, 1);
    }

    #[test]
    fn invalid_detection_is_rejected() {
        let mut tracker = MultiObjectTracker::new(TrackerConfig::default());
        let bad = Detection {
            bbox: BBox {
                x1: 0,
                y1: 0,
                x2: 10,
                y2: 10,
            },
            confidence: f32::NAN,
            class_id: 0,
        };
        assert!(tracker.step(0, &[bad]).is_err());
    }
}
