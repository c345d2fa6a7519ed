//! Directional line-crossing detection over track trajectories.
//!
//! Each frame the counter looks at the latest trajectory segment of every
//! track that was updated. A crossing happens iff that segment strictly
//! intersects the configured line; the direction comes from the signed
//! distance of the post-crossing centroid along the line normal. Crossings
//! that land within the threshold band around the line are held and
//! re-evaluated on the next frame.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::geometry::{segments_intersect, BBox, Point};
use crate::tracker::Track;
use crate::types::Timestamp;

/// Crossing direction relative to the line normal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrossingDirection {
    Entry,
    Exit,
}

impl CrossingDirection {
    /// The persisted representation (`entry` / `exit`).
    pub fn as_str(&self) -> &'static str {
        match self {
            CrossingDirection::Entry => "entry",
            CrossingDirection::Exit => "exit",
        }
    }
}

/// Whether a track may be counted once per direction or once overall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReversalPolicy {
    /// One entry and one exit per track.
    AllowReversal,
    /// Only the first crossing of a track counts.
    FirstOnly,
}

/// Virtual line endpoints in percentage space, each coordinate in `0..=100`.
///
/// Resolved to pixels per frame so one configuration serves any resolution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineConfig {
    pub x1_pct: f64,
    pub y1_pct: f64,
    pub x2_pct: f64,
    pub y2_pct: f64,
}

impl LineConfig {
    pub fn new(x1_pct: f64, y1_pct: f64, x2_pct: f64, y2_pct: f64) -> Result<Self, CoreError> {
        let line = Self {
            x1_pct,
            y1_pct,
            x2_pct,
            y2_pct,
        };
        line.validate()?;
        Ok(line)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        for v in [self.x1_pct, self.y1_pct, self.x2_pct, self.y2_pct] {
            if !v.is_finite() || !(0.0..=100.0).contains(&v) {
                return Err(CoreError::Validation(format!(
                    "line coordinate {v} outside [0, 100]"
                )));
            }
        }
        if (self.x1_pct, self.y1_pct) == (self.x2_pct, self.y2_pct) {
            return Err(CoreError::Validation(
                "line endpoints must be distinct".into(),
            ));
        }
        Ok(())
    }

    /// Resolve the endpoints to pixel coordinates for a frame.
    pub fn resolve(&self, width: u32, height: u32) -> (Point, Point) {
        (
            Point::new(
                self.x1_pct * width as f64 / 100.0,
                self.y1_pct * height as f64 / 100.0,
            ),
            Point::new(
                self.x2_pct * width as f64 / 100.0,
                self.y2_pct * height as f64 / 100.0,
            ),
        )
    }
}

/// Counter configuration.
#[derive(Debug, Clone, Copy)]
pub struct CountingConfig {
    pub line: LineConfig,
    /// Dead band (pixels) around the line inside which a crossing is held.
    pub threshold_px: f64,
    pub policy: ReversalPolicy,
}

impl CountingConfig {
    pub fn new(
        line: LineConfig,
        threshold_px: f64,
        policy: ReversalPolicy,
    ) -> Result<Self, CoreError> {
        line.validate()?;
        if !threshold_px.is_finite() || threshold_px < 0.0 {
            return Err(CoreError::Validation(format!(
                "crossing threshold {threshold_px} must be finite and non-negative"
            )));
        }
        Ok(Self {
            line,
            threshold_px,
            policy,
        })
    }
}

/// A counted crossing, emitted at most once per `(track, direction)`.
#[derive(Debug, Clone, Serialize)]
pub struct CrossingEvent {
    pub track_id: u64,
    pub direction: CrossingDirection,
    pub frame_index: u64,
    pub timestamp: Timestamp,
    pub confidence: f32,
    pub bbox: BBox,
    pub camera_id: String,
}

/// Per-job crossing counter. Pure: all inputs arrive through [`observe`],
/// the only outputs are the returned events and the running counts.
///
/// [`observe`]: LineCounter::observe
#[derive(Debug)]
pub struct LineCounter {
    cfg: CountingConfig,
    camera_id: String,
    counted: HashSet<(u64, CrossingDirection)>,
    /// Tracks whose crossing landed inside the threshold band and is held
    /// for re-evaluation.
    pending: HashSet<u64>,
    entry_count: u64,
    exit_count: u64,
}

impl LineCounter {
    pub fn new(cfg: CountingConfig, camera_id: impl Into<String>) -> Self {
        Self {
            cfg,
            camera_id: camera_id.into(),
            counted: HashSet::new(),
            pending: HashSet::new(),
            entry_count: 0,
            exit_count: 0,
        }
    }

    /// Feed one frame's updated tracks and collect the crossings they caused.
    ///
    /// `tracks` must be the full live track set for the frame: pending and
    /// already-counted state for ids no longer present is discarded (track
    /// ids are monotonic, so a dead id never returns).
    pub fn observe(
        &mut self,
        frame_index: u64,
        width: u32,
        height: u32,
        tracks: &[&Track],
        now: Timestamp,
    ) -> Result<Vec<CrossingEvent>, CoreError> {
        if width == 0 || height == 0 {
            return Err(CoreError::Validation(format!(
                "degenerate frame dimensions {width}x{height}"
            )));
        }

        let (l1, l2) = self.cfg.line.resolve(width, height);
        let mid = Point::new((l1.x + l2.x) / 2.0, (l1.y + l2.y) / 2.0);

        let mut events = Vec::new();
        for track in tracks {
            if track.last_frame_seen != frame_index {
                continue;
            }
            let Some((prev, cur)) = track.last_segment() else {
                continue;
            };

            if self.pending.remove(&track.id) {
                // Held crossing: decide once the centroid clears the band.
                let d = signed_distance(l1, l2, mid, cur);
                if d.abs() <= self.cfg.threshold_px {
                    self.pending.insert(track.id);
                } else {
                    self.emit(track, direction_of(d), frame_index, now, &mut events);
                }
                continue;
            }

            if !segments_intersect(prev, cur, l1, l2) {
                continue;
            }
            let d = signed_distance(l1, l2, mid, cur);
            if d.abs() <= self.cfg.threshold_px {
                self.pending.insert(track.id);
            } else {
                self.emit(track, direction_of(d), frame_index, now, &mut events);
            }
        }

        // Drop state for ids that no longer exist.
        let alive: HashSet<u64> = tracks.iter().map(|t| t.id).collect();
        self.pending.retain(|id| alive.contains(id));
        self.counted.retain(|(id, _)| alive.contains(id));

        Ok(events)
    }

    fn emit(
        &mut self,
        track: &Track,
        direction: CrossingDirection,
        frame_index: u64,
        now: Timestamp,
        events: &mut Vec<CrossingEvent>,
    ) {
        let suppressed = match self.cfg.policy {
            ReversalPolicy::FirstOnly => {
                self.counted.contains(&(track.id, CrossingDirection::Entry))
                    || self.counted.contains(&(track.id, CrossingDirection::Exit))
            }
            ReversalPolicy::AllowReversal => self.counted.contains(&(track.id, direction)),
        };
        if suppressed {
            return;
        }

        self.counted.insert((track.id, direction));
        match direction {
            CrossingDirection::Entry => self.entry_count += 1,
            CrossingDirection::Exit => self.exit_count += 1,
        }
        events.push(CrossingEvent {
            track_id: track.id,
            direction,
            frame_index,
            timestamp: now,
            confidence: track.confidence,
            bbox: track.bbox,
            camera_id: self.camera_id.clone(),
        });
    }

    /// `(entry, exit, net)` counts. `net == entry - exit` by construction.
    pub fn counts(&self) -> (u64, u64, i64) {
        (
            self.entry_count,
            self.exit_count,
            self.entry_count as i64 - self.exit_count as i64,
        )
    }

    /// Forget per-track transient state after a discontinuity (seek).
    ///
    /// Counts and the already-counted ledger survive; only held crossings
    /// are dropped, so a jump in the source cannot produce phantom events.
    pub fn reset_tracks(&mut self) {
        self.pending.clear();
    }
}

/// Signed distance of `p` from the line through `l1 -> l2`, positive on the
/// entry side of the normal.
fn signed_distance(l1: Point, l2: Point, mid: Point, p: Point) -> f64 {
    let dx = l2.x - l1.x;
    let dy = l2.y - l1.y;
    let len = (dx * dx + dy * dy).sqrt();
    if len == 0.0 {
        return 0.0;
    }
    // Normal is the line direction rotated a quarter turn: (dy, -dx).
    let nx = dy / len;
    let ny = -dx / len;
    nx * (p.x - mid.x) + ny * (p.y - mid.y)
}

fn direction_of(signed: f64) -> CrossingDirection {
    if signed > 0.0 {
        CrossingDirection::Entry
    } else {
        CrossingDirection::Exit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::Detection;
    use crate::tracker::{MultiObjectTracker, TrackerConfig};

    fn vertical_line() -> CountingConfig {
        CountingConfig::new(
            LineConfig::new(60.0, 0.0, 60.0, 100.0).unwrap(),
            5.0,
            ReversalPolicy::AllowReversal,
        )
        .unwrap()
    }

    /// Drive a tracker along the given centroids (60x60 boxes on a 100x100
    /// frame) and collect every event the counter emits.
    fn run_path(cfg: CountingConfig, centers: &[(i32, i32)]) -> (LineCounter, Vec<CrossingEvent>) {
        let mut tracker = MultiObjectTracker::new(TrackerConfig::default());
        let mut counter = LineCounter::new(cfg, "cam-1");
        let mut events = Vec::new();
        let now = chrono::Utc::now();
        for (frame, (cx, cy)) in centers.iter().enumerate() {
            let det = Detection::new(
                BBox::new(cx - 30, cy - 30, cx + 30, cy + 30).unwrap(),
                0.9,
                0,
            )
            .unwrap();
            tracker.step(frame as u64, &[det]).unwrap();
            let tracks: Vec<&Track> = tracker.tracks().iter().collect();
            events.extend(
                counter
                    .observe(frame as u64, 100, 100, &tracks, now)
                    .unwrap(),
            );
        }
        (counter, events)
    }

    #[test]
    fn single_entry_crossing() {
        let (counter, events) = run_path(vertical_line(), &[(40, 50), (55, 50), (70, 50)]);
        assert_eq!(counter.counts(), (1, 0, 1));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].direction, CrossingDirection::Entry);
        assert_eq!(events[0].frame_index, 2);
        assert_eq!(events[0].camera_id, "cam-1");
    }

    #[test]
    fn reversal_allowed_counts_both_directions() {
        let (counter, events) = run_path(
            vertical_line(),
            &[(40, 50), (55, 50), (70, 50), (40, 50)],
        );
        assert_eq!(counter.counts(), (1, 1, 0));
        assert_eq!(events[1].direction, CrossingDirection::Exit);
    }

    #[test]
    fn first_only_suppresses_reversal() {
        let cfg = CountingConfig {
            policy: ReversalPolicy::FirstOnly,
            ..vertical_line()
        };
        let (counter, events) = run_path(cfg, &[(40, 50), (55, 50), (70, 50), (40, 50)]);
        assert_eq!(counter.counts(), (1, 0, 1));
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn same_direction_twice_counts_once() {
        // Cross, come back, cross again: under FIRST_ONLY exactly one count.
        let cfg = CountingConfig {
            policy: ReversalPolicy::FirstOnly,
            ..vertical_line()
        };
        let (counter, _) = run_path(
            cfg,
            &[(40, 50), (70, 50), (40, 50), (70, 50)],
        );
        assert_eq!(counter.counts(), (1, 0, 1));
    }

    #[test]
    fn tangent_trajectory_does_not_count() {
        // Ends exactly on the line: strict intersection excludes it.
        let (counter, events) = run_path(vertical_line(), &[(40, 50), (60, 50)]);
        assert_eq!(counter.counts(), (0, 0, 0));
        assert!(events.is_empty());
    }

    #[test]
    fn single_frame_track_does_not_count() {
        let (counter, events) = run_path(vertical_line(), &[(70, 50)]);
        assert_eq!(counter.counts(), (0, 0, 0));
        assert!(events.is_empty());
    }

    #[test]
    fn crossing_inside_band_is_deferred() {
        // Lands 2 px past the line (threshold 5): held, then resolved when
        // the centroid clears the band.
        let (counter, events) = run_path(vertical_line(), &[(55, 50), (62, 50), (75, 50)]);
        assert_eq!(counter.counts(), (1, 0, 1));
        assert_eq!(events[0].frame_index, 2);
    }

    #[test]
    fn deferred_crossing_dies_with_track() {
        let cfg = CountingConfig {
            ..vertical_line()
        };
        let mut tracker = MultiObjectTracker::new(TrackerConfig {
            miss_max: 0,
            ..Default::default()
        });
        let mut counter = LineCounter::new(cfg, "cam-1");
        let now = chrono::Utc::now();

        for (frame, cx) in [55, 62].into_iter().enumerate() {
            let det =
                Detection::new(BBox::new(cx - 30, 20, cx + 30, 80).unwrap(), 0.9, 0).unwrap();
            tracker.step(frame as u64, &[det]).unwrap();
            let tracks: Vec<&Track> = tracker.tracks().iter().collect();
            counter.observe(frame as u64, 100, 100, &tracks, now).unwrap();
        }
        // Track disappears before the held crossing resolves.
        tracker.step(2, &[]).unwrap();
        let tracks: Vec<&Track> = tracker.tracks().iter().collect();
        let events = counter.observe(2, 100, 100, &tracks, now).unwrap();
        assert!(events.is_empty());
        assert_eq!(counter.counts(), (0, 0, 0));
    }

    #[test]
    fn net_count_matches_entry_minus_exit() {
        let (counter, _) = run_path(
            vertical_line(),
            &[(40, 50), (70, 50), (40, 50), (70, 50), (40, 50)],
        );
        let (entry, exit, net) = counter.counts();
        assert_eq!(net, entry as i64 - exit as i64);
    }

    #[test]
    fn line_config_rejects_out_of_range() {
        assert!(LineConfig::new(-1.0, 0.0, 50.0, 100.0).is_err());
        assert!(LineConfig::new(0.0, 0.0, 101.0, 100.0).is_err());
        assert!(LineConfig::new(f64::NAN, 0.0, 50.0, 100.0).is_err());
        assert!(LineConfig::new(50.0, 50.0, 50.0, 50.0).is_err());
    }

    #[test]
    fn counting_config_rejects_bad_threshold() {
        let line = LineConfig::new(60.0, 0.0, 60.0, 100.0).unwrap();
        assert!(CountingConfig::new(line, f64::NAN, ReversalPolicy::FirstOnly).is_err());
        assert!(CountingConfig::new(line, -1.0, ReversalPolicy::FirstOnly).is_err());
    }

    #[test]
    fn reset_tracks_keeps_counts() {
        let (mut counter, _) = run_path(vertical_line(), &[(40, 50), (55, 50), (70, 50)]);
        counter.reset_tracks();
        assert_eq!(counter.counts(), (1, 0, 1));
    }
}
