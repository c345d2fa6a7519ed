//! Gatewatch domain logic.
//!
//! Pure, I/O-free building blocks shared by the processing pipeline and the
//! API layer:
//!
//! - [`geometry`] — bounding boxes, IoU, segment intersection.
//! - [`detect`] — the opaque detector capability and its detection type.
//! - [`tracker`] — greedy-IoU multi-object tracking with persistent ids.
//! - [`counting`] — directional line-crossing detection over track
//!   trajectories.
//! - [`annotate`] — drawing of boxes, lines, and count overlays onto RGB
//!   frames, plus JPEG encoding.

pub mod annotate;
pub mod counting;
pub mod detect;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod tracker;
pub mod types;

pub use counting::{CountingConfig, CrossingDirection, CrossingEvent, LineConfig, ReversalPolicy};
pub use detect::{Detection, Detector, DetectorError};
pub use error::CoreError;
pub use frame::Frame;
pub use geometry::{BBox, Point};
pub use tracker::{MultiObjectTracker, Track, TrackerConfig};
