//! Bounding boxes and planar geometry used by the tracker and the
//! line-crossing counter.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A 2D point in pixel space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned bounding box in integer pixel coordinates.
///
/// Invariant: `x1 < x2` and `y1 < y2`. Construct via [`BBox::new`] to have
/// the invariant checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BBox {
    /// Create a bounding box, rejecting degenerate or inverted corners.
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Result<Self, CoreError> {
        if x1 >= x2 || y1 >= y2 {
            return Err(CoreError::Validation(format!(
                "degenerate bounding box ({x1},{y1})-({x2},{y2})"
            )));
        }
        Ok(Self { x1, y1, x2, y2 })
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> i64 {
        self.width() as i64 * self.height() as i64
    }

    /// Center of the box.
    pub fn center(&self) -> Point {
        Point::new(
            (self.x1 + self.x2) as f64 / 2.0,
            (self.y1 + self.y2) as f64 / 2.0,
        )
    }

    /// Intersection-over-Union with another box, in `0.0..=1.0`.
    pub fn iou(&self, other: &BBox) -> f64 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);

        if ix2 <= ix1 || iy2 <= iy1 {
            return 0.0;
        }

        let inter = (ix2 - ix1) as i64 * (iy2 - iy1) as i64;
        let union = self.area() + other.area() - inter;
        if union <= 0 {
            return 0.0;
        }
        inter as f64 / union as f64
    }

    /// The box as a `[x1, y1, x2, y2]` array, matching the persisted format.
    pub fn to_array(&self) -> [i32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

/// Signed orientation of the triple `(a, b, c)`.
///
/// Positive when `c` lies counter-clockwise of the directed line `a -> b`,
/// negative when clockwise, zero when colinear.
pub fn ccw(a: Point, b: Point, c: Point) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

/// Strict intersection test between segments `p1 -> p2` and `q1 -> q2`.
///
/// Colinear and endpoint-touching configurations do not count as an
/// intersection: each segment must cross strictly from one side of the other
/// to the opposite side.
pub fn segments_intersect(p1: Point, p2: Point, q1: Point, q2: Point) -> bool {
    ccw(q1, q2, p1) * ccw(q1, q2, p2) < 0.0 && ccw(p1, p2, q1) * ccw(p1, p2, q2) < 0.0
}
