//! Focus curve sample points

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A single (focuser position, blur) sample
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ZERO: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Whether both coordinates are finite
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

/// Point halfway between `a` and `b`
pub fn mid_point(a: Point, b: Point) -> Point {
    Point::new((a.x + b.x) / 2.0, (a.y + b.y) / 2.0)
}

/// Orders points by position. NaN positions sort last.
pub fn compare_by_x(a: &Point, b: &Point) -> Ordering {
    a.x.partial_cmp(&b.x).unwrap_or_else(|| a.x.is_nan().cmp(&b.x.is_nan()))
}

/// Insert `point` keeping `points` sorted ascending by `x`.
///
/// Points sharing an `x` are kept side by side in insertion order; nothing is merged.
pub fn insert_sorted(points: &mut Vec<Point>, point: Point) {
    let index = points.partition_point(|p| compare_by_x(p, &point) != Ordering::Greater);
    points.insert(index, point);
}

/// Split points into parallel `x` and `y` vectors
pub fn unzip(points: &[Point]) -> (Vec<f64>, Vec<f64>) {
    points.iter().map(|p| (p.x, p.y)).unzip()
}
