//! Planar geometry used by association and line-crossing tests.
//!
//! All coordinates are image pixels (x to the right, y down).

use crate::bbox::{BBox, Ltrb};
use nalgebra as na;

/// Squared segment lengths at or below this are treated as a single point.
pub const DEGENERATE_EPS: f32 = 1e-6;

#[inline]
pub fn centroid(bbox: &BBox<Ltrb>) -> na::Point2<f32> {
    na::Point2::new(
        (bbox.left() + bbox.right()) * 0.5,
        (bbox.top() + bbox.bottom()) * 0.5,
    )
}

/// z-component of the 3D cross product of two planar vectors.
#[inline]
pub fn cross(a: &na::Vector2<f32>, b: &na::Vector2<f32>) -> f32 {
    a.perp(b)
}

/// Signed side of `p` relative to the directed line `a -> b`.
///
/// Positive and negative values are the two half-planes, zero means `p` lies
/// on the line. Swapping `a` and `b` flips the sign.
#[inline]
pub fn side(a: &na::Point2<f32>, b: &na::Point2<f32>, p: &na::Point2<f32>) -> f32 {
    cross(&(b - a), &(p - a))
}

/// Distance from `p` to the finite segment `a-b`.
///
/// The projection parameter is clamped to `[0, 1]`, so points beyond either end
/// measure to the nearest endpoint. A zero-length segment degenerates to
/// point distance.
pub fn segment_distance(p: &na::Point2<f32>, a: &na::Point2<f32>, b: &na::Point2<f32>) -> f32 {
    let ab = b - a;
    let len_sq = ab.norm_squared();

    if len_sq <= DEGENERATE_EPS {
        return na::distance(p, a);
    }

    let t = ((p - a).dot(&ab) / len_sq).clamp(0.0, 1.0);
    let proj = a + ab * t;

    na::distance(p, &proj)
}

/// Constant-velocity guess of the next position given the last two.
#[inline]
pub fn extrapolate(prev: &na::Point2<f32>, last: &na::Point2<f32>) -> na::Point2<f32> {
    last + (last - prev)
}
