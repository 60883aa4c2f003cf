//! Collision predicates - pure functions over circles, polylines, rays and boxes

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Axis-aligned box (arena bounds, cover obstacles)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec2,
    pub max: Vec2,
}

impl Aabb {
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    /// Box centered on the origin with the given full width and height
    pub fn centered(width: f32, height: f32) -> Self {
        let half = Vec2::new(width, height) * 0.5;
        Self::new(-half, half)
    }

    pub fn contains(&self, point: Vec2) -> bool {
        point.x >= self.min.x && point.x <= self.max.x && point.y >= self.min.y && point.y <= self.max.y
    }

    pub fn size(&self) -> Vec2 {
        self.max - self.min
    }

    /// Circle/box overlap test
    pub fn overlaps_circle(&self, center: Vec2, radius: f32) -> bool {
        let closest = center.clamp(self.min, self.max);
        closest.distance_squared(center) <= radius * radius
    }
}

/// Check overlap between two circles (touching counts)
pub fn circles_overlap(a: Vec2, radius_a: f32, b: Vec2, radius_b: f32) -> bool {
    let combined = radius_a + radius_b;
    a.distance_squared(b) <= combined * combined
}

/// Squared distance from `point` to the segment `a..b`
pub fn point_segment_distance_sq(point: Vec2, a: Vec2, b: Vec2) -> f32 {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq <= f32::EPSILON {
        return point.distance_squared(a);
    }
    let t = ((point - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    point.distance_squared(a + ab * t)
}

/// Check whether a circle touches a thick polyline.
///
/// The first `skip` points of the chain are ignored so a head never collides
/// with the segments right behind it on a sharp turn.
pub fn circle_hits_polyline(
    center: Vec2,
    radius: f32,
    points: &[Vec2],
    thickness: f32,
    skip: usize,
) -> bool {
    if points.len() <= skip {
        return false;
    }

    let reach = radius + thickness;
    let reach_sq = reach * reach;
    let tail = &points[skip..];

    if tail.len() == 1 {
        return center.distance_squared(tail[0]) <= reach_sq;
    }

    tail.windows(2)
        .any(|pair| point_segment_distance_sq(center, pair[0], pair[1]) <= reach_sq)
}

/// Distance along a ray to the first intersection with a circle.
///
/// `dir` must be normalized. A ray starting inside the circle hits at 0.
pub fn ray_circle(origin: Vec2, dir: Vec2, center: Vec2, radius: f32) -> Option<f32> {
    let to_center = center - origin;
    let radius_sq = radius * radius;
    if to_center.length_squared() <= radius_sq {
        return Some(0.0);
    }

    let along = to_center.dot(dir);
    if along < 0.0 {
        return None;
    }

    let perp_sq = to_center.length_squared() - along * along;
    if perp_sq > radius_sq {
        return None;
    }

    Some(along - (radius_sq - perp_sq).sqrt())
}

/// Distance along a ray to the first intersection with a box (slab method)
pub fn ray_aabb(origin: Vec2, dir: Vec2, aabb: &Aabb) -> Option<f32> {
    let mut t_min = 0.0_f32;
    let mut t_max = f32::INFINITY;

    for axis in 0..2 {
        let o = origin[axis];
        let d = dir[axis];
        let (lo, hi) = (aabb.min[axis], aabb.max[axis]);

        if d.abs() <= f32::EPSILON {
            if o < lo || o > hi {
                return None;
            }
            continue;
        }

        let inv = 1.0 / d;
        let mut t0 = (lo - o) * inv;
        let mut t1 = (hi - o) * inv;
        if t0 > t1 {
            std::mem::swap(&mut t0, &mut t1);
        }
        t_min = t_min.max(t0);
        t_max = t_max.min(t1);
        if t_min > t_max {
            return None;
        }
    }

    Some(t_min)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circles_overlap_touching_counts() {
        assert!(circles_overlap(Vec2::ZERO, 1.0, Vec2::new(2.0, 0.0), 1.0));
        assert!(!circles_overlap(Vec2::ZERO, 1.0, Vec2::new(2.01, 0.0), 1.0));
    }

    #[test]
    fn test_point_segment_distance_clamps_to_endpoints() {
        let a = Vec2::ZERO;
        let b = Vec2::new(10.0, 0.0);
        assert_eq!(point_segment_distance_sq(Vec2::new(5.0, 3.0), a, b), 9.0);
        assert_eq!(point_segment_distance_sq(Vec2::new(-4.0, 3.0), a, b), 25.0);
    }

    #[test]
    fn test_polyline_skip_ignores_near_head_segments() {
        let chain = [
            Vec2::new(0.0, 0.0),
            Vec2::new(10.0, 0.0),
            Vec2::new(20.0, 0.0),
            Vec2::new(30.0, 0.0),
        ];
        let probe = Vec2::new(5.0, 1.0);
        assert!(circle_hits_polyline(probe, 1.0, &chain, 1.0, 0));
        // Skipping the first two points leaves only the 20..30 segment
        assert!(!circle_hits_polyline(probe, 1.0, &chain, 1.0, 2));
        assert!(circle_hits_polyline(Vec2::new(25.0, 1.5), 1.0, &chain, 1.0, 2));
    }

    #[test]
    fn test_polyline_fully_skipped_never_hits() {
        let chain = [Vec2::ZERO, Vec2::new(1.0, 0.0)];
        assert!(!circle_hits_polyline(Vec2::ZERO, 5.0, &chain, 1.0, 2));
    }

    #[test]
    fn test_ray_circle_front_and_behind() {
        let hit = ray_circle(Vec2::ZERO, Vec2::X, Vec2::new(10.0, 0.0), 2.0);
        assert_eq!(hit, Some(8.0));
        assert_eq!(ray_circle(Vec2::ZERO, -Vec2::X, Vec2::new(10.0, 0.0), 2.0), None);
        assert_eq!(ray_circle(Vec2::ZERO, Vec2::Y, Vec2::new(10.0, 0.0), 2.0), None);
    }

    #[test]
    fn test_ray_aabb_hits_near_face() {
        let wall = Aabb::new(Vec2::new(5.0, -1.0), Vec2::new(6.0, 1.0));
        assert_eq!(ray_aabb(Vec2::ZERO, Vec2::X, &wall), Some(5.0));
        assert_eq!(ray_aabb(Vec2::ZERO, Vec2::Y, &wall), None);
        assert_eq!(ray_aabb(Vec2::ZERO, -Vec2::X, &wall), None);
    }

    #[test]
    fn test_aabb_circle_overlap() {
        let wall = Aabb::new(Vec2::new(0.0, 0.0), Vec2::new(2.0, 2.0));
        assert!(wall.overlaps_circle(Vec2::new(3.0, 1.0), 1.0));
        assert!(!wall.overlaps_circle(Vec2::new(3.5, 1.0), 1.0));
    }
}
