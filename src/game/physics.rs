//! Kinematics and arena boundary handling

use glam::Vec2;

use super::geometry::Aabb;
use super::rules::BoundaryPolicy;

/// Result of applying a boundary policy to a position
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoundaryOutcome {
    Inside(Vec2),
    Wrapped(Vec2),
    Clamped(Vec2),
    /// Crossed the wall under the wall-death policy
    Killed,
}

impl BoundaryOutcome {
    /// Position after the policy, `None` when the entity died
    pub fn position(self) -> Option<Vec2> {
        match self {
            Self::Inside(p) | Self::Wrapped(p) | Self::Clamped(p) => Some(p),
            Self::Killed => None,
        }
    }
}

/// Physics system for moving entities
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Move `position` by `speed * dt` along `heading`
    pub fn advance(position: Vec2, heading: f32, speed: f32, dt: f32) -> Vec2 {
        position + Vec2::from_angle(heading) * (speed * dt)
    }

    /// Apply the arena boundary policy to a position
    pub fn apply_boundary(position: Vec2, bounds: &Aabb, policy: BoundaryPolicy) -> BoundaryOutcome {
        if bounds.contains(position) {
            return BoundaryOutcome::Inside(position);
        }

        match policy {
            BoundaryPolicy::Kill => BoundaryOutcome::Killed,
            BoundaryPolicy::Clamp => BoundaryOutcome::Clamped(position.clamp(bounds.min, bounds.max)),
            BoundaryPolicy::Wrap => {
                let size = bounds.size();
                let rel = position - bounds.min;
                let wrapped = Vec2::new(rel.x.rem_euclid(size.x), rel.y.rem_euclid(size.y));
                BoundaryOutcome::Wrapped(bounds.min + wrapped)
            }
        }
    }

    /// Push a circle out of any obstacle it overlaps (smallest-axis exit)
    pub fn push_out_of_obstacles(position: Vec2, radius: f32, obstacles: &[Aabb]) -> Vec2 {
        let mut pos = position;
        for obstacle in obstacles {
            if !obstacle.overlaps_circle(pos, radius) {
                continue;
            }

            let closest = pos.clamp(obstacle.min, obstacle.max);
            let offset = pos - closest;
            let dist = offset.length();

            if dist > 0.001 {
                // Center outside the box, push along the contact normal
                pos = closest + offset / dist * radius;
            } else {
                // Center inside the box, exit through the nearest face
                let exits = [
                    (pos.x - obstacle.min.x, Vec2::new(obstacle.min.x - radius, pos.y)),
                    (obstacle.max.x - pos.x, Vec2::new(obstacle.max.x + radius, pos.y)),
                    (pos.y - obstacle.min.y, Vec2::new(pos.x, obstacle.min.y - radius)),
                    (obstacle.max.y - pos.y, Vec2::new(pos.x, obstacle.max.y + radius)),
                ];
                if let Some((_, exit)) = exits
                    .iter()
                    .min_by(|a, b| a.0.total_cmp(&b.0))
                {
                    pos = *exit;
                }
            }
        }
        pos
    }

    /// Pull every segment toward its predecessor so consecutive segments are
    /// never farther apart than `spacing`
    pub fn follow_chain(segments: &mut [Vec2], spacing: f32) {
        for i in 1..segments.len() {
            let leader = segments[i - 1];
            let offset = segments[i] - leader;
            let dist = offset.length();
            if dist > spacing {
                segments[i] = leader + offset / dist * spacing;
            }
        }
    }
}
