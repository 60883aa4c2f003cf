//! Combat system - weapons, projectiles, hitscan and damage

use glam::Vec2;
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::geometry::{ray_aabb, ray_circle, Aabb};

/// Weapons that can be picked up in the combat arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeaponKind {
    Pistol,
    Shotgun,
    Rifle,
    RocketLauncher,
}

impl WeaponKind {
    pub const ALL: [WeaponKind; 4] = [
        WeaponKind::Pistol,
        WeaponKind::Shotgun,
        WeaponKind::Rifle,
        WeaponKind::RocketLauncher,
    ];
}

/// Flight stats for weapons that fire projectiles instead of rays
#[derive(Debug, Clone, Copy)]
pub struct ProjectileStats {
    /// Units per second
    pub speed: f32,
    pub lifetime_ticks: u32,
    pub radius: f32,
}

/// Weapon stats per weapon kind
#[derive(Debug, Clone, Copy)]
pub struct WeaponStats {
    /// Damage per pellet
    pub damage: f32,
    /// Hitscan reach
    pub range: f32,
    pub cooldown_ms: u64,
    /// Full cone width in radians, sampled uniformly per pellet
    pub spread: f32,
    pub pellets: u32,
    /// Ammo in a fresh pickup
    pub ammo: u32,
    pub projectile: Option<ProjectileStats>,
}

impl WeaponStats {
    pub fn for_kind(kind: WeaponKind) -> Self {
        match kind {
            WeaponKind::Pistol => Self {
                damage: 20.0,
                range: 50.0,
                cooldown_ms: 400,
                spread: 2.0_f32.to_radians(),
                pellets: 1,
                ammo: 12,
                projectile: None,
            },
            WeaponKind::Shotgun => Self {
                damage: 10.0,
                range: 20.0,
                cooldown_ms: 1_000,
                spread: 12.0_f32.to_radians(),
                pellets: 6,
                ammo: 6,
                projectile: None,
            },
            WeaponKind::Rifle => Self {
                damage: 15.0,
                range: 60.0,
                cooldown_ms: 150,
                spread: 4.0_f32.to_radians(),
                pellets: 1,
                ammo: 20,
                projectile: None,
            },
            WeaponKind::RocketLauncher => Self {
                damage: 60.0,
                range: 0.0,
                cooldown_ms: 1_500,
                spread: 1.0_f32.to_radians(),
                pellets: 1,
                ammo: 3,
                projectile: Some(ProjectileStats {
                    speed: 30.0,
                    lifetime_ticks: 60,
                    radius: 0.4,
                }),
            },
        }
    }
}

/// Active projectile in the game
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Projectile {
    pub id: u64,
    pub owner_id: Uuid,
    pub position: Vec2,
    pub heading: f32,
    pub speed: f32,
    pub damage: f32,
    pub radius: f32,
    pub ticks_remaining: u32,
}

impl Projectile {
    /// Advance one tick, returns false once the lifetime is used up
    pub fn update(&mut self, dt: f32) -> bool {
        if self.ticks_remaining == 0 {
            return false;
        }
        self.position += Vec2::from_angle(self.heading) * (self.speed * dt);
        self.ticks_remaining -= 1;
        true
    }

    /// Check collision with a target
    pub fn check_hit(&self, target: Vec2, target_radius: f32) -> bool {
        let combined = self.radius + target_radius;
        self.position.distance_squared(target) <= combined * combined
    }
}

/// First thing a hitscan ray touched
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RayHit {
    Target { id: Uuid, distance: f32 },
    Obstacle { distance: f32 },
}

/// Result of a fire-or-use request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FireOutcome {
    /// Weapon discharged (hitscan hits listed, projectile ids for rockets)
    Shot {
        weapon: WeaponKind,
        ammo_left: u32,
        hits: Vec<Uuid>,
        projectiles: Vec<u64>,
    },
    /// Melee swing (target when something was in reach)
    Melee { target: Option<Uuid> },
    /// Still cooling down, nothing happened
    CoolingDown { ready_at_ms: u64 },
}

/// Combat system for weapons and damage
pub struct CombatSystem;

impl CombatSystem {
    /// Check if a weapon whose cooldown ends at `ready_at_ms` may fire
    pub fn can_fire(ready_at_ms: u64, now_ms: u64) -> bool {
        now_ms >= ready_at_ms
    }

    /// Apply damage to health, returns (new_health, is_dead)
    pub fn apply_damage(current_health: f32, damage: f32) -> (f32, bool) {
        let new_health = (current_health - damage).max(0.0);
        (new_health, new_health <= 0.0)
    }

    /// Sample one pellet direction inside the weapon cone
    pub fn sample_spread<R: Rng>(rng: &mut R, aim: f32, spread: f32) -> f32 {
        if spread <= 0.0 {
            return aim;
        }
        let half = spread * 0.5;
        aim + rng.gen_range(-half..=half)
    }

    /// Trace a hitscan ray; the nearest obstacle or target wins.
    ///
    /// `targets` are `(id, center, radius)`; a target hidden behind an
    /// obstacle is never hit.
    pub fn trace_ray(
        origin: Vec2,
        heading: f32,
        range: f32,
        obstacles: &[Aabb],
        targets: &[(Uuid, Vec2, f32)],
    ) -> Option<RayHit> {
        let dir = Vec2::from_angle(heading);

        let wall = obstacles
            .iter()
            .filter_map(|o| ray_aabb(origin, dir, o))
            .filter(|&t| t <= range)
            .min_by(|a, b| a.total_cmp(b));

        let target = targets
            .iter()
            .filter_map(|(id, center, radius)| {
                ray_circle(origin, dir, *center, *radius).map(|t| (*id, t))
            })
            .filter(|&(_, t)| t <= range)
            .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

        match (target, wall) {
            (Some((id, t)), Some(w)) if t < w => Some(RayHit::Target { id, distance: t }),
            (Some((id, t)), None) => Some(RayHit::Target { id, distance: t }),
            (_, Some(w)) => Some(RayHit::Obstacle { distance: w }),
            (None, None) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_projectile_expires_after_lifetime_ticks() {
        let mut projectile = Projectile {
            id: 1,
            owner_id: Uuid::new_v4(),
            position: Vec2::ZERO,
            heading: 0.0,
            speed: 10.0,
            damage: 5.0,
            radius: 0.5,
            ticks_remaining: 2,
        };

        assert!(projectile.update(0.1));
        assert!(projectile.update(0.1));
        assert!(!projectile.update(0.1));
        assert!((projectile.position.x - 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_apply_damage_floors_at_zero() {
        assert_eq!(CombatSystem::apply_damage(30.0, 10.0), (20.0, false));
        assert_eq!(CombatSystem::apply_damage(10.0, 25.0), (0.0, true));
    }

    #[test]
    fn test_spread_stays_inside_cone() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let spread = 0.2;
        for _ in 0..100 {
            let angle = CombatSystem::sample_spread(&mut rng, 1.0, spread);
            assert!((angle - 1.0).abs() <= spread * 0.5 + 1e-6);
        }
        assert_eq!(CombatSystem::sample_spread(&mut rng, 1.0, 0.0), 1.0);
    }

    #[test]
    fn test_ray_first_target_wins() {
        let near = Uuid::new_v4();
        let far = Uuid::new_v4();
        let targets = [
            (far, Vec2::new(20.0, 0.0), 1.0),
            (near, Vec2::new(10.0, 0.0), 1.0),
        ];
        let hit = CombatSystem::trace_ray(Vec2::ZERO, 0.0, 50.0, &[], &targets);
        assert_eq!(hit, Some(RayHit::Target { id: near, distance: 9.0 }));
    }

    #[test]
    fn test_obstacle_blocks_ray() {
        let target = Uuid::new_v4();
        let wall = Aabb::new(Vec2::new(5.0, -2.0), Vec2::new(6.0, 2.0));
        let hit = CombatSystem::trace_ray(
            Vec2::ZERO,
            0.0,
            50.0,
            &[wall],
            &[(target, Vec2::new(10.0, 0.0), 1.0)],
        );
        assert_eq!(hit, Some(RayHit::Obstacle { distance: 5.0 }));
    }

    #[test]
    fn test_ray_respects_range() {
        let target = Uuid::new_v4();
        let hit = CombatSystem::trace_ray(
            Vec2::ZERO,
            0.0,
            5.0,
            &[],
            &[(target, Vec2::new(10.0, 0.0), 1.0)],
        );
        assert_eq!(hit, None);
    }
}
