//! Arena variants and their tuning

use glam::Vec2;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::geometry::Aabb;

/// Which arena a server runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArenaKind {
    /// Top-down growth-and-survival arena (segment chains)
    Growth,
    /// Last-one-standing combat arena (health, lives, weapons)
    Combat,
}

impl FromStr for ArenaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "growth" | "snake" => Ok(Self::Growth),
            "combat" | "shooter" => Ok(Self::Combat),
            other => Err(format!("unknown arena kind: {other}")),
        }
    }
}

/// What happens when an entity crosses the arena bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryPolicy {
    /// Leaving the bounds kills
    Kill,
    /// Position wraps to the opposite edge
    Wrap,
    /// Position is held at the edge
    Clamp,
}

impl FromStr for BoundaryPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "kill" | "wall_death" => Ok(Self::Kill),
            "wrap" => Ok(Self::Wrap),
            "clamp" => Ok(Self::Clamp),
            other => Err(format!("unknown boundary policy: {other}")),
        }
    }
}

/// Growth arena tuning
#[derive(Debug, Clone)]
pub struct GrowthRules {
    pub bounds: Aabb,
    pub boundary: BoundaryPolicy,
    /// Units per second
    pub base_speed: f32,
    pub boost_multiplier: f32,
    /// Distance kept between consecutive segments
    pub segment_spacing: f32,
    pub initial_length: usize,
    /// Boosting never sheds below this length
    pub min_length: usize,
    pub head_radius: f32,
    pub body_radius: f32,
    /// Boosted ticks per shed segment
    pub boost_shed_ticks: u32,
    /// Points of another chain skipped before the body test (the head itself)
    pub body_skip: usize,
    pub self_collision: bool,
    /// Points of an entity's own chain skipped for the self test
    pub self_skip: usize,
    pub food_radius: f32,
    /// Food count the spawner replenishes toward
    pub food_floor: usize,
    pub food_spawn_per_tick: usize,
    pub food_value: u32,
    pub golden_food_value: u32,
    pub golden_food_chance: f64,
    /// Eaten value needed to grow one segment
    pub growth_per_segment: u32,
    /// Value of every food pellet a dead chain leaves per segment
    pub death_drop_value: u32,
    /// Value of the pellet a boost shed leaves (also deducted from score)
    pub boost_drop_value: u32,
}

impl Default for GrowthRules {
    fn default() -> Self {
        Self {
            bounds: Aabb::centered(2000.0, 2000.0),
            boundary: BoundaryPolicy::Kill,
            base_speed: 120.0,
            boost_multiplier: 2.0,
            segment_spacing: 10.0,
            initial_length: 10,
            min_length: 5,
            head_radius: 8.0,
            body_radius: 8.0,
            boost_shed_ticks: 10,
            body_skip: 1,
            self_collision: false,
            self_skip: 4,
            food_radius: 5.0,
            food_floor: 200,
            food_spawn_per_tick: 5,
            food_value: 1,
            golden_food_value: 5,
            golden_food_chance: 0.02,
            growth_per_segment: 2,
            death_drop_value: 1,
            boost_drop_value: 1,
        }
    }
}

/// Melee stats (always available, unlimited use)
#[derive(Debug, Clone, Copy)]
pub struct MeleeStats {
    pub damage: f32,
    pub range: f32,
    pub cooldown_ms: u64,
}

/// Combat arena tuning
#[derive(Debug, Clone)]
pub struct CombatRules {
    pub bounds: Aabb,
    pub boundary: BoundaryPolicy,
    /// Cover that blocks movement, rays and projectiles
    pub obstacles: Vec<Aabb>,
    /// Units per second while moving
    pub move_speed: f32,
    pub body_radius: f32,
    pub max_health: f32,
    pub lives: u32,
    pub respawn_delay_ms: u64,
    pub pickup_radius: f32,
    /// Weapon pickups the spawner replenishes toward
    pub weapon_floor: usize,
    pub weapon_spawn_per_tick: usize,
    pub melee: MeleeStats,
    /// Score awarded per kill (damage dealt also scores)
    pub kill_bonus: u32,
}

impl Default for CombatRules {
    fn default() -> Self {
        let pillar = |x: f32, y: f32| Aabb::new(Vec2::new(x - 3.0, y - 3.0), Vec2::new(x + 3.0, y + 3.0));
        Self {
            bounds: Aabb::centered(120.0, 120.0),
            boundary: BoundaryPolicy::Clamp,
            obstacles: vec![
                pillar(-30.0, -30.0),
                pillar(30.0, -30.0),
                pillar(-30.0, 30.0),
                pillar(30.0, 30.0),
                Aabb::new(Vec2::new(-8.0, -2.0), Vec2::new(8.0, 2.0)),
            ],
            move_speed: 8.0,
            body_radius: 0.6,
            max_health: 100.0,
            lives: 3,
            respawn_delay_ms: 3_000,
            pickup_radius: 1.2,
            weapon_floor: 6,
            weapon_spawn_per_tick: 1,
            melee: MeleeStats {
                damage: 25.0,
                range: 2.0,
                cooldown_ms: 600,
            },
            kill_bonus: 100,
        }
    }
}

/// Arena strategy: one tick pipeline, variant-specific rules
#[derive(Debug, Clone)]
pub enum ArenaRules {
    Growth(GrowthRules),
    Combat(CombatRules),
}

impl ArenaRules {
    /// Default rules for an arena kind
    pub fn for_kind(kind: ArenaKind) -> Self {
        match kind {
            ArenaKind::Growth => Self::Growth(GrowthRules::default()),
            ArenaKind::Combat => Self::Combat(CombatRules::default()),
        }
    }

    pub fn kind(&self) -> ArenaKind {
        match self {
            Self::Growth(_) => ArenaKind::Growth,
            Self::Combat(_) => ArenaKind::Combat,
        }
    }

    pub fn bounds(&self) -> Aabb {
        match self {
            Self::Growth(r) => r.bounds,
            Self::Combat(r) => r.bounds,
        }
    }

    pub fn boundary(&self) -> BoundaryPolicy {
        match self {
            Self::Growth(r) => r.boundary,
            Self::Combat(r) => r.boundary,
        }
    }

    /// Default rules for `kind` with an optional boundary override
    pub fn configured(kind: ArenaKind, boundary: Option<BoundaryPolicy>) -> Self {
        let mut rules = Self::for_kind(kind);
        if let Some(policy) = boundary {
            match &mut rules {
                Self::Growth(r) => r.boundary = policy,
                Self::Combat(r) => r.boundary = policy,
            }
        }
        rules.normalized()
    }

    /// Clamp values the tick pipeline relies on; a chain never loses its head
    pub fn normalized(mut self) -> Self {
        if let Self::Growth(r) = &mut self {
            r.min_length = r.min_length.max(1);
            r.initial_length = r.initial_length.max(r.min_length);
            r.boost_shed_ticks = r.boost_shed_ticks.max(1);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_kind_parses_aliases() {
        assert_eq!("snake".parse::<ArenaKind>(), Ok(ArenaKind::Growth));
        assert_eq!("Combat".parse::<ArenaKind>(), Ok(ArenaKind::Combat));
        assert!("chess".parse::<ArenaKind>().is_err());
    }

    #[test]
    fn test_boundary_override_applies_to_either_arena() {
        assert_eq!("Wrap".parse::<BoundaryPolicy>(), Ok(BoundaryPolicy::Wrap));
        assert!("bounce".parse::<BoundaryPolicy>().is_err());

        let growth = ArenaRules::configured(ArenaKind::Growth, Some(BoundaryPolicy::Clamp));
        assert_eq!(growth.boundary(), BoundaryPolicy::Clamp);
        let combat = ArenaRules::configured(ArenaKind::Combat, None);
        assert_eq!(combat.boundary(), BoundaryPolicy::Clamp);
        let combat = ArenaRules::configured(ArenaKind::Combat, Some(BoundaryPolicy::Kill));
        assert_eq!(combat.boundary(), BoundaryPolicy::Kill);
    }

    #[test]
    fn test_zero_min_length_is_raised_to_one() {
        let rules = ArenaRules::Growth(GrowthRules {
            min_length: 0,
            initial_length: 0,
            ..GrowthRules::default()
        })
        .normalized();
        let ArenaRules::Growth(growth) = rules else {
            panic!("expected growth rules");
        };
        assert_eq!(growth.min_length, 1);
        assert_eq!(growth.initial_length, 1);
    }

    #[test]
    fn test_default_obstacles_sit_inside_bounds() {
        let rules = CombatRules::default();
        for obstacle in &rules.obstacles {
            assert!(rules.bounds.contains(obstacle.min));
            assert!(rules.bounds.contains(obstacle.max));
        }
    }
}
