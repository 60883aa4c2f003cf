//! Simulated participants (authoritative state, mutated only by the engine)

use glam::Vec2;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::combat::WeaponKind;
use super::intents::ActionKind;

/// Why an entity died or was eliminated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeathCause {
    /// Head ran into another chain's body
    Collision,
    /// Lost a head-to-head collision (or tied it)
    HeadOn,
    /// Ran into its own body
    SelfCollision,
    /// Left the arena under the wall-death policy
    Boundary,
    /// Hit by a bullet or projectile
    Shot,
    Melee,
    /// Agent went silent past the idle timeout
    Idle,
}

/// Weapon currently held by a fighter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeldWeapon {
    pub kind: WeaponKind,
    pub ammo: u32,
}

/// Growth arena body: ordered head-first segment chain
#[derive(Debug, Clone)]
pub struct Serpent {
    /// Segment centers, head first (`segments[0]` is the head)
    pub segments: Vec<Vec2>,
    pub boosting: bool,
    /// Boosted ticks since the last shed
    pub boost_ticks: u32,
    /// Eaten value not yet turned into segments
    pub pending_growth: u32,
}

impl Serpent {
    /// Straight chain trailing behind `head` opposite to `heading`
    pub fn new(head: Vec2, heading: f32, length: usize, spacing: f32) -> Self {
        let back = -Vec2::from_angle(heading) * spacing;
        let segments = (0..length.max(1)).map(|i| head + back * i as f32).collect();
        Self {
            segments,
            boosting: false,
            boost_ticks: 0,
            pending_growth: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn head(&self) -> Vec2 {
        self.segments[0]
    }
}

/// Combat arena body: health, lives and equipment
#[derive(Debug, Clone)]
pub struct Fighter {
    pub health: f32,
    pub lives: u32,
    pub weapon: Option<HeldWeapon>,
    /// Timestamp (unix ms) at which the held weapon may fire again
    pub weapon_ready_at_ms: u64,
    pub melee_ready_at_ms: u64,
    pub moving: bool,
    /// Set while waiting to respawn
    pub respawn_at_ms: Option<u64>,
    /// Action requested by the last applied intent, executed in the combat phase
    pub pending_action: Option<ActionKind>,
    /// Aim used by the pending action (defaults to heading)
    pub aim: Option<f32>,
    pub damage_dealt: f32,
    pub damage_taken: f32,
}

impl Fighter {
    pub fn new(max_health: f32, lives: u32) -> Self {
        Self {
            health: max_health,
            lives,
            weapon: None,
            weapon_ready_at_ms: 0,
            melee_ready_at_ms: 0,
            moving: false,
            respawn_at_ms: None,
            pending_action: None,
            aim: None,
            damage_dealt: 0.0,
            damage_taken: 0.0,
        }
    }
}

/// Variant-specific part of an entity
#[derive(Debug, Clone)]
pub enum Body {
    Growth(Serpent),
    Combat(Fighter),
}

/// Participant in a match
#[derive(Debug, Clone)]
pub struct Entity {
    pub id: Uuid,
    pub display_name: String,
    /// Opaque cosmetic reference, never interpreted by the simulation
    pub cosmetic: Option<serde_json::Value>,

    pub position: Vec2,
    /// Radians
    pub heading: f32,
    /// Current speed in units per second
    pub speed: f32,
    pub alive: bool,

    pub score: u32,
    pub kills: u32,
    pub death_cause: Option<DeathCause>,

    pub spawned_at_ms: u64,
    pub died_at_ms: Option<u64>,
    /// Last time an intent from this entity's agent was applied
    pub last_active_ms: u64,

    pub body: Body,
}

impl Entity {
    pub fn serpent(&self) -> Option<&Serpent> {
        match &self.body {
            Body::Growth(s) => Some(s),
            Body::Combat(_) => None,
        }
    }

    pub fn fighter(&self) -> Option<&Fighter> {
        match &self.body {
            Body::Combat(f) => Some(f),
            Body::Growth(_) => None,
        }
    }

    pub fn fighter_mut(&mut self) -> Option<&mut Fighter> {
        match &mut self.body {
            Body::Combat(f) => Some(f),
            Body::Growth(_) => None,
        }
    }

    /// Chain length (growth) or zero
    pub fn length(&self) -> usize {
        self.serpent().map(Serpent::len).unwrap_or(0)
    }

    /// Out of the match for good (a respawning fighter is not)
    pub fn is_eliminated(&self) -> bool {
        match &self.body {
            Body::Growth(_) => !self.alive,
            Body::Combat(f) => !self.alive && f.lives == 0,
        }
    }

    /// Milliseconds spent in play, measured to death or `now_ms`
    pub fn alive_time_ms(&self, now_ms: u64) -> u64 {
        let end = if self.is_eliminated() {
            self.died_at_ms.unwrap_or(now_ms)
        } else {
            now_ms
        };
        end.saturating_sub(self.spawned_at_ms)
    }

    /// Mark dead at `now_ms`
    pub fn kill(&mut self, cause: DeathCause, now_ms: u64) {
        self.alive = false;
        self.speed = 0.0;
        self.death_cause = Some(cause);
        self.died_at_ms = Some(now_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serpent_trails_behind_heading() {
        let serpent = Serpent::new(Vec2::ZERO, 0.0, 3, 10.0);
        assert_eq!(serpent.len(), 3);
        assert!((serpent.segments[2] - Vec2::new(-20.0, 0.0)).length() < 1e-4);
    }

    #[test]
    fn test_respawning_fighter_is_not_eliminated() {
        let mut entity = Entity {
            id: Uuid::new_v4(),
            display_name: "f".to_string(),
            cosmetic: None,
            position: Vec2::ZERO,
            heading: 0.0,
            speed: 0.0,
            alive: true,
            score: 0,
            kills: 0,
            death_cause: None,
            spawned_at_ms: 1_000,
            died_at_ms: None,
            last_active_ms: 1_000,
            body: Body::Combat(Fighter::new(100.0, 2)),
        };

        entity.kill(DeathCause::Shot, 5_000);
        assert!(!entity.is_eliminated());
        assert_eq!(entity.alive_time_ms(9_000), 8_000);

        entity.fighter_mut().unwrap().lives = 0;
        assert!(entity.is_eliminated());
        assert_eq!(entity.alive_time_ms(9_000), 4_000);
    }
}
