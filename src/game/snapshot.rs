//! Immutable end-of-tick snapshots and the events carried with them

use glam::Vec2;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::combat::{Projectile, WeaponKind};
use super::entity::{Body, DeathCause, Entity, HeldWeapon};
use super::pickups::Pickup;
use super::rules::ArenaKind;

/// Something notable that happened during a tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum GameEvent {
    Spawned {
        entity_id: Uuid,
    },
    Shot {
        shooter_id: Uuid,
        weapon: Option<WeaponKind>,
        x: f32,
        y: f32,
        direction: f32,
    },
    Hit {
        shooter_id: Uuid,
        target_id: Uuid,
        damage: f32,
    },
    Death {
        victim_id: Uuid,
        killer_id: Option<Uuid>,
        cause: DeathCause,
        /// No lives left
        eliminated: bool,
    },
    Respawned {
        entity_id: Uuid,
    },
    PickupTaken {
        entity_id: Uuid,
        pickup_id: u64,
    },
}

/// Public state of one entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityView {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cosmetic: Option<serde_json::Value>,
    pub position: Vec2,
    pub heading: f32,
    pub speed: f32,
    pub alive: bool,
    pub score: u32,
    pub kills: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub death_cause: Option<DeathCause>,

    // Growth arena
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segments: Option<Vec<Vec2>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boosting: Option<bool>,

    // Combat arena
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lives: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weapon: Option<HeldWeapon>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub respawn_at_ms: Option<u64>,
}

impl From<&Entity> for EntityView {
    fn from(e: &Entity) -> Self {
        let mut view = Self {
            id: e.id,
            name: e.display_name.clone(),
            cosmetic: e.cosmetic.clone(),
            position: e.position,
            heading: e.heading,
            speed: e.speed,
            alive: e.alive,
            score: e.score,
            kills: e.kills,
            death_cause: e.death_cause,
            segments: None,
            boosting: None,
            health: None,
            lives: None,
            weapon: None,
            respawn_at_ms: None,
        };

        match &e.body {
            Body::Growth(s) => {
                view.segments = Some(s.segments.clone());
                view.boosting = Some(s.boosting);
            }
            Body::Combat(f) => {
                view.health = Some(f.health);
                view.lives = Some(f.lives);
                view.weapon = f.weapon;
                view.respawn_at_ms = f.respawn_at_ms;
            }
        }

        view
    }
}

impl EntityView {
    /// Segment count (growth arena)
    pub fn length(&self) -> usize {
        self.segments.as_ref().map(Vec::len).unwrap_or(0)
    }
}

/// One leaderboard row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standing {
    pub placement: u32,
    pub id: Uuid,
    pub name: String,
    pub score: u32,
    pub kills: u32,
    pub alive: bool,
    pub alive_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub death_cause: Option<DeathCause>,
}

/// Complete public simulation state at tick end
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub match_id: Uuid,
    pub arena: ArenaKind,
    pub tick: u64,
    /// Wall-clock time of the tick (unix ms)
    pub time_ms: u64,
    pub entities: Vec<EntityView>,
    pub pickups: Vec<Pickup>,
    pub projectiles: Vec<Projectile>,
    pub leaderboard: Vec<Standing>,
    pub events: Vec<GameEvent>,
}

impl Snapshot {
    /// Snapshot of a match nobody has joined yet
    pub fn empty(match_id: Uuid, arena: ArenaKind, time_ms: u64) -> Self {
        Self {
            match_id,
            arena,
            tick: 0,
            time_ms,
            entities: Vec::new(),
            pickups: Vec::new(),
            projectiles: Vec::new(),
            leaderboard: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn entity(&self, id: &Uuid) -> Option<&EntityView> {
        self.entities.iter().find(|e| &e.id == id)
    }

    /// Snapshot scoped to one participant
    pub fn view_for(&self, id: &Uuid, remaining_ms: Option<u64>) -> AgentView {
        AgentView {
            match_id: self.match_id,
            tick: self.tick,
            remaining_ms,
            me: self.entity(id).cloned(),
            opponents: self
                .entities
                .iter()
                .filter(|e| &e.id != id)
                .cloned()
                .collect(),
            pickups: self.pickups.clone(),
            projectiles: self.projectiles.clone(),
            leaderboard: self.leaderboard.clone(),
        }
    }
}

/// What a polling agent sees
#[derive(Debug, Clone, Serialize)]
pub struct AgentView {
    pub match_id: Uuid,
    pub tick: u64,
    pub remaining_ms: Option<u64>,
    pub me: Option<EntityView>,
    pub opponents: Vec<EntityView>,
    pub pickups: Vec<Pickup>,
    pub projectiles: Vec<Projectile>,
    pub leaderboard: Vec<Standing>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entity::Serpent;

    #[test]
    fn test_view_for_splits_self_from_opponents() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        let mut snapshot = Snapshot::empty(Uuid::new_v4(), ArenaKind::Growth, 0);

        for (id, name) in [(me, "me"), (other, "other")] {
            let entity = Entity {
                id,
                display_name: name.to_string(),
                cosmetic: None,
                position: Vec2::ZERO,
                heading: 0.0,
                speed: 0.0,
                alive: true,
                score: 0,
                kills: 0,
                death_cause: None,
                spawned_at_ms: 0,
                died_at_ms: None,
                last_active_ms: 0,
                body: Body::Growth(Serpent::new(Vec2::ZERO, 0.0, 4, 10.0)),
            };
            snapshot.entities.push(EntityView::from(&entity));
        }

        let view = snapshot.view_for(&me, Some(1_000));
        assert_eq!(view.me.as_ref().map(|e| e.id), Some(me));
        assert_eq!(view.me.as_ref().map(EntityView::length), Some(4));
        assert_eq!(view.opponents.len(), 1);
        assert_eq!(view.opponents[0].id, other);
        assert_eq!(view.remaining_ms, Some(1_000));
    }
}
