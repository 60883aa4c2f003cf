//! World pickups: food, golden food and weapon crates

use glam::Vec2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::combat::WeaponKind;
use super::geometry::circles_overlap;

/// What a pickup grants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PickupKind {
    Food { value: u32 },
    GoldenFood { value: u32 },
    Weapon { weapon: WeaponKind, ammo: u32 },
}

impl PickupKind {
    /// Score/growth value (zero for weapons)
    pub fn value(&self) -> u32 {
        match self {
            Self::Food { value } | Self::GoldenFood { value } => *value,
            Self::Weapon { .. } => 0,
        }
    }

    pub fn is_weapon(&self) -> bool {
        matches!(self, Self::Weapon { .. })
    }
}

/// A consumable world object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pickup {
    pub id: u64,
    pub position: Vec2,
    #[serde(flatten)]
    pub kind: PickupKind,
    /// Left behind by a death or a boost (never expires mid-match)
    pub dropped: bool,
}

/// Live pickups, iterated in creation order
#[derive(Debug, Default)]
pub struct PickupPool {
    pickups: BTreeMap<u64, Pickup>,
    next_id: u64,
}

impl PickupPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&mut self, position: Vec2, kind: PickupKind, dropped: bool) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        self.pickups.insert(
            id,
            Pickup {
                id,
                position,
                kind,
                dropped,
            },
        );
        id
    }

    /// Remove a pickup; `None` if someone already took it
    pub fn take(&mut self, id: u64) -> Option<Pickup> {
        self.pickups.remove(&id)
    }

    pub fn get(&self, id: u64) -> Option<&Pickup> {
        self.pickups.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pickup> {
        self.pickups.values()
    }

    pub fn len(&self) -> usize {
        self.pickups.len()
    }

    pub fn count_where(&self, pred: impl Fn(&Pickup) -> bool) -> usize {
        self.pickups.values().filter(|p| pred(p)).count()
    }

    /// Pickups overlapping a circle, in id order
    pub fn touching(&self, center: Vec2, radius: f32, pickup_radius: f32) -> Vec<u64> {
        self.pickups
            .values()
            .filter(|p| circles_overlap(center, radius, p.position, pickup_radius))
            .map(|p| p.id)
            .collect()
    }
}
