//! Pending intents: one last-write-wins slot per entity

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Steering requested by an intent
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "radians", rename_all = "snake_case")]
pub enum HeadingChange {
    /// Face this heading
    Absolute(f32),
    /// Turn by this amount
    Delta(f32),
}

impl HeadingChange {
    /// Resulting heading normalized to 0..2π
    pub fn apply(self, current: f32) -> f32 {
        let heading = match self {
            Self::Absolute(h) => h,
            Self::Delta(d) => current + d,
        };
        heading.rem_euclid(std::f32::consts::TAU)
    }
}

/// One-shot action carried by an intent (combat arena)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Fire,
    Melee,
    Pickup,
}

/// Decoded, not-yet-applied command
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Intent {
    pub heading: Option<HeadingChange>,
    pub boost: Option<bool>,
    pub moving: Option<bool>,
    pub action: Option<ActionKind>,
    /// Aim for `action`, defaults to the entity heading
    pub aim: Option<f32>,
    pub issued_at_ms: u64,
}

/// Single-slot intent map, the only state written concurrently with the tick
#[derive(Debug, Default)]
pub struct IntentSlots {
    slots: DashMap<Uuid, Intent>,
}

impl IntentSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `intent` for `entity_id`, replacing any pending one.
    /// Returns true when an older intent was overwritten.
    pub fn put(&self, entity_id: Uuid, intent: Intent) -> bool {
        self.slots.insert(entity_id, intent).is_some()
    }

    /// Consume the pending intent for `entity_id`
    pub fn take(&self, entity_id: &Uuid) -> Option<Intent> {
        self.slots.remove(entity_id).map(|(_, intent)| intent)
    }

    pub fn pending(&self) -> usize {
        self.slots.len()
    }

    /// Drop intents for entities that are not in `keep`
    pub fn retain_known(&self, keep: impl Fn(&Uuid) -> bool) {
        self.slots.retain(|id, _| keep(id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::{PI, TAU};

    #[test]
    fn test_last_write_wins() {
        let slots = IntentSlots::new();
        let id = Uuid::new_v4();

        assert!(!slots.put(id, Intent { heading: Some(HeadingChange::Absolute(1.0)), ..Intent::default() }));
        assert!(slots.put(id, Intent { heading: Some(HeadingChange::Absolute(2.0)), ..Intent::default() }));

        assert_eq!(slots.pending(), 1);
        let intent = slots.take(&id).unwrap();
        assert_eq!(intent.heading, Some(HeadingChange::Absolute(2.0)));
        assert!(slots.take(&id).is_none());
    }

    #[test]
    fn test_duplicate_submission_is_idempotent() {
        let slots = IntentSlots::new();
        let id = Uuid::new_v4();
        let intent = Intent {
            heading: Some(HeadingChange::Delta(0.5)),
            boost: Some(true),
            ..Intent::default()
        };

        slots.put(id, intent.clone());
        slots.put(id, intent.clone());

        assert_eq!(slots.pending(), 1);
        assert_eq!(slots.take(&id), Some(intent));
    }

    #[test]
    fn test_heading_change_normalizes() {
        assert!((HeadingChange::Delta(PI).apply(PI * 1.5) - PI * 0.5).abs() < 1e-5);
        assert!((HeadingChange::Absolute(-PI * 0.5).apply(0.0) - PI * 1.5).abs() < 1e-5);
        assert!(HeadingChange::Absolute(TAU).apply(0.0) < 1e-5);
    }
}
