//! Game simulation modules

pub mod battle;
pub mod combat;
pub mod engine;
pub mod entity;
pub mod geometry;
pub mod growth;
pub mod intents;
pub mod physics;
pub mod pickups;
pub mod rules;
pub mod snapshot;

pub use combat::{FireOutcome, WeaponKind};
pub use engine::{Engine, EngineError, FireParams, Participant};
pub use entity::DeathCause;
pub use intents::{ActionKind, HeadingChange, Intent, IntentSlots};
pub use rules::{ArenaKind, ArenaRules};
pub use snapshot::{AgentView, GameEvent, Snapshot, Standing};
