//! Simulation engine: the fixed-order tick pipeline shared by both arenas

use glam::Vec2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use super::battle;
use super::combat::{FireOutcome, Projectile};
use super::entity::{Body, DeathCause, Entity, Fighter, Serpent};
use super::geometry::Aabb;
use super::growth;
use super::intents::{Intent, IntentSlots};
use super::physics::{BoundaryOutcome, PhysicsSystem};
use super::pickups::PickupPool;
use super::rules::{ArenaKind, ArenaRules};
use super::snapshot::{EntityView, GameEvent, Snapshot, Standing};

/// Who is being spawned
#[derive(Debug, Clone)]
pub struct Participant {
    pub id: Uuid,
    pub display_name: String,
    pub cosmetic: Option<serde_json::Value>,
}

/// Parameters of a fire-or-use request
#[derive(Debug, Clone, Copy, Default)]
pub struct FireParams {
    /// Aim in radians, defaults to the entity heading
    pub aim: Option<f32>,
}

/// Engine errors (never fatal to the tick loop)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("Entity not found: {0}")]
    EntityNotFound(Uuid),

    #[error("Entity is not alive: {0}")]
    NotAlive(Uuid),

    #[error("Entity already spawned: {0}")]
    AlreadySpawned(Uuid),

    #[error("Action not available in the {0:?} arena")]
    WrongArena(ArenaKind),
}

/// Mutable simulation state owned by one engine
pub struct World {
    pub tick: u64,
    /// Iterated in id order, which fixes resolution order
    pub entities: BTreeMap<Uuid, Entity>,
    pub pickups: PickupPool,
    pub projectiles: Vec<Projectile>,
    pub next_projectile_id: u64,
    pub rng: ChaCha8Rng,
    /// Events since the last snapshot
    pub events: Vec<GameEvent>,
    /// Entities that died this tick, in death order
    pub fallen: Vec<Uuid>,
}

impl World {
    pub fn new(seed: u64) -> Self {
        Self {
            tick: 0,
            entities: BTreeMap::new(),
            pickups: PickupPool::new(),
            projectiles: Vec::new(),
            next_projectile_id: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
            events: Vec::new(),
            fallen: Vec::new(),
        }
    }

    pub fn alive_ids(&self) -> Vec<Uuid> {
        self.entities
            .values()
            .filter(|e| e.alive)
            .map(|e| e.id)
            .collect()
    }

    /// Uniform random point inside `bounds` shrunk by `margin`
    pub fn random_point(&mut self, bounds: &Aabb, margin: f32) -> Vec2 {
        let min = bounds.min + Vec2::splat(margin);
        let max = (bounds.max - Vec2::splat(margin)).max(min + Vec2::splat(0.001));
        Vec2::new(
            self.rng.gen_range(min.x..max.x),
            self.rng.gen_range(min.y..max.y),
        )
    }

    /// Mark an entity dead and credit the killer.
    ///
    /// Variant bookkeeping (lives, drops) happens before the call.
    pub fn record_death(
        &mut self,
        victim: Uuid,
        killer: Option<Uuid>,
        cause: DeathCause,
        now_ms: u64,
        kill_bonus: u32,
    ) {
        let Some(entity) = self.entities.get_mut(&victim) else {
            return;
        };
        if !entity.alive {
            return;
        }

        entity.kill(cause, now_ms);
        let eliminated = entity.is_eliminated();

        let killer = killer.filter(|k| *k != victim);
        if let Some(k) = killer.and_then(|k| self.entities.get_mut(&k)) {
            k.kills += 1;
            k.score = k.score.saturating_add(kill_bonus);
        }

        self.events.push(GameEvent::Death {
            victim_id: victim,
            killer_id: killer,
            cause,
            eliminated,
        });
        self.fallen.push(victim);
    }
}

/// The authoritative simulation of one match
pub struct Engine {
    match_id: Uuid,
    rules: ArenaRules,
    world: World,
    intents: Arc<IntentSlots>,
    max_idle_ms: u64,
    /// Participants ever spawned
    participated: usize,
}

impl Engine {
    pub fn new(
        match_id: Uuid,
        rules: ArenaRules,
        seed: u64,
        max_idle_ms: u64,
        intents: Arc<IntentSlots>,
    ) -> Self {
        Self {
            match_id,
            rules: rules.normalized(),
            world: World::new(seed),
            intents,
            max_idle_ms,
            participated: 0,
        }
    }

    pub fn match_id(&self) -> Uuid {
        self.match_id
    }

    pub fn kind(&self) -> ArenaKind {
        self.rules.kind()
    }

    pub fn entity(&self, id: &Uuid) -> Option<&Entity> {
        self.world.entities.get(id)
    }

    /// Store an intent in the entity's last-write-wins slot
    pub fn enqueue_intent(&self, entity_id: Uuid, intent: Intent) {
        self.intents.put(entity_id, intent);
    }

    /// Add a participant with default state at a free spawn point
    pub fn spawn(&mut self, participant: Participant, now_ms: u64) -> Result<(), EngineError> {
        if self.world.entities.contains_key(&participant.id) {
            return Err(EngineError::AlreadySpawned(participant.id));
        }

        let (position, heading, body) = match &self.rules {
            ArenaRules::Growth(rules) => {
                let position = growth::spawn_point(&mut self.world, rules);
                let heading = self.world.rng.gen_range(0.0..std::f32::consts::TAU);
                let serpent = Serpent::new(position, heading, rules.initial_length, rules.segment_spacing);
                (position, heading, Body::Growth(serpent))
            }
            ArenaRules::Combat(rules) => {
                let position = battle::spawn_point(&mut self.world, rules);
                let heading = self.world.rng.gen_range(0.0..std::f32::consts::TAU);
                (position, heading, Body::Combat(Fighter::new(rules.max_health, rules.lives)))
            }
        };

        let id = participant.id;
        self.world.entities.insert(
            id,
            Entity {
                id,
                display_name: participant.display_name,
                cosmetic: participant.cosmetic,
                position,
                heading,
                speed: 0.0,
                alive: true,
                score: 0,
                kills: 0,
                death_cause: None,
                spawned_at_ms: now_ms,
                died_at_ms: None,
                last_active_ms: now_ms,
                body,
            },
        );
        self.participated += 1;
        self.world.events.push(GameEvent::Spawned { entity_id: id });

        Ok(())
    }

    /// Fire the held weapon (melee when empty-handed) right away
    pub fn fire_or_use_item(
        &mut self,
        entity_id: Uuid,
        params: FireParams,
        now_ms: u64,
    ) -> Result<FireOutcome, EngineError> {
        match &self.rules {
            ArenaRules::Combat(rules) => {
                battle::fire_or_use(&mut self.world, rules, entity_id, params.aim, now_ms)
            }
            ArenaRules::Growth(_) => Err(EngineError::WrongArena(ArenaKind::Growth)),
        }
    }

    /// Run one simulation tick and return its snapshot
    pub fn tick(&mut self, elapsed: Duration, now_ms: u64) -> Snapshot {
        let dt = elapsed.as_secs_f32();
        self.world.tick += 1;

        if let ArenaRules::Combat(rules) = &self.rules {
            battle::process_respawns(&mut self.world, rules, now_ms);
        }

        // 1. Intents, then idle eviction
        self.apply_intents();
        self.evict_idle(now_ms);

        // 2. Movement
        match &self.rules {
            ArenaRules::Growth(rules) => growth::advance(&mut self.world, rules, dt),
            ArenaRules::Combat(rules) => battle::advance(&mut self.world, rules, dt),
        }

        // 3. Projectiles
        if let ArenaRules::Combat(rules) = &self.rules {
            battle::advance_projectiles(&mut self.world, rules, dt);
        }

        // 4. Pickups
        match &self.rules {
            ArenaRules::Growth(rules) => growth::resolve_pickups(&mut self.world, rules),
            ArenaRules::Combat(rules) => battle::resolve_pickups(&mut self.world, rules),
        }

        // 5. Combat and collisions
        match &self.rules {
            ArenaRules::Growth(rules) => growth::resolve_collisions(&mut self.world, rules, now_ms),
            ArenaRules::Combat(rules) => battle::resolve_combat(&mut self.world, rules, now_ms),
        }

        // 6. Boundary policy
        self.apply_boundary(now_ms);

        // 7. Pickup population
        match &self.rules {
            ArenaRules::Growth(rules) => growth::maintain_pickups(&mut self.world, rules),
            ArenaRules::Combat(rules) => battle::maintain_pickups(&mut self.world, rules),
        }
        self.world.fallen.clear();

        // 8 + 9. Leaderboard and snapshot
        self.snapshot(now_ms)
    }

    /// Build a snapshot, handing over the events gathered since the last one
    pub fn snapshot(&mut self, now_ms: u64) -> Snapshot {
        Snapshot {
            match_id: self.match_id,
            arena: self.rules.kind(),
            tick: self.world.tick,
            time_ms: now_ms,
            entities: self.world.entities.values().map(EntityView::from).collect(),
            pickups: self.world.pickups.iter().cloned().collect(),
            projectiles: self.world.projectiles.clone(),
            leaderboard: self.standings(now_ms),
            events: std::mem::take(&mut self.world.events),
        }
    }

    /// Ranked standings.
    ///
    /// Growth: cumulative score. Combat: survivors first, then alive time,
    /// with score as tie-break. Entity id breaks remaining ties.
    pub fn standings(&self, now_ms: u64) -> Vec<Standing> {
        let mut rows: Vec<(&Entity, u64)> = self
            .world
            .entities
            .values()
            .map(|e| (e, e.alive_time_ms(now_ms)))
            .collect();

        match self.rules.kind() {
            ArenaKind::Growth => rows.sort_by(|(a, _), (b, _)| b.score.cmp(&a.score).then(a.id.cmp(&b.id))),
            ArenaKind::Combat => rows.sort_by(|(a, at), (b, bt)| {
                a.is_eliminated()
                    .cmp(&b.is_eliminated())
                    .then(bt.cmp(at))
                    .then(b.score.cmp(&a.score))
                    .then(a.id.cmp(&b.id))
            }),
        }

        rows.into_iter()
            .enumerate()
            .map(|(i, (e, alive_time_ms))| Standing {
                placement: (i + 1) as u32,
                id: e.id,
                name: e.display_name.clone(),
                score: e.score,
                kills: e.kills,
                alive: e.alive,
                alive_time_ms,
                death_cause: e.death_cause,
            })
            .collect()
    }

    /// Terminal condition: nobody left in play, or (combat) a last one standing
    pub fn is_terminal(&self) -> bool {
        if self.participated == 0 {
            return false;
        }

        let in_play = self
            .world
            .entities
            .values()
            .filter(|e| !e.is_eliminated())
            .count();

        match self.rules.kind() {
            ArenaKind::Growth => in_play == 0,
            ArenaKind::Combat => in_play == 0 || (self.participated >= 2 && in_play <= 1),
        }
    }

    /// Step 1: consume each entity's pending intent (dead entities' intents are dropped)
    fn apply_intents(&mut self) {
        let world = &mut self.world;
        self.intents.retain_known(|id| world.entities.contains_key(id));

        for entity in world.entities.values_mut() {
            let Some(intent) = self.intents.take(&entity.id) else {
                continue;
            };
            if !entity.alive {
                debug!(entity_id = %entity.id, "Dropping intent for dead entity");
                continue;
            }

            entity.last_active_ms = entity.last_active_ms.max(intent.issued_at_ms);
            if let Some(change) = intent.heading {
                entity.heading = change.apply(entity.heading);
            }

            match &mut entity.body {
                Body::Growth(serpent) => {
                    if let Some(boost) = intent.boost {
                        serpent.boosting = boost;
                    }
                }
                Body::Combat(fighter) => {
                    if let Some(moving) = intent.moving {
                        fighter.moving = moving;
                    }
                    if intent.action.is_some() {
                        fighter.pending_action = intent.action;
                        fighter.aim = intent.aim;
                    }
                }
            }
        }
    }

    /// Agents silent past the idle timeout are eliminated
    fn evict_idle(&mut self, now_ms: u64) {
        let idle: Vec<Uuid> = self
            .world
            .entities
            .values()
            .filter(|e| e.alive && now_ms.saturating_sub(e.last_active_ms) > self.max_idle_ms)
            .map(|e| e.id)
            .collect();

        for id in idle {
            debug!(match_id = %self.match_id, entity_id = %id, "Evicting idle entity");
            if let Some(fighter) = self.world.entities.get_mut(&id).and_then(Entity::fighter_mut) {
                fighter.lives = 0;
            }
            self.world.record_death(id, None, DeathCause::Idle, now_ms, 0);
        }
    }

    /// Step 6: wall-death, wrap or clamp
    fn apply_boundary(&mut self, now_ms: u64) {
        let bounds = self.rules.bounds();
        let policy = self.rules.boundary();
        let mut out_of_bounds = Vec::new();

        for entity in self.world.entities.values_mut().filter(|e| e.alive) {
            match PhysicsSystem::apply_boundary(entity.position, &bounds, policy) {
                BoundaryOutcome::Inside(_) => {}
                BoundaryOutcome::Killed => out_of_bounds.push(entity.id),
                BoundaryOutcome::Wrapped(p) => {
                    // The whole chain moves with its head so the body stays behind it
                    let shift = p - entity.position;
                    entity.position = p;
                    if let Body::Growth(serpent) = &mut entity.body {
                        for segment in &mut serpent.segments {
                            *segment += shift;
                        }
                    }
                }
                BoundaryOutcome::Clamped(p) => {
                    entity.position = p;
                    if let Body::Growth(serpent) = &mut entity.body {
                        if let Some(head) = serpent.segments.first_mut() {
                            *head = p;
                        }
                    }
                }
            }
        }

        for id in out_of_bounds {
            match &self.rules {
                ArenaRules::Combat(rules) => {
                    battle::fall(&mut self.world, rules, id, None, DeathCause::Boundary, now_ms)
                }
                ArenaRules::Growth(_) => {
                    self.world.record_death(id, None, DeathCause::Boundary, now_ms, 0)
                }
            }
        }
    }

    #[cfg(test)]
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::intents::HeadingChange;
    use crate::game::rules::{BoundaryPolicy, GrowthRules};

    const DT: Duration = Duration::from_millis(50);

    fn quiet_growth_rules() -> GrowthRules {
        GrowthRules {
            food_floor: 0,
            boundary: BoundaryPolicy::Wrap,
            ..GrowthRules::default()
        }
    }

    fn engine_with(rules: ArenaRules) -> Engine {
        Engine::new(Uuid::new_v4(), rules, 42, 3_600_000, Arc::new(IntentSlots::new()))
    }

    fn join(engine: &mut Engine, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        engine
            .spawn(
                Participant {
                    id,
                    display_name: name.to_string(),
                    cosmetic: None,
                },
                0,
            )
            .unwrap();
        id
    }

    #[test]
    fn test_spawn_twice_is_rejected() {
        let mut engine = engine_with(ArenaRules::Growth(quiet_growth_rules()));
        let id = join(&mut engine, "a");
        let again = engine.spawn(
            Participant {
                id,
                display_name: "a".to_string(),
                cosmetic: None,
            },
            0,
        );
        assert_eq!(again, Err(EngineError::AlreadySpawned(id)));
    }

    #[test]
    fn test_latest_intent_applied_once() {
        let mut engine = engine_with(ArenaRules::Growth(quiet_growth_rules()));
        let id = join(&mut engine, "a");

        engine.enqueue_intent(id, Intent { heading: Some(HeadingChange::Absolute(1.0)), ..Intent::default() });
        engine.enqueue_intent(id, Intent { heading: Some(HeadingChange::Absolute(2.0)), ..Intent::default() });
        engine.tick(DT, 50);
        assert!((engine.entity(&id).unwrap().heading - 2.0).abs() < 1e-6);

        // Slot was cleared: the next tick keeps the last heading
        engine.tick(DT, 100);
        assert!((engine.entity(&id).unwrap().heading - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_intent_for_unknown_entity_is_ignored() {
        let mut engine = engine_with(ArenaRules::Growth(quiet_growth_rules()));
        join(&mut engine, "a");
        engine.enqueue_intent(Uuid::new_v4(), Intent::default());
        engine.tick(DT, 50);
        assert_eq!(engine.intents.pending(), 0);
    }

    #[test]
    fn test_idle_entity_is_eliminated() {
        let mut engine = Engine::new(
            Uuid::new_v4(),
            ArenaRules::Growth(quiet_growth_rules()),
            1,
            1_000,
            Arc::new(IntentSlots::new()),
        );
        let id = join(&mut engine, "silent");

        engine.tick(DT, 900);
        assert!(engine.entity(&id).unwrap().alive);

        let snapshot = engine.tick(DT, 1_001);
        let entity = engine.entity(&id).unwrap();
        assert!(!entity.alive);
        assert_eq!(entity.death_cause, Some(DeathCause::Idle));
        assert!(snapshot.events.iter().any(|e| matches!(
            e,
            GameEvent::Death { cause: DeathCause::Idle, eliminated: true, .. }
        )));
        assert!(engine.is_terminal());
    }

    #[test]
    fn test_wall_death_policy() {
        let mut engine = engine_with(ArenaRules::Growth(GrowthRules {
            food_floor: 0,
            boundary: BoundaryPolicy::Kill,
            ..GrowthRules::default()
        }));
        let id = join(&mut engine, "a");
        {
            let entity = engine.world_mut().entities.get_mut(&id).unwrap();
            entity.position = Vec2::new(998.0, 0.0);
            entity.heading = 0.0;
            if let Body::Growth(s) = &mut entity.body {
                *s = Serpent::new(entity.position, 0.0, 10, 10.0);
            }
        }

        engine.tick(DT, 50);
        let entity = engine.entity(&id).unwrap();
        assert!(!entity.alive);
        assert_eq!(entity.death_cause, Some(DeathCause::Boundary));
    }

    #[test]
    fn test_wrapped_chain_stays_behind_its_head() {
        let mut engine = engine_with(ArenaRules::Growth(quiet_growth_rules()));
        let id = join(&mut engine, "a");
        {
            let entity = engine.world_mut().entities.get_mut(&id).unwrap();
            entity.position = Vec2::new(997.0, 0.0);
            entity.heading = 0.0;
            entity.body = Body::Growth(Serpent::new(entity.position, 0.0, 10, 10.0));
        }

        for t in 1..=5 {
            engine.tick(DT, t * 50);
        }

        let entity = engine.entity(&id).unwrap();
        assert!(entity.alive);
        assert!(entity.position.x < -900.0);
        let segments = &entity.serpent().unwrap().segments;
        assert!(segments[0].distance(entity.position) < 1e-3);
        for pair in segments.windows(2) {
            assert!(pair[0].x > pair[1].x, "segment ahead of the one before it: {pair:?}");
            assert!(pair[0].distance(pair[1]) <= 10.0 + 1e-3);
        }
    }

    #[test]
    fn test_boosting_with_zero_min_length_keeps_the_head() {
        let mut engine = engine_with(ArenaRules::Growth(GrowthRules {
            min_length: 0,
            boost_shed_ticks: 1,
            ..quiet_growth_rules()
        }));
        let id = join(&mut engine, "a");
        {
            let entity = engine.world_mut().entities.get_mut(&id).unwrap();
            entity.position = Vec2::ZERO;
            entity.heading = 0.0;
            entity.body = Body::Growth(Serpent::new(Vec2::ZERO, 0.0, 3, 10.0));
        }

        for t in 1..=6 {
            engine.enqueue_intent(id, Intent { boost: Some(true), ..Intent::default() });
            engine.tick(DT, t * 50);
        }

        let entity = engine.entity(&id).unwrap();
        assert!(entity.alive);
        assert_eq!(entity.length(), 1);
        assert!(!entity.serpent().unwrap().boosting);
    }

    #[test]
    fn test_empty_engine_is_not_terminal() {
        let engine = engine_with(ArenaRules::for_kind(ArenaKind::Combat));
        assert!(!engine.is_terminal());
    }

    #[test]
    fn test_growth_leaderboard_orders_by_score() {
        let mut engine = engine_with(ArenaRules::Growth(quiet_growth_rules()));
        let low = join(&mut engine, "low");
        let high = join(&mut engine, "high");
        engine.world_mut().entities.get_mut(&high).unwrap().score = 9;
        engine.world_mut().entities.get_mut(&low).unwrap().score = 3;

        let standings = engine.standings(0);
        assert_eq!(standings[0].id, high);
        assert_eq!(standings[0].placement, 1);
        assert_eq!(standings[1].id, low);
    }
}
