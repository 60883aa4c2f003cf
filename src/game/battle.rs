//! Combat arena steps: movement with cover, weapons, melee, respawns

use glam::Vec2;
use rand::Rng;
use tracing::debug;
use uuid::Uuid;

use super::combat::{CombatSystem, FireOutcome, Projectile, RayHit, WeaponKind, WeaponStats};
use super::engine::{EngineError, World};
use super::entity::{DeathCause, Entity, HeldWeapon};
use super::intents::ActionKind;
use super::physics::PhysicsSystem;
use super::pickups::PickupKind;
use super::rules::{ArenaKind, CombatRules};
use super::snapshot::GameEvent;

const SPAWN_ATTEMPTS: usize = 20;
const SPAWN_MARGIN: f32 = 2.0;
/// Minimum distance between a fresh spawn and a live fighter
const SPAWN_CLEARANCE: f32 = 8.0;

/// Random point clear of cover, preferring spots away from live fighters
pub fn spawn_point(world: &mut World, rules: &CombatRules) -> Vec2 {
    let others: Vec<Vec2> = world
        .entities
        .values()
        .filter(|e| e.alive)
        .map(|e| e.position)
        .collect();

    let mut candidate = free_point(world, rules);
    for _ in 1..SPAWN_ATTEMPTS {
        if others.iter().all(|o| o.distance(candidate) >= SPAWN_CLEARANCE) {
            break;
        }
        candidate = free_point(world, rules);
    }
    candidate
}

/// Random point not inside any obstacle
fn free_point(world: &mut World, rules: &CombatRules) -> Vec2 {
    let mut candidate = world.random_point(&rules.bounds, SPAWN_MARGIN);
    for _ in 1..SPAWN_ATTEMPTS {
        if !rules
            .obstacles
            .iter()
            .any(|o| o.overlaps_circle(candidate, rules.body_radius))
        {
            break;
        }
        candidate = world.random_point(&rules.bounds, SPAWN_MARGIN);
    }
    PhysicsSystem::push_out_of_obstacles(candidate, rules.body_radius, &rules.obstacles)
}

/// Bring back fighters whose respawn delay has elapsed
pub fn process_respawns(world: &mut World, rules: &CombatRules, now_ms: u64) {
    let due: Vec<Uuid> = world
        .entities
        .values()
        .filter(|e| !e.alive)
        .filter(|e| {
            e.fighter()
                .is_some_and(|f| f.lives > 0 && f.respawn_at_ms.is_some_and(|at| at <= now_ms))
        })
        .map(|e| e.id)
        .collect();

    for id in due {
        let position = spawn_point(world, rules);
        let Some(entity) = world.entities.get_mut(&id) else {
            continue;
        };

        entity.alive = true;
        entity.position = position;
        entity.speed = 0.0;
        entity.death_cause = None;
        entity.last_active_ms = now_ms;
        if let Some(fighter) = entity.fighter_mut() {
            fighter.health = rules.max_health;
            fighter.respawn_at_ms = None;
            fighter.moving = false;
            fighter.pending_action = None;
            fighter.aim = None;
        }

        world.events.push(GameEvent::Respawned { entity_id: id });
    }
}

/// Move fighters that are walking; cover blocks movement
pub fn advance(world: &mut World, rules: &CombatRules, dt: f32) {
    for entity in world.entities.values_mut().filter(|e| e.alive) {
        let moving = entity.fighter().is_some_and(|f| f.moving);
        entity.speed = if moving { rules.move_speed } else { 0.0 };
        if !moving {
            continue;
        }

        let next = PhysicsSystem::advance(entity.position, entity.heading, entity.speed, dt);
        entity.position = PhysicsSystem::push_out_of_obstacles(next, rules.body_radius, &rules.obstacles);
    }
}

/// Fly projectiles; they expire on lifetime, bounds or cover
pub fn advance_projectiles(world: &mut World, rules: &CombatRules, dt: f32) {
    world.projectiles.retain_mut(|p| {
        p.update(dt)
            && rules.bounds.contains(p.position)
            && !rules.obstacles.iter().any(|o| o.overlaps_circle(p.position, p.radius))
    });
}

/// Empty hands grab a touching weapon; a pickup action swaps the held one
pub fn resolve_pickups(world: &mut World, rules: &CombatRules) {
    for id in world.alive_ids() {
        let Some(position) = world.entities.get(&id).map(|e| e.position) else {
            continue;
        };

        for pickup_id in world.pickups.touching(position, rules.body_radius, rules.pickup_radius) {
            let Some(PickupKind::Weapon { weapon, ammo }) = world.pickups.get(pickup_id).map(|p| p.kind) else {
                continue;
            };
            let Some(fighter) = world.entities.get_mut(&id).and_then(Entity::fighter_mut) else {
                break;
            };

            let wants_swap = fighter.pending_action == Some(ActionKind::Pickup);
            if fighter.weapon.is_some() && !wants_swap {
                continue;
            }

            world.pickups.take(pickup_id);
            if wants_swap {
                fighter.pending_action = None;
            }
            let previous = fighter.weapon.replace(HeldWeapon { kind: weapon, ammo });
            if let Some(old) = previous.filter(|w| w.ammo > 0) {
                world.pickups.spawn(
                    position,
                    PickupKind::Weapon {
                        weapon: old.kind,
                        ammo: old.ammo,
                    },
                    true,
                );
            }

            world.events.push(GameEvent::PickupTaken {
                entity_id: id,
                pickup_id,
            });
            break;
        }

        // A pickup request with nothing in reach is dropped
        if let Some(fighter) = world.entities.get_mut(&id).and_then(Entity::fighter_mut) {
            if fighter.pending_action == Some(ActionKind::Pickup) {
                fighter.pending_action = None;
            }
        }
    }
}

/// Resolve queued fire and melee actions, then projectile hits
pub fn resolve_combat(world: &mut World, rules: &CombatRules, now_ms: u64) {
    for id in world.alive_ids() {
        let Some((action, aim, heading)) = world.entities.get_mut(&id).and_then(|e| {
            let heading = e.heading;
            e.fighter_mut()
                .map(|f| (f.pending_action.take(), f.aim.take(), heading))
        }) else {
            continue;
        };

        let result = match action {
            Some(ActionKind::Fire) => fire_or_use(world, rules, id, aim, now_ms),
            Some(ActionKind::Melee) => melee(world, rules, id, aim.unwrap_or(heading), now_ms),
            _ => continue,
        };

        if let Err(e) = result {
            debug!(entity_id = %id, error = %e, "Queued action skipped");
        }
    }

    let mut remaining = Vec::with_capacity(world.projectiles.len());
    for projectile in std::mem::take(&mut world.projectiles) {
        let target = world
            .entities
            .values()
            .filter(|e| e.alive && e.id != projectile.owner_id && e.fighter().is_some())
            .find(|e| projectile.check_hit(e.position, rules.body_radius))
            .map(|e| e.id);

        match target {
            Some(target) => apply_hit(
                world,
                rules,
                projectile.owner_id,
                target,
                projectile.damage,
                DeathCause::Shot,
                now_ms,
            ),
            None => remaining.push(projectile),
        }
    }
    world.projectiles.extend(remaining);
}

/// Fire the held weapon, or swing melee when empty-handed.
///
/// Hitscan damage lands immediately; projectile weapons spawn projectiles
/// resolved on later ticks. The last round discards the weapon.
pub fn fire_or_use(
    world: &mut World,
    rules: &CombatRules,
    id: Uuid,
    aim: Option<f32>,
    now_ms: u64,
) -> Result<FireOutcome, EngineError> {
    let entity = world.entities.get(&id).ok_or(EngineError::EntityNotFound(id))?;
    if !entity.alive {
        return Err(EngineError::NotAlive(id));
    }
    let fighter = entity
        .fighter()
        .ok_or(EngineError::WrongArena(ArenaKind::Growth))?;

    let aim = aim.unwrap_or(entity.heading);
    let origin = entity.position;

    let Some(held) = fighter.weapon else {
        return melee(world, rules, id, aim, now_ms);
    };
    if !CombatSystem::can_fire(fighter.weapon_ready_at_ms, now_ms) {
        return Ok(FireOutcome::CoolingDown {
            ready_at_ms: fighter.weapon_ready_at_ms,
        });
    }

    let stats = WeaponStats::for_kind(held.kind);
    let ammo_left = held.ammo.saturating_sub(1);
    if let Some(fighter) = world.entities.get_mut(&id).and_then(Entity::fighter_mut) {
        fighter.weapon_ready_at_ms = now_ms + stats.cooldown_ms;
        fighter.weapon = (ammo_left > 0).then_some(HeldWeapon {
            kind: held.kind,
            ammo: ammo_left,
        });
    }

    world.events.push(GameEvent::Shot {
        shooter_id: id,
        weapon: Some(held.kind),
        x: origin.x,
        y: origin.y,
        direction: aim,
    });

    let mut hits = Vec::new();
    let mut projectiles = Vec::new();

    if let Some(flight) = stats.projectile {
        for _ in 0..stats.pellets {
            let heading = CombatSystem::sample_spread(&mut world.rng, aim, stats.spread);
            world.next_projectile_id += 1;
            let projectile_id = world.next_projectile_id;
            world.projectiles.push(Projectile {
                id: projectile_id,
                owner_id: id,
                position: origin + Vec2::from_angle(heading) * (rules.body_radius + flight.radius),
                heading,
                speed: flight.speed,
                damage: stats.damage,
                radius: flight.radius,
                ticks_remaining: flight.lifetime_ticks,
            });
            projectiles.push(projectile_id);
        }
    } else {
        let targets: Vec<(Uuid, Vec2, f32)> = world
            .entities
            .values()
            .filter(|e| e.alive && e.id != id && e.fighter().is_some())
            .map(|e| (e.id, e.position, rules.body_radius))
            .collect();

        for _ in 0..stats.pellets {
            let heading = CombatSystem::sample_spread(&mut world.rng, aim, stats.spread);
            if let Some(RayHit::Target { id: target, .. }) =
                CombatSystem::trace_ray(origin, heading, stats.range, &rules.obstacles, &targets)
            {
                hits.push(target);
            }
        }

        for target in &hits {
            apply_hit(world, rules, id, *target, stats.damage, DeathCause::Shot, now_ms);
        }
    }

    Ok(FireOutcome::Shot {
        weapon: held.kind,
        ammo_left,
        hits,
        projectiles,
    })
}

/// Melee the nearest live fighter in reach
pub fn melee(
    world: &mut World,
    rules: &CombatRules,
    id: Uuid,
    aim: f32,
    now_ms: u64,
) -> Result<FireOutcome, EngineError> {
    let entity = world.entities.get(&id).ok_or(EngineError::EntityNotFound(id))?;
    if !entity.alive {
        return Err(EngineError::NotAlive(id));
    }
    let fighter = entity
        .fighter()
        .ok_or(EngineError::WrongArena(ArenaKind::Growth))?;
    if !CombatSystem::can_fire(fighter.melee_ready_at_ms, now_ms) {
        return Ok(FireOutcome::CoolingDown {
            ready_at_ms: fighter.melee_ready_at_ms,
        });
    }

    let origin = entity.position;
    let target = world
        .entities
        .values()
        .filter(|e| e.alive && e.id != id && e.fighter().is_some())
        .map(|e| (e.id, e.position.distance(origin)))
        .filter(|(_, d)| *d <= rules.melee.range)
        .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)))
        .map(|(target, _)| target);

    if let Some(fighter) = world.entities.get_mut(&id).and_then(Entity::fighter_mut) {
        fighter.melee_ready_at_ms = now_ms + rules.melee.cooldown_ms;
    }

    world.events.push(GameEvent::Shot {
        shooter_id: id,
        weapon: None,
        x: origin.x,
        y: origin.y,
        direction: aim,
    });

    if let Some(target) = target {
        apply_hit(world, rules, id, target, rules.melee.damage, DeathCause::Melee, now_ms);
    }

    Ok(FireOutcome::Melee { target })
}

/// Damage a fighter; a lethal hit costs a life and drops the held weapon
pub fn apply_hit(
    world: &mut World,
    rules: &CombatRules,
    shooter: Uuid,
    target: Uuid,
    damage: f32,
    cause: DeathCause,
    now_ms: u64,
) {
    let Some(fighter) = world
        .entities
        .get_mut(&target)
        .filter(|e| e.alive)
        .and_then(Entity::fighter_mut)
    else {
        return;
    };

    let (health, dead) = CombatSystem::apply_damage(fighter.health, damage);
    let dealt = fighter.health - health;
    fighter.health = health;
    fighter.damage_taken += dealt;

    if shooter != target {
        if let Some(attacker) = world.entities.get_mut(&shooter) {
            attacker.score = attacker.score.saturating_add(dealt.round() as u32);
            if let Some(f) = attacker.fighter_mut() {
                f.damage_dealt += dealt;
            }
        }
    }

    world.events.push(GameEvent::Hit {
        shooter_id: shooter,
        target_id: target,
        damage: dealt,
    });

    if dead {
        fall(world, rules, target, Some(shooter), cause, now_ms);
    }
}

/// Lethal outcome for a fighter, whatever killed it: lose a life, drop the
/// held weapon, then respawn after the delay or stay eliminated
pub fn fall(
    world: &mut World,
    rules: &CombatRules,
    victim: Uuid,
    killer: Option<Uuid>,
    cause: DeathCause,
    now_ms: u64,
) {
    let Some(entity) = world.entities.get_mut(&victim).filter(|e| e.alive) else {
        return;
    };
    let position = entity.position;
    let Some(fighter) = entity.fighter_mut() else {
        return;
    };

    fighter.lives = fighter.lives.saturating_sub(1);
    fighter.moving = false;
    fighter.pending_action = None;
    let dropped = fighter.weapon.take();
    fighter.respawn_at_ms = (fighter.lives > 0).then_some(now_ms + rules.respawn_delay_ms);

    if let Some(weapon) = dropped.filter(|w| w.ammo > 0) {
        world.pickups.spawn(
            position,
            PickupKind::Weapon {
                weapon: weapon.kind,
                ammo: weapon.ammo,
            },
            true,
        );
    }
    world.record_death(victim, killer, cause, now_ms, rules.kill_bonus);
}

/// Top weapon pickups back up toward the floor
pub fn maintain_pickups(world: &mut World, rules: &CombatRules) {
    let weapons = world.pickups.count_where(|p| p.kind.is_weapon());
    let missing = rules
        .weapon_floor
        .saturating_sub(weapons)
        .min(rules.weapon_spawn_per_tick);

    for _ in 0..missing {
        let position = free_point(world, rules);
        let weapon = WeaponKind::ALL[world.rng.gen_range(0..WeaponKind::ALL.len())];
        let ammo = WeaponStats::for_kind(weapon).ammo;
        world
            .pickups
            .spawn(position, PickupKind::Weapon { weapon, ammo }, false);
    }
}
