//! Growth arena steps: chain movement, boosting, eating and chain collisions

use glam::Vec2;
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use super::engine::World;
use super::entity::{Body, DeathCause};
use super::geometry::{circle_hits_polyline, circles_overlap};
use super::physics::PhysicsSystem;
use super::pickups::PickupKind;
use super::rules::GrowthRules;
use super::snapshot::GameEvent;

/// Minimum distance between a fresh head and any existing head
const SPAWN_CLEARANCE: f32 = 150.0;
const SPAWN_ATTEMPTS: usize = 10;

/// Random spawn point away from the walls and other heads
pub fn spawn_point(world: &mut World, rules: &GrowthRules) -> Vec2 {
    let margin = rules.bounds.size().min_element() * 0.1;
    let heads: Vec<Vec2> = world
        .entities
        .values()
        .filter(|e| e.alive)
        .map(|e| e.position)
        .collect();

    let mut candidate = world.random_point(&rules.bounds, margin);
    for _ in 1..SPAWN_ATTEMPTS {
        if heads.iter().all(|h| h.distance(candidate) >= SPAWN_CLEARANCE) {
            break;
        }
        candidate = world.random_point(&rules.bounds, margin);
    }
    candidate
}

/// Move every live chain; boosting sheds a tail segment every sub-interval
pub fn advance(world: &mut World, rules: &GrowthRules, dt: f32) {
    let mut shed = Vec::new();

    for entity in world.entities.values_mut().filter(|e| e.alive) {
        let Body::Growth(serpent) = &mut entity.body else {
            continue;
        };

        // Boosting is only possible above the minimum length
        if serpent.len() <= rules.min_length {
            serpent.boosting = false;
        }

        entity.speed = if serpent.boosting {
            rules.base_speed * rules.boost_multiplier
        } else {
            rules.base_speed
        };

        let head = PhysicsSystem::advance(serpent.head(), entity.heading, entity.speed, dt);
        serpent.segments[0] = head;
        PhysicsSystem::follow_chain(&mut serpent.segments, rules.segment_spacing);
        entity.position = head;

        if !serpent.boosting {
            serpent.boost_ticks = 0;
            continue;
        }

        serpent.boost_ticks += 1;
        if serpent.boost_ticks >= rules.boost_shed_ticks {
            serpent.boost_ticks = 0;
            if let Some(tail) = serpent.segments.pop() {
                entity.score = entity.score.saturating_sub(rules.boost_drop_value);
                shed.push(tail);
            }
        }
    }

    for position in shed {
        world.pickups.spawn(
            position,
            PickupKind::Food {
                value: rules.boost_drop_value,
            },
            true,
        );
    }
}

/// Heads eat overlapping food, lower entity ids first
pub fn resolve_pickups(world: &mut World, rules: &GrowthRules) {
    for id in world.alive_ids() {
        let Some(head) = world.entities.get(&id).map(|e| e.position) else {
            continue;
        };

        for pickup_id in world.pickups.touching(head, rules.head_radius, rules.food_radius) {
            let Some(pickup) = world.pickups.take(pickup_id) else {
                continue;
            };
            let value = pickup.kind.value();

            if let Some(entity) = world.entities.get_mut(&id) {
                entity.score = entity.score.saturating_add(value);
                if let Body::Growth(serpent) = &mut entity.body {
                    serpent.pending_growth += value;
                    while rules.growth_per_segment > 0 && serpent.pending_growth >= rules.growth_per_segment {
                        serpent.pending_growth -= rules.growth_per_segment;
                        let tail = serpent.segments[serpent.len() - 1];
                        serpent.segments.push(tail);
                    }
                }
            }

            world.events.push(GameEvent::PickupTaken {
                entity_id: id,
                pickup_id,
            });
        }
    }
}

/// Chain collisions, all read from the same pre-collision state.
///
/// Heads touching: the strictly longer chain survives, equal lengths both die.
/// A head touching another chain's body dies and credits the body's owner.
pub fn resolve_collisions(world: &mut World, rules: &GrowthRules, now_ms: u64) {
    let chains: Vec<(Uuid, Vec<Vec2>)> = world
        .entities
        .values()
        .filter(|e| e.alive)
        .filter_map(|e| e.serpent().map(|s| (e.id, s.segments.clone())))
        .collect();

    let mut deaths: BTreeMap<Uuid, (DeathCause, Option<Uuid>)> = BTreeMap::new();
    let mut head_on: BTreeSet<(usize, usize)> = BTreeSet::new();

    for i in 0..chains.len() {
        for j in (i + 1)..chains.len() {
            let (a_id, a) = &chains[i];
            let (b_id, b) = &chains[j];
            if !circles_overlap(a[0], rules.head_radius, b[0], rules.head_radius) {
                continue;
            }
            head_on.insert((i, j));

            match a.len().cmp(&b.len()) {
                std::cmp::Ordering::Greater => {
                    deaths.entry(*b_id).or_insert((DeathCause::HeadOn, Some(*a_id)));
                }
                std::cmp::Ordering::Less => {
                    deaths.entry(*a_id).or_insert((DeathCause::HeadOn, Some(*b_id)));
                }
                std::cmp::Ordering::Equal => {
                    deaths.entry(*a_id).or_insert((DeathCause::HeadOn, None));
                    deaths.entry(*b_id).or_insert((DeathCause::HeadOn, None));
                }
            }
        }
    }

    for (i, (id, chain)) in chains.iter().enumerate() {
        let head = chain[0];

        for (j, (other_id, other)) in chains.iter().enumerate() {
            if i == j || head_on.contains(&(i.min(j), i.max(j))) {
                continue;
            }
            if circle_hits_polyline(head, rules.head_radius, other, rules.body_radius, rules.body_skip) {
                deaths.entry(*id).or_insert((DeathCause::Collision, Some(*other_id)));
                break;
            }
        }

        if rules.self_collision
            && circle_hits_polyline(head, rules.head_radius, chain, rules.body_radius, rules.self_skip)
        {
            deaths.entry(*id).or_insert((DeathCause::SelfCollision, None));
        }
    }

    for (victim, (cause, killer)) in deaths {
        world.record_death(victim, killer, cause, now_ms, 0);
    }
}

/// Turn fallen chains into food, then top the food back up toward the floor
pub fn maintain_pickups(world: &mut World, rules: &GrowthRules) {
    for id in std::mem::take(&mut world.fallen) {
        let Some(segments) = world.entities.get_mut(&id).and_then(|e| match &mut e.body {
            Body::Growth(serpent) => {
                let body = serpent.segments.clone();
                serpent.segments.truncate(1);
                serpent.boosting = false;
                Some(body)
            }
            Body::Combat(_) => None,
        }) else {
            continue;
        };

        for position in segments {
            world.pickups.spawn(
                position,
                PickupKind::Food {
                    value: rules.death_drop_value,
                },
                true,
            );
        }
    }

    let food = world.pickups.count_where(|p| !p.kind.is_weapon());
    let missing = rules.food_floor.saturating_sub(food).min(rules.food_spawn_per_tick);
    for _ in 0..missing {
        let position = world.random_point(&rules.bounds, rules.food_radius);
        let kind = if world.rng.gen_bool(rules.golden_food_chance.clamp(0.0, 1.0)) {
            PickupKind::GoldenFood {
                value: rules.golden_food_value,
            }
        } else {
            PickupKind::Food {
                value: rules.food_value,
            }
        };
        world.pickups.spawn(position, kind, false);
    }
}
