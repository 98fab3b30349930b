//! Spawn-group reconciliation.
//!
//! Each group has a min/max count and optional spawn-point set; an update
//! selects under-populated groups, applies an optional time-restriction
//! mask, chooses spawn points in round-robin or random mode per group
//! configuration, and emits show-entity messages. Follows the same
//! min/max-plus-restriction-mask pattern used by `TimeLimitDefinition`
//! elsewhere in this crate.

use std::collections::HashMap;

use super::zone::{Zone, ZoneEntity, ZoneEntityType};
use crate::state::WorldClock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnMode {
    RoundRobin,
    Random,
}

#[derive(Debug, Clone, Copy)]
pub struct SpawnPoint {
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
}

/// A time-of-day/day-of-week restriction a spawn group can be gated by,
/// reusing `WorldClock`'s wraparound-aware range check.
#[derive(Debug, Clone, Copy)]
pub struct SpawnRestriction {
    pub start_minute: u32,
    pub end_minute: u32,
}

#[derive(Debug, Clone)]
pub struct SpawnGroupConfig {
    pub group_id: u32,
    pub enemy_type: u32,
    pub min_count: u32,
    pub max_count: u32,
    pub spawn_points: Vec<SpawnPoint>,
    pub mode: SpawnMode,
    pub restriction: Option<SpawnRestriction>,
    /// Round-robin cursor, advanced each time a point is chosen.
    pub next_point: usize,
}

/// Reconciles every spawn group in `zone` (or just `group_id` if given)
/// against its min/max population, spawning entities for under-populated
/// groups and returning the ids of every entity created. `force = true`
/// still respects an already-fully-populated group as a no-op.
pub fn reconcile(
    zone: &Zone,
    force: bool,
    group_id: Option<u32>,
    clock: &WorldClock,
    mut next_entity_id: impl FnMut() -> u32,
) -> Vec<u32> {
    let mut spawned = Vec::new();
    let mut groups = zone.spawn_groups.write();
    let entities_snapshot: HashMap<u32, ZoneEntity> = zone.entities.read().clone();

    for (id, group) in groups.iter_mut() {
        if let Some(wanted) = group_id {
            if wanted != *id {
                continue;
            }
        }
        if let Some(restriction) = group.restriction {
            if !clock.in_minute_range(restriction.start_minute, restriction.end_minute) {
                continue;
            }
        }

        let current = entities_snapshot
            .values()
            .filter(|e| e.entity_type == ZoneEntityType::Enemy)
            .count() as u32;

        if current >= group.max_count {
            continue;
        }
        if !force && current >= group.min_count {
            continue;
        }
        if group.spawn_points.is_empty() {
            continue;
        }

        let deficit = group.max_count.saturating_sub(current).max(1);
        for _ in 0..deficit.min(group.max_count - current) {
            let point = match group.mode {
                SpawnMode::RoundRobin => {
                    let p = group.spawn_points[group.next_point % group.spawn_points.len()];
                    group.next_point = group.next_point.wrapping_add(1);
                    p
                }
                SpawnMode::Random => {
                    let idx = (next_entity_id() as usize) % group.spawn_points.len();
                    group.spawn_points[idx]
                }
            };
            let entity_id = next_entity_id();
            zone.entities.write().insert(
                entity_id,
                ZoneEntity {
                    entity_id,
                    entity_type: ZoneEntityType::Enemy,
                    character: None,
                    x: point.x,
                    y: point.y,
                    rotation: point.rotation,
                },
            );
            spawned.push(entity_id);
        }
    }

    spawned
}
