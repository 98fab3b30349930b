//! ZoneManager — zone/instance lifecycle, entity tracking, and broadcast.
//!
//! A zone-id/dynamic-map-id map owned by the instance, per-(worldCID,key)
//! flag states, shared-map-plus-per-entity-lock discipline throughout:
//! DashMap shard lock, then an entity's own lock, collect-then-release for
//! broadcasts.

mod instance;
mod spawn;
mod zone;

pub use instance::{InstanceTimer, ZoneInstance};
pub use spawn::{SpawnGroupConfig, SpawnMode, SpawnPoint, SpawnRestriction};
pub use zone::{FlagSetTrigger, Zone, ZoneEntity, ZoneEntityType};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::network::ServerPacket;
use crate::state::{ServerCtx, SharedSession};

/// Failures surfaced by zone/instance operations.
#[derive(Debug, Error)]
pub enum ZoneError {
    #[error("unknown zone definition {0}")]
    UnknownZoneDefinition(u32),
    #[error("unknown instance definition {0}")]
    UnknownInstanceDefinition(u32),
    #[error("instance {0} not found")]
    InstanceNotFound(u32),
    #[error("zone ({0},{1}) not found")]
    ZoneNotFound(u32, u32),
    #[error("a conflicting timer is already active on instance {0}")]
    ConflictingTimer(u32),
    #[error("timer type for instance {0} has an implicit timer and cannot be started manually")]
    ImplicitTimerInstance(u32),
    #[error("no spot {1} defined for dynamic map {0}")]
    UnknownSpot(u32, u32),
}

/// A creation request arriving from the sync fabric or a direct in-process call
/// from an action/event handler.
#[derive(Debug, Clone)]
pub struct CreateInstanceRequest {
    pub definition_id: u32,
    pub variant_id: u32,
    pub access_world_cids: Vec<i32>,
    pub timer_id: Option<u32>,
    pub timer_expire_event_id: Option<String>,
}

/// A player's pending instance-access grant, resolved by
/// [`ZoneManager::get_instance_access`] and consumed by
/// [`ZoneManager::move_to_instance`].
#[derive(Debug, Clone)]
pub struct InstanceAccessGrant {
    pub instance_id: u32,
    pub entry_zone_id: u32,
    pub entry_dynamic_map_id: u32,
}

/// One entity-removal job scheduled by `CREATE_LOOT`'s expiration timer or
/// any other timed despawn.
struct ScheduledRemoval {
    at: chrono::DateTime<chrono::Utc>,
    zone_key: (u32, u32),
    entity_ids: Vec<u32>,
}

/// Owns every [`Zone`] and [`ZoneInstance`] this channel is authoritative
/// for.
pub struct ZoneManager {
    /// Non-instanced (global) zones, keyed by (zone_id, dynamic_map_id).
    zones: DashMap<(u32, u32), Arc<Zone>>,
    instances: DashMap<u32, Arc<ZoneInstance>>,
    next_instance_id: AtomicU32,
    next_entity_id: AtomicU32,
    pending_removals: Mutex<Vec<ScheduledRemoval>>,
}

impl Default for ZoneManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ZoneManager {
    pub fn new() -> Self {
        Self {
            zones: DashMap::new(),
            instances: DashMap::new(),
            next_instance_id: AtomicU32::new(1),
            next_entity_id: AtomicU32::new(1),
            pending_removals: Mutex::new(Vec::new()),
        }
    }

    pub fn next_entity_id(&self) -> u32 {
        self.next_entity_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Registers (or returns the already-registered) global zone for
    /// `(zone_id, dynamic_map_id)`. Global zones are created lazily on
    /// first entry rather than up front.
    pub fn global_zone(&self, zone_id: u32, dynamic_map_id: u32, definition_id: u32) -> Arc<Zone> {
        self.zones
            .entry((zone_id, dynamic_map_id))
            .or_insert_with(|| Arc::new(Zone::new(zone_id, dynamic_map_id, definition_id, true, None)))
            .clone()
    }

    fn zone_in_instance(&self, instance: &ZoneInstance, zone_id: u32, dynamic_map_id: u32) -> Option<Arc<Zone>> {
        instance.zones.read().get(&(zone_id, dynamic_map_id)).cloned()
    }

    /// Resolves a zone by id, preferring the session's current instance
    /// (if any) before falling back to the global zone map — the same
    /// precedence `ZONE_CHANGE`'s `dynamic_map_id = 0` resolution needs
    ///.
    pub fn resolve_zone(
        &self,
        session: &SharedSession,
        zone_id: u32,
        dynamic_map_id: u32,
    ) -> Option<Arc<Zone>> {
        if let Some(instance) = self.current_instance_of(session) {
            if let Some(zone) = self.zone_in_instance(&instance, zone_id, dynamic_map_id) {
                return Some(zone);
            }
        }
        self.zones.get(&(zone_id, dynamic_map_id)).map(|e| e.clone())
    }

    /// Finds the instance that currently owns the zone the session is in,
    /// if any. Sessions don't carry their instance directly; it's derived
    /// from the zone entity they're resident in.
    fn current_instance_of(&self, session: &SharedSession) -> Option<Arc<ZoneInstance>> {
        let zone_id = session.read().zone_id?;
        self.instance_owning_zone(zone_id).and_then(|id| self.instances.get(&id).map(|e| e.clone()))
    }

    /// Id of the instance that owns `zone_id`, if it is instance-bound
    /// rather than global. Used by the action dispatcher's `INSTANCE`
    /// location selector to test whether two sessions share an instance.
    pub fn instance_owning_zone(&self, zone_id: u32) -> Option<u32> {
        for entry in self.instances.iter() {
            if entry.value().zones.read().keys().any(|(z, _)| *z == zone_id) {
                return Some(*entry.key());
            }
        }
        None
    }

    /// Adds the session's entity to the target zone, removing it from the
    /// source zone first if `force_leave_current` (or a current zone
    /// exists at all — spec's boundary behavior: same source/target zone
    /// performs "leave then enter", firing both action sets exactly
    /// once). Triggers `ON_ENTER` through the caller-supplied hook since
    /// `ZoneManager` itself doesn't depend on `ActionDispatcher` to avoid
    /// a hard module cycle; see `crate::action::zone_change`.
    #[allow(clippy::too_many_arguments)]
    pub fn enter_zone(
        &self,
        ctx: &ServerCtx,
        session: &SharedSession,
        zone_id: u32,
        dynamic_map_id: u32,
        x: f32,
        y: f32,
        rot: f32,
        force_leave_current: bool,
    ) -> Result<Arc<Zone>, ZoneError> {
        let definition = ctx
            .definitions
            .zone(zone_id)
            .ok_or(ZoneError::UnknownZoneDefinition(zone_id))?;
        let _ = definition;

        if force_leave_current || session.read().zone_id.is_some() {
            self.leave_zone(session, false);
        }

        let target = self
            .resolve_zone(session, zone_id, dynamic_map_id)
            .unwrap_or_else(|| self.global_zone(zone_id, dynamic_map_id, zone_id));

        let entity_id = {
            let mut s = session.write();
            s.zone_id = Some(zone_id);
            self.next_entity_id()
        };
        let character = session.read().character;
        target.entities.write().insert(
            entity_id,
            ZoneEntity {
                entity_id,
                entity_type: ZoneEntityType::Player,
                character,
                x,
                y,
                rotation: rot,
            },
        );
        target
            .connections
            .write()
            .insert(session.read().username.clone());

        debug!(zone_id, dynamic_map_id, entity_id, "session entered zone");
        Ok(target)
    }

    /// Removes the session's entity from whatever zone it currently
    /// occupies, broadcasting a leave notification. `logout_mode` selects
    /// the `CancelEffects` rule set (full logout clears more status
    /// effects than an intra-channel zone change does).
    pub fn leave_zone(&self, session: &SharedSession, logout_mode: bool) {
        let (zone_id, username) = {
            let s = session.read();
            (s.zone_id, s.username.clone())
        };
        let Some(zone_id) = zone_id else { return };

        for entry in self.zones.iter() {
            if entry.key().0 == zone_id {
                entry.value().connections.write().remove(&username);
            }
        }
        for entry in self.instances.iter() {
            for zone in entry.value().zones.read().values() {
                if zone.zone_id == zone_id {
                    zone.connections.write().remove(&username);
                }
            }
        }

        session.write().zone_id = None;
        // Actual status-effect cancellation runs in `AccountManager`'s
        // `CancelEffects` rules, which differ between a full logout and an
        // intra-channel zone change; this module only tracks membership.
        debug!(%username, zone_id, logout_mode, "session left zone");
    }

    /// Intra-zone teleport: updates the entity's tracked position only,
    /// without the `ON_ENTER`/`ON_LEAVE` firing a real `enter_zone`/
    /// `leave_zone` would do.
    pub fn warp(&self, zone: &Zone, entity_id: u32, x: f32, y: f32, rot: f32) {
        if let Some(entity) = zone.entities.write().get_mut(&entity_id) {
            entity.x = x;
            entity.y = y;
            entity.rotation = rot;
        }
    }

    /// Finds the zone a session is currently resident in, preferring its
    /// owning instance over the global map, without requiring the caller
    /// to already know its `dynamic_map_id`.
    pub fn zone_of_session(&self, session: &SharedSession) -> Option<Arc<Zone>> {
        let zone_id = session.read().zone_id?;
        if let Some(instance) = self.current_instance_of(session) {
            if let Some(zone) = instance.zones.read().values().find(|z| z.zone_id == zone_id) {
                return Some(zone.clone());
            }
        }
        self.zones.iter().find(|e| e.key().0 == zone_id).map(|e| e.value().clone())
    }

    /// Allocates a new instance bound to `request.definition_id`.
    pub fn create_instance(
        &self,
        ctx: &ServerCtx,
        request: CreateInstanceRequest,
    ) -> Result<Arc<ZoneInstance>, ZoneError> {
        ctx.definitions
            .zone(request.definition_id)
            .ok_or(ZoneError::UnknownInstanceDefinition(request.definition_id))?;

        let instance_id = self.next_instance_id.fetch_add(1, Ordering::Relaxed);
        let instance = Arc::new(ZoneInstance::new(
            instance_id,
            request.definition_id,
            request.variant_id,
            request.access_world_cids.iter().copied().collect(),
        ));
        self.instances.insert(instance_id, instance.clone());
        info!(instance_id, definition_id = request.definition_id, "instance created");

        if let Some(timer_id) = request.timer_id {
            self.start_instance_timer(&instance, timer_id, request.timer_expire_event_id.clone())?;
        }
        Ok(instance)
    }

    /// Session-initiated instance creation convenience wrapper (spec
    /// §4.E's second `create_instance` overload).
    pub fn create_instance_for_session(
        &self,
        ctx: &ServerCtx,
        session: &SharedSession,
        def_id: u32,
        variant_id: u32,
        timer_id: Option<u32>,
        timer_expire_event_id: Option<String>,
    ) -> Result<Arc<ZoneInstance>, ZoneError> {
        let world_cid = session.read().world_cid;
        self.create_instance(
            ctx,
            CreateInstanceRequest {
                definition_id: def_id,
                variant_id,
                access_world_cids: world_cid.into_iter().collect(),
                timer_id,
                timer_expire_event_id,
            },
        )
    }

    pub fn instance(&self, instance_id: u32) -> Option<Arc<ZoneInstance>> {
        self.instances.get(&instance_id).map(|e| e.clone())
    }

    /// Tears down an instance. Sessions
    /// still inside it are left as-is; callers are expected to have moved
    /// them out (typically via `ZONE_CHANGE`) before issuing this.
    pub fn remove_instance(&self, instance_id: u32) -> bool {
        let removed = self.instances.remove(&instance_id).is_some();
        if removed {
            info!(instance_id, "instance removed");
        }
        removed
    }

    /// Resolves the instance the session currently has access to, if any.
    pub fn get_instance_access(&self, session: &SharedSession) -> Option<InstanceAccessGrant> {
        let world_cid = session.read().world_cid?;
        for entry in self.instances.iter() {
            if entry.value().access_cids.read().contains(&world_cid) {
                let zones = entry.value().zones.read();
                let (zone_id, dynamic_map_id) = zones.keys().next().copied().unwrap_or((0, 0));
                return Some(InstanceAccessGrant {
                    instance_id: *entry.key(),
                    entry_zone_id: zone_id,
                    entry_dynamic_map_id: dynamic_map_id,
                });
            }
        }
        None
    }

    /// Moves a session into the granted instance's entry zone.
    pub fn move_to_instance(
        &self,
        ctx: &ServerCtx,
        session: &SharedSession,
        access: &InstanceAccessGrant,
    ) -> Result<Arc<Zone>, ZoneError> {
        self.instances
            .get(&access.instance_id)
            .ok_or(ZoneError::InstanceNotFound(access.instance_id))?;
        self.enter_zone(
            ctx,
            session,
            access.entry_zone_id,
            access.entry_dynamic_map_id,
            0.0,
            0.0,
            0.0,
            true,
        )
    }

    /// Adds a zone (global or instance-owned) into an instance's zone map.
    pub fn bind_zone_to_instance(&self, instance: &ZoneInstance, zone: Arc<Zone>) {
        instance.zones.write().insert((zone.zone_id, zone.dynamic_map_id), zone);
    }

    /// Starts an instance timer after validating no conflicting timer is
    /// active and the instance's type doesn't carry an implicit one (spec
    /// §4.H `ZONE_INSTANCE::START_TIMER`).
    pub fn start_instance_timer(
        &self,
        instance: &ZoneInstance,
        timer_id: u32,
        expire_event_id: Option<String>,
    ) -> Result<(), ZoneError> {
        let mut slot = instance.timer.write();
        if let Some(existing) = slot.as_ref() {
            if existing.has_implicit_timer {
                return Err(ZoneError::ImplicitTimerInstance(instance.instance_id));
            }
            return Err(ZoneError::ConflictingTimer(instance.instance_id));
        }
        *slot = Some(InstanceTimer {
            timer_id,
            expire_event_id,
            expires_at: chrono::Utc::now() + chrono::Duration::seconds(3600),
            has_implicit_timer: false,
        });
        debug!(instance_id = instance.instance_id, timer_id, "instance timer started");
        Ok(())
    }

    /// Stops any pre-existing timer, as `START_TIMER` is required to do
    /// before installing a new one.
    pub fn stop_instance_timer(&self, instance: &ZoneInstance) {
        let mut slot = instance.timer.write();
        if slot.take().is_some() {
            debug!(instance_id = instance.instance_id, "instance timer stopped");
        }
    }

    /// Reconciles a spawn group's expected vs. actual population (spec
    /// §4.E "Spawn-group reconciliation").
    pub fn update_spawn_groups(
        &self,
        zone: &Zone,
        force: bool,
        group_id: Option<u32>,
        clock: &crate::state::WorldClock,
    ) -> Vec<u32> {
        spawn::reconcile(zone, force, group_id, clock, || self.next_entity_id())
    }

    pub fn spawn_enemy(&self, zone: &Zone, enemy_type: u32, x: f32, y: f32, rot: f32, ai: &str) -> u32 {
        let entity_id = self.next_entity_id();
        zone.entities.write().insert(
            entity_id,
            ZoneEntity {
                entity_id,
                entity_type: ZoneEntityType::Enemy,
                character: None,
                x,
                y,
                rotation: rot,
            },
        );
        debug!(entity_id, enemy_type, ai, "enemy spawned");
        entity_id
    }

    /// Fan-out to every connection currently in `zone`.
    pub fn broadcast_packet(&self, ctx: &ServerCtx, zone: &Zone, packet: ServerPacket) {
        let usernames: Vec<String> = zone.connections.read().iter().cloned().collect();
        for username in usernames {
            if let Some(session) = ctx.sessions.by_username(&username) {
                session.read().send(packet.clone());
            }
        }
    }

    /// As [`Self::broadcast_packet`] but filtered to the fixed in-game
    /// broadcast radius around `session`'s entity, optionally excluding
    /// `session` itself.
    pub fn send_to_range(
        &self,
        ctx: &ServerCtx,
        zone: &Zone,
        session: &SharedSession,
        packet: ServerPacket,
        include_self: bool,
    ) {
        let radius = ctx.config.limits.broadcast_radius;
        let origin = {
            let entities = zone.entities.read();
            let username = session.read().username.clone();
            entities
                .values()
                .find(|e| {
                    e.character.is_some()
                        && zone.connections.read().contains(&username)
                        && e.character == session.read().character
                })
                    .map(|e| (e.x, e.y))
        };
        let Some((ox, oy)) = origin else { return };

        let self_username = session.read().username.clone();
        let recipients: Vec<String> = {
            let entities = zone.entities.read();
            zone.connections
                .read()
                .iter()
                .filter(|username| include_self || **username != self_username)
                .filter(|username| {
                    ctx.sessions
                        .by_username(username)
                        .and_then(|s| {
                            let character = s.read().character;
                            entities.values().find(|e| e.character == character).map(|e| {
                                let dx = e.x - ox;
                                let dy = e.y - oy;
                                (dx * dx + dy * dy).sqrt() <= radius
                            })
                        })
                            .unwrap_or(false)
                })
                    .cloned()
                    .collect()
        };
        for username in recipients {
            if let Some(s) = ctx.sessions.by_username(&username) {
                s.read().send(packet.clone());
            }
        }
    }

    /// Queues entity ids in `zone` for removal at `at`.
    pub fn schedule_entity_removal(&self, at: chrono::DateTime<chrono::Utc>, zone: &Zone, entity_ids: Vec<u32>) {
        self.pending_removals.lock().push(ScheduledRemoval {
            at,
            zone_key: (zone.zone_id, zone.dynamic_map_id),
            entity_ids,
        });
    }

    /// Drains and applies every scheduled removal due by `now`. Called by
    /// the process's single timer thread.
    pub fn run_scheduled_removals(&self, now: chrono::DateTime<chrono::Utc>) {
        let mut pending = self.pending_removals.lock();
        let (due, remaining): (Vec<_>, Vec<_>) = pending.drain(..).partition(|r| r.at <= now);
        *pending = remaining;
        drop(pending);

        for removal in due {
            if let Some(zone) = self.zones.get(&removal.zone_key) {
                let mut entities = zone.entities.write();
                for id in &removal.entity_ids {
                    entities.remove(id);
                }
            } else {
                warn!(zone_key = ?removal.zone_key, "scheduled removal for zone no longer tracked");
            }
        }
    }

    /// Sets a zone flag and fires any matching [`FlagSetTrigger`]s,
    /// returning the fired triggers' action lists for the caller
    /// (`crate::action`) to dispatch — keeps this module from depending
    /// on `ActionDispatcher` directly.
    pub fn set_zone_flag(&self, zone: &Zone, world_cid: i32, key: i32, value: i32) -> Vec<FlagSetTrigger> {
        zone.flags.write().insert((world_cid, key.to_string()), value);
        zone.flag_triggers
            .iter()
            .filter(|t| t.key == key && t.value == value)
            .cloned()
            .collect()
    }

    pub fn zone_flag(&self, zone: &Zone, world_cid: i32, key: i32) -> Option<i32> {
        zone.flags.read().get(&(world_cid, key.to_string())).copied()
    }

    /// Resolves a random point inside a named spot, used by `ZONE_CHANGE`
    /// when `spot_id` is set.
    pub fn random_spot_point(
        &self,
        ctx: &ServerCtx,
        dynamic_map_id: u32,
        spot_id: u32,
    ) -> Result<(f32, f32, f32), ZoneError> {
        let spot = ctx
            .definitions
            .spot(dynamic_map_id, spot_id)
            .ok_or(ZoneError::UnknownSpot(dynamic_map_id, spot_id))?;
        Ok((spot.x, spot.y, spot.rotation))
    }

    pub fn zone_flags_snapshot(&self, zone: &Zone) -> HashMap<(i32, String), i32> {
        zone.flags.read().clone()
    }
}
