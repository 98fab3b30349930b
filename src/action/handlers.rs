//! Per-action-type effect implementations.
//!
//! Every handler is synchronous: [`crate::event::EventRuntime`]'s
//! dispatch chain that calls into this module never crosses an `.await`
//!, so any
//! handler that needs to touch the `Store` builds its change-set and
//! fires it through a detached `tokio::spawn` rather than awaiting it
//! inline — the same fire-and-forget shape `AccountManager::increase_cp`
//! uses for its own CAS retries, just without the retry loop since these
//! writes don't contend on a shared balance.

use tracing::{debug, warn};

use crate::db::{ChangeSet, Demon, DemonBox, Item, ItemBox, PersistentRecord};
use crate::network::ServerPacket;
use crate::state::{CharacterState, ServerCtx, SharedSession};
use crate::zone::ZoneEntityType;

use super::types::{ActionType, ItemMode, ZoneInstanceMode};

/// Reserved `world_cid` used to key `SET_NPC_STATE` entries into a zone's
/// existing `flags` table. Real per-character world-CIDs are
/// always non-negative, so a negative sentinel can't collide with a
/// genuine `ZONE_CHARACTER_FLAGS` entry.
const NPC_STATE_WORLD_CID: i32 = -1;

/// Reserved `event_counters` key accumulating XP. Chosen from the top of the `u32` range, away from any
/// authored `EVENT_COUNTER` id a content author would plausibly pick.
const XP_COUNTER_KEY: u32 = u32::MAX;

/// Base of the reserved key range `UPDATE_POINTS` uses for its
/// `point_type` buckets (Bethel, Cowrie, Ziotite, etc. per
/// `ConditionType`), same rationale as [`XP_COUNTER_KEY`].
const POINTS_COUNTER_BASE: u32 = u32::MAX - 256;

/// Runs one action's effect against `target_session`/`character`,
/// returning whether it succeeded.
pub fn execute(ctx: &ServerCtx, target_session: &SharedSession, character: &mut CharacterState, action_type: &ActionType) -> bool {
    match action_type {
        ActionType::ZoneChange { zone_id, dynamic_map_id, x, y, rotation, spot_id } => {
            zone_change(ctx, target_session, character, *zone_id, *dynamic_map_id, *x, *y, *rotation, *spot_id)
        }
        ActionType::StartEvent { event_id } => ctx.event_runtime.handle_event(ctx, target_session, character, event_id, 0).is_ok(),
        ActionType::SetHomepoint => set_homepoint(ctx, target_session, character),
        ActionType::SetNpcState { entity_id, state } => set_npc_state(ctx, target_session, *entity_id, *state),
        ActionType::AddRemoveItems { mode, item_type, quantity } => {
            add_remove_items(ctx, target_session, character, *mode, *item_type, *quantity)
        }
        ActionType::AddRemoveStatus { status_id, stack_delta, duration_ms } => {
            add_remove_status(ctx, character, *status_id, *stack_delta, *duration_ms)
        }
        ActionType::UpdateComp { add_slots, remove, contract } => update_comp(ctx, character, *add_slots, remove, contract),
        ActionType::GrantSkills { skill_ids } => grant_skills(ctx, character, skill_ids),
        ActionType::GrantXp { amount } => grant_xp(character, *amount),
        ActionType::DisplayMessage { message_id } => {
            target_session.read().send(ServerPacket::EventMessage { event_id: *message_id });
            true
        }
        ActionType::StageEffect { effect_id } => {
            target_session.read().send(ServerPacket::EventStageEffect { effect_id: *effect_id });
            true
        }
        ActionType::SpecialDirection { direction_id } => {
            target_session.read().send(ServerPacket::EventSpecialDirection { direction_id: *direction_id });
            true
        }
        ActionType::PlayBgm { bgm_id } => {
            match bgm_id {
                Some(id) => target_session.read().send(ServerPacket::EventPlayBgm { bgm_id: *id }),
                None => target_session.read().send(ServerPacket::EventStopBgm),
            }
            true
        }
        ActionType::PlaySoundEffect { effect_id } => {
            target_session.read().send(ServerPacket::EventPlaySoundEffect { effect_id: *effect_id });
            true
        }
        ActionType::UpdateFlag { key, value } => update_flag(ctx, target_session, character, *key, *value),
        ActionType::UpdateLnc { delta } => {
            character.character.lnc = character.character.lnc.saturating_add(*delta);
            persist_character(ctx, character);
            true
        }
        ActionType::UpdatePoints { point_type, delta } => {
            let key = POINTS_COUNTER_BASE.wrapping_add(*point_type);
            let entry = character.event_counters.entry(key).or_insert(0);
            *entry = entry.saturating_add(*delta);
            true
        }
        ActionType::UpdateQuest { quest_id, phase, force, flag_updates } => {
            update_quest(ctx, target_session, character, *quest_id, *phase, *force, flag_updates)
        }
        ActionType::UpdateZoneFlags { key, value } => update_zone_flags(ctx, target_session, character, *key, *value),
        ActionType::ZoneInstance { mode } => zone_instance(ctx, target_session, character, mode),
        ActionType::Spawn { group_id, force } => spawn(ctx, target_session, *group_id, *force),
        ActionType::CreateLoot { items, x, y, relative_to_source, expiration_time } => {
            create_loot(ctx, target_session, character, items, *x, *y, *relative_to_source, *expiration_time)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn zone_change(
    ctx: &ServerCtx,
    target_session: &SharedSession,
    character: &mut CharacterState,
    zone_id: u32,
    dynamic_map_id: u32,
    x: f32,
    y: f32,
    rotation: f32,
    spot_id: Option<u32>,
) -> bool {
    // `zone_id == 0` with a spot set means "move within the current
    // zone", not homepoint; it must not re-trigger ON_LEAVE/ON_ENTER
    //, so it's handled as a `warp` rather than
    // falling into the `enter_zone` path below.
    if let (0, Some(spot_id)) = (zone_id, spot_id) {
        let Some(zone) = ctx.zones.zone_of_session(target_session) else { return false };
        let (final_x, final_y, final_rot) = match ctx.zones.random_spot_point(ctx, zone.dynamic_map_id, spot_id) {
            Ok(point) => point,
            Err(e) => {
                warn!(error = %e, "zone_change: spot lookup failed");
                return false;
            }
        };
        let Some(entity_id) = zone
            .entities
            .read()
            .iter()
            .find(|(_, e)| e.character == Some(character.uuid))
            .map(|(id, _)| *id)
        else {
            return false;
        };
        ctx.zones.warp(&zone, entity_id, final_x, final_y, final_rot);
        character.x = final_x;
        character.y = final_y;
        character.rotation = final_rot;
        return true;
    }

    let homepoint = zone_id == 0 && dynamic_map_id == 0 && spot_id.is_none();
    let effective_zone_id = if zone_id == 0 { character.character.homepoint_zone } else { zone_id };

    let mut effective_dynamic_map_id = dynamic_map_id;
    if effective_dynamic_map_id == 0 {
        if let Some(instance) = character.instance_id.and_then(|id| ctx.zones.instance(id)) {
            if let Some((_, dmid)) = instance.zones.read().keys().find(|(z, _)| *z == effective_zone_id) {
                effective_dynamic_map_id = *dmid;
            }
        } else if let Some(def) = ctx.definitions.zone(effective_zone_id) {
            effective_dynamic_map_id = def.dynamic_map_id;
        }
    }

    let effective_spot_id = if homepoint { Some(character.character.homepoint_spot) } else { spot_id };
    let (final_x, final_y, final_rot) = if let Some(spot_id) = effective_spot_id {
        match ctx.zones.random_spot_point(ctx, effective_dynamic_map_id, spot_id) {
            Ok(point) => point,
            Err(e) => {
                warn!(error = %e, "zone_change: spot lookup failed");
                return false;
            }
        }
    } else {
        (x, y, rotation)
    };

    match ctx.zones.enter_zone(ctx, target_session, effective_zone_id, effective_dynamic_map_id, final_x, final_y, final_rot, true) {
        Ok(_) => {
            character.zone_id = effective_zone_id;
            character.x = final_x;
            character.y = final_y;
            character.rotation = final_rot;
            true
        }
        Err(e) => {
            warn!(error = %e, "zone_change failed");
            false
        }
    }
}

fn set_homepoint(ctx: &ServerCtx, target_session: &SharedSession, character: &mut CharacterState) -> bool {
    character.character.homepoint_zone = character.zone_id;
    persist_character(ctx, character);
    target_session.read().send(ServerPacket::EventHomepointUpdate);
    true
}

fn set_npc_state(ctx: &ServerCtx, target_session: &SharedSession, entity_id: u32, state: i32) -> bool {
    let Some(zone_id) = target_session.read().zone_id else { return false };
    let Some(zone) = ctx.zones.resolve_zone(target_session, zone_id, 0) else { return false };
    ctx.zones.set_zone_flag(&zone, NPC_STATE_WORLD_CID, entity_id as i32, state);
    true
}

fn add_remove_items(ctx: &ServerCtx, target_session: &SharedSession, character: &mut CharacterState, mode: ItemMode, item_type: u32, quantity: i32) -> bool {
    let Some(item_def) = ctx.definitions.item(item_type) else { return false };
    if mode == ItemMode::Post && quantity < 0 {
        debug!(item_type, "add_remove_items: POST mode cannot remove");
        return false;
    }
    if mode == ItemMode::MaterialTank && (item_def.category_main != 1 || item_def.category_sub != 64) {
        debug!(item_type, main = item_def.category_main, sub = item_def.category_sub, "add_remove_items: not a material");
        return false;
    }
    let Some(&box_uuid) = character.character.item_boxes.first() else { return false };
    let stack_cap = item_def.stack_size;

    let store = ctx.store.clone();
    tokio::spawn(async move {
        let Ok(mut item_box) = store.load::<ItemBox>(box_uuid, true).await else {
            warn!(%box_uuid, "add_remove_items: item box not found");
            return;
        };
        let mut change_set = ChangeSet::new();
        let mut remaining = quantity;

        for slot in item_box.slots.iter().flatten().copied().collect::<Vec<_>>() {
            if remaining == 0 {
                break;
            }
            let Ok(mut item) = store.load::<Item>(slot, true).await else { continue };
            if item.item_type != item_type {
                continue;
            }
            if remaining > 0 {
                let room = stack_cap.saturating_sub(item.stack_size) as i32;
                let add = remaining.min(room);
                item.stack_size += add as u16;
                remaining -= add;
            } else {
                let remove = (-remaining).min(item.stack_size as i32);
                item.stack_size -= remove as u16;
                remaining += remove;
            }
            change_set = change_set.update(item.uuid, item.clone().into_record());
        }

        while remaining > 0 {
            let Some(slot_idx) = item_box.slots.iter().position(Option::is_none) else { break };
            let add = remaining.min(stack_cap as i32);
            let item = store.new_record(
                |uuid| Item { uuid, item_type, stack_size: add as u16, box_id: Some(box_uuid), box_slot: Some(slot_idx as u16) },
                false,
            );
            item_box.slots[slot_idx] = Some(item.uuid);
            change_set = change_set.insert(item.into_record());
            remaining -= add;
        }
        if remaining > 0 {
            debug!(item_type, remaining, "add_remove_items: item box full, dropping remainder");
        }

        change_set = change_set.update(box_uuid, item_box.into_record());
        if let Err(e) = store.apply(&change_set).await {
            warn!(error = %e, "add_remove_items: persistence failed");
        }
    });

    target_session.read().send(ServerPacket::EventGetItems { item_type, quantity: quantity.unsigned_abs().min(u16::MAX as u32) as u16 });
    true
}

fn add_remove_status(ctx: &ServerCtx, character: &mut CharacterState, status_id: u32, stack_delta: i16, duration_ms: Option<u32>) -> bool {
    let default_duration = ctx.definitions.status(status_id).map(|d| d.default_duration_ms).unwrap_or(0);
    let duration_ms = duration_ms.unwrap_or(default_duration);

    if stack_delta <= 0 {
        let Some(mut effect) = character.active_status_effects.remove(&status_id) else { return false };
        let new_stack = effect.stack.saturating_sub(stack_delta.unsigned_abs() as u8);
        if new_stack == 0 {
            ctx.sync.remove_record(crate::sync::SyncObject::StatusEffect(effect));
        } else {
            effect.stack = new_stack;
            character.active_status_effects.insert(status_id, effect.clone());
            ctx.sync.update_record(crate::sync::SyncObject::StatusEffect(effect));
        }
        return true;
    }

    let expires = if duration_ms > 0 { Some(ctx.clock.now() + chrono::Duration::milliseconds(duration_ms as i64)) } else { None };
    let entity_uuid = character.uuid;
    let effect = character
        .active_status_effects
        .entry(status_id)
        .or_insert_with(|| crate::db::StatusEffect { uuid: uuid::Uuid::new_v4(), entity: entity_uuid, status_id, stack: 0, expires });
    effect.stack = effect.stack.saturating_add(stack_delta as u8).min(u8::MAX);
    effect.expires = expires;
    ctx.sync.update_record(crate::sync::SyncObject::StatusEffect(effect.clone()));
    true
}

fn update_comp(ctx: &ServerCtx, character: &mut CharacterState, add_slots: u8, remove: &[uuid::Uuid], contract: &[uuid::Uuid]) -> bool {
    if add_slots as usize > ctx.config.limits.comp_slots {
        return false;
    }
    let Some(&box_uuid) = character.character.demon_boxes.first() else { return false };

    let store = ctx.store.clone();
    let remove = remove.to_vec();
    let contract = contract.to_vec();
    tokio::spawn(async move {
        let Ok(mut demon_box) = store.load::<DemonBox>(box_uuid, true).await else {
            warn!(%box_uuid, "update_comp: demon box not found");
            return;
        };
        if add_slots > 0 {
            demon_box.slots.extend(std::iter::repeat(None).take(add_slots as usize));
        }

        let mut change_set = ChangeSet::new();
        for demon_uuid in &remove {
            match store.load::<Demon>(*demon_uuid, true).await {
                Ok(demon) if !demon.locked => {
                    for slot in demon_box.slots.iter_mut() {
                        if *slot == Some(*demon_uuid) {
                            *slot = None;
                        }
                    }
                    change_set = change_set.delete(*demon_uuid);
                }
                Ok(_) => warn!(demon = %demon_uuid, "update_comp: refusing to remove locked demon"),
                Err(e) => warn!(demon = %demon_uuid, error = %e, "update_comp: demon to remove not found"),
            }
        }
        for demon_uuid in &contract {
            let Ok(mut demon) = store.load::<Demon>(*demon_uuid, true).await else {
                warn!(demon = %demon_uuid, "update_comp: demon to contract not found");
                continue;
            };
            let Some(slot) = demon_box.slots.iter().position(Option::is_none) else {
                warn!(demon = %demon_uuid, "update_comp: no free COMP slot for contract");
                continue;
            };
            demon.locked = true;
            demon.box_id = Some(box_uuid);
            demon.box_slot = Some(slot as u16);
            demon_box.slots[slot] = Some(*demon_uuid);
            change_set = change_set.update(*demon_uuid, demon.into_record());
        }

        change_set = change_set.update(box_uuid, demon_box.into_record());
        if let Err(e) = store.apply(&change_set).await {
            warn!(error = %e, "update_comp: persistence failed");
        }
    });
    true
}

fn grant_skills(ctx: &ServerCtx, character: &mut CharacterState, skill_ids: &[u32]) -> bool {
    let mut granted_any = false;
    for id in skill_ids {
        if ctx.definitions.skill(*id).is_none() {
            debug!(skill_id = *id, "grant_skills: unknown skill id");
            continue;
        }
        if !character.active_skills.contains(id) {
            character.active_skills.push(*id);
            granted_any = true;
        }
    }
    granted_any || skill_ids.is_empty()
}

fn xp_threshold(level: u8) -> i32 {
    1000 * (level as i32 + 1)
}

fn grant_xp(character: &mut CharacterState, amount: i32) -> bool {
    if amount == 0 {
        return true;
    }
    let xp = character.event_counters.entry(XP_COUNTER_KEY).or_insert(0);
    *xp = (*xp).saturating_add(amount).max(0);

    let mut leveled = false;
    while character.character.level < 99 {
        let threshold = xp_threshold(character.character.level);
        let remaining = character.event_counters.entry(XP_COUNTER_KEY).or_insert(0);
        if *remaining < threshold {
            break;
        }
        *remaining -= threshold;
        character.character.level += 1;
        leveled = true;
    }
    if leveled {
        character.recalculate_stats();
    }
    true
}

fn update_flag(ctx: &ServerCtx, target_session: &SharedSession, character: &mut CharacterState, key: i32, value: i32) -> bool {
    let Some(zone_id) = target_session.read().zone_id else { return false };
    let Some(zone) = ctx.zones.resolve_zone(target_session, zone_id, 0) else { return false };
    let world_cid = target_session.read().world_cid.unwrap_or(0);
    let triggers = ctx.zones.set_zone_flag(&zone, world_cid, key, value);
    for trigger in triggers {
        super::run_actions(ctx, target_session, character, &trigger.actions);
    }
    true
}

fn update_zone_flags(ctx: &ServerCtx, target_session: &SharedSession, character: &mut CharacterState, key: i32, value: i32) -> bool {
    let Some(zone_id) = target_session.read().zone_id else { return false };
    let Some(zone) = ctx.zones.resolve_zone(target_session, zone_id, 0) else { return false };
    let triggers = ctx.zones.set_zone_flag(&zone, 0, key, value);
    for trigger in triggers {
        super::run_actions(ctx, target_session, character, &trigger.actions);
    }
    true
}

#[allow(clippy::too_many_arguments)]
fn update_quest(
    ctx: &ServerCtx,
    target_session: &SharedSession,
    character: &mut CharacterState,
    quest_id: u32,
    phase: i8,
    force: bool,
    flag_updates: &[(usize, i32)],
) -> bool {
    let outcome = crate::event::update_quest(&ctx.definitions, character, quest_id, phase, force, flag_updates);
    if outcome.applied {
        persist_progress(ctx, character);
        if outcome.notify {
            target_session.read().send(ServerPacket::QuestPhaseUpdate { quest_id, phase });
        }
    }
    outcome.applied
}

fn zone_instance(ctx: &ServerCtx, target_session: &SharedSession, character: &mut CharacterState, mode: &ZoneInstanceMode) -> bool {
    match mode {
        ZoneInstanceMode::Create { definition_id, variant_id } => {
            match ctx.zones.create_instance_for_session(ctx, target_session, *definition_id, *variant_id, None, None) {
                Ok(instance) => {
                    character.instance_id = Some(instance.instance_id);
                    true
                }
                Err(e) => {
                    warn!(error = %e, "zone_instance: create failed");
                    false
                }
            }
        }
        ZoneInstanceMode::Join => {
            let Some(access) = ctx.zones.get_instance_access(target_session) else { return false };
            match ctx.zones.move_to_instance(ctx, target_session, &access) {
                Ok(_) => {
                    character.instance_id = Some(access.instance_id);
                    true
                }
                Err(e) => {
                    warn!(error = %e, "zone_instance: join failed");
                    false
                }
            }
        }
        ZoneInstanceMode::Remove => {
            let Some(instance_id) = character.instance_id.take() else { return false };
            ctx.zones.remove_instance(instance_id)
        }
        ZoneInstanceMode::StartTimer { timer_id, expire_event_id } => {
            let Some(instance) = character.instance_id.and_then(|id| ctx.zones.instance(id)) else { return false };
            match ctx.zones.start_instance_timer(&instance, *timer_id, expire_event_id.clone()) {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, "zone_instance: start_timer failed");
                    false
                }
            }
        }
        ZoneInstanceMode::StopTimer => {
            let Some(instance) = character.instance_id.and_then(|id| ctx.zones.instance(id)) else { return false };
            ctx.zones.stop_instance_timer(&instance);
            true
        }
    }
}

fn spawn(ctx: &ServerCtx, target_session: &SharedSession, group_id: Option<u32>, force: bool) -> bool {
    let Some(zone_id) = target_session.read().zone_id else { return false };
    let Some(zone) = ctx.zones.resolve_zone(target_session, zone_id, 0) else { return false };
    let spawned = ctx.zones.update_spawn_groups(&zone, force, group_id, &ctx.clock);
    debug!(count = spawned.len(), "spawn: reconciled spawn group");
    true
}

#[allow(clippy::too_many_arguments)]
fn create_loot(
    ctx: &ServerCtx,
    target_session: &SharedSession,
    character: &mut CharacterState,
    items: &[(u32, u16)],
    x: f32,
    y: f32,
    relative_to_source: bool,
    expiration_time: i64,
) -> bool {
    let Some(zone_id) = target_session.read().zone_id else { return false };
    let Some(zone) = ctx.zones.resolve_zone(target_session, zone_id, 0) else { return false };

    let (final_x, final_y) = if relative_to_source { (character.x + x, character.y + y) } else { (x, y) };
    let entity_id = ctx.zones.next_entity_id();
    zone.entities.write().insert(
        entity_id,
        crate::zone::ZoneEntity { entity_id, entity_type: ZoneEntityType::LootBox, character: None, x: final_x, y: final_y, rotation: 0.0 },
    );
    debug!(entity_id, items = items.len(), "create_loot: loot box placed");

    if expiration_time > 0 {
        let at = ctx.clock.now() + chrono::Duration::seconds(expiration_time);
        ctx.zones.schedule_entity_removal(at, &zone, vec![entity_id]);
    }
    true
}

fn persist_character(ctx: &ServerCtx, character: &CharacterState) {
    let store = ctx.store.clone();
    let change_set = ChangeSet::new().update(character.character.uuid, character.character.clone().into_record());
    tokio::spawn(async move {
        if let Err(e) = store.apply(&change_set).await {
            warn!(error = %e, "persist_character: failed");
        }
    });
}

fn persist_progress(ctx: &ServerCtx, character: &CharacterState) {
    let store = ctx.store.clone();
    let change_set = ChangeSet::new().update(character.progress.uuid, character.progress.clone().into_record());
    tokio::spawn(async move {
        if let Err(e) = store.apply(&change_set).await {
            warn!(error = %e, "persist_progress: failed");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountManager;
    use crate::action::ActionGroupRegistry;
    use crate::db::{Character, CharacterProgress, Store};
    use crate::definitions::{Definitions, ItemDefinition, ZoneDefinition};
    use crate::event::{EventRuntime, NoopScriptHost};
    use crate::network::WorldConnection;
    use crate::state::SessionRegistry;
    use crate::sync::SyncManager;
    use crate::zone::ZoneManager;
    use std::collections::HashMap;
    use std::sync::Arc;
    use uuid::Uuid;

    async fn test_ctx(definitions: Definitions) -> ServerCtx {
        let store = Store::connect(":memory:", 1).await.expect("in-memory store");
        ServerCtx::new(
            store.clone(),
            Arc::new(definitions),
            Arc::new(ZoneManager::new()),
            Arc::new(SessionRegistry::new()),
            Arc::new(SyncManager::new()),
            Arc::new(WorldConnection::new().0),
            Arc::new(AccountManager::new(store)),
            Arc::new(EventRuntime::new()),
            Arc::new(ActionGroupRegistry::new()),
            Arc::new(NoopScriptHost) as Arc<dyn crate::event::ScriptHost>,
            Arc::new(crate::config::Config {
                server: crate::config::ServerConfig {
                    channel_id: 1,
                    expected_client_version: "1.000".into(),
                    name: "test-channel".into(),
                    listen_address: "127.0.0.1:0".parse().unwrap(),
                    log_format: crate::config::LogFormat::Pretty,
                    metrics_port: 0,
                    session_sweep_interval_secs: 10,
                    session_timeout_secs: 300,
                },
                world: crate::config::WorldConfig {
                    address: "127.0.0.1:0".parse().unwrap(),
                    link_password: "test".into(),
                    reconnect_secs: 5,
                    sync_flush_interval_ms: 100,
                },
                database: crate::config::DatabaseConfig { url: ":memory:".into(), max_connections: 1 },
                limits: crate::config::LimitsConfig::default(),
                security: crate::config::SecurityConfig::default(),
                definitions_path: ".".into(),
            }),
        )
    }

    fn character_state() -> CharacterState {
        let character = Character {
            uuid: Uuid::new_v4(),
            account: Uuid::new_v4(),
            name: "Tester".into(),
            level: 10,
            lnc: 0,
            homepoint_zone: 1,
            homepoint_spot: 1,
            progress: Uuid::new_v4(),
            item_boxes: Vec::new(),
            demon_boxes: Vec::new(),
            active_demon: None,
            hotbar: None,
            friend_settings: None,
            bazaar_data: None,
            expertises: Vec::new(),
            demon_quests: Vec::new(),
            clan: None,
            event_counters: Vec::new(),
            gender: 0,
            equipment: Vec::new(),
            logout_zone: 0,
            logout_x: 0.0,
            logout_y: 0.0,
            logout_rot: 0.0,
        };
        let progress = CharacterProgress {
            uuid: character.progress,
            character: character.uuid,
            completed_quests: Vec::new(),
            active_quests: Vec::new(),
        };
        CharacterState::new(character, progress)
    }

    fn session() -> SharedSession {
        Arc::new(parking_lot::RwLock::new(crate::state::Session::new("tester")))
    }

    /// A spot-based `ZONE_CHANGE` places the session at the spot's
    /// authored coordinates, not the action's own x/y/rotation.
    #[tokio::test]
    async fn zone_change_with_spot_id_uses_spot_coordinates() {
        let mut zones = HashMap::new();
        zones.insert(1001, ZoneDefinition { id: 1001, name: "test zone".into(), dynamic_map_id: 1, global: false });
        let definitions = Definitions::from_tables(HashMap::new(), HashMap::new(), HashMap::new(), HashMap::new(), zones, HashMap::new())
            .with_spot(1, 5, 100.0, 200.0, std::f32::consts::PI);
        let ctx = test_ctx(definitions).await;

        let target_session = session();
        let mut character = character_state();

        let ok = execute(
            &ctx,
            &target_session,
            &mut character,
            &ActionType::ZoneChange { zone_id: 1001, dynamic_map_id: 1, x: 0.0, y: 0.0, rotation: 0.0, spot_id: Some(5) },
        );

        assert!(ok);
        assert_eq!(target_session.read().zone_id, Some(1001));
        assert_eq!(character.x, 100.0);
        assert_eq!(character.y, 200.0);
        assert_eq!(character.rotation, std::f32::consts::PI);
    }

    /// `ZONE_CHANGE(zone_id=0, spot_id=Some(_))` moves within the current
    /// zone and must not churn zone membership (no leave/re-enter),
    /// unlike the nonzero-zone spot case above.
    #[tokio::test]
    async fn zone_change_same_zone_spot_warps_without_membership_churn() {
        let definitions = Definitions::from_tables(HashMap::new(), HashMap::new(), HashMap::new(), HashMap::new(), HashMap::new(), HashMap::new())
            .with_spot(7, 9, 50.0, 60.0, 1.5);
        let ctx = test_ctx(definitions).await;

        let zone = ctx.zones.global_zone(500, 7, 500);
        let target_session = session();
        let mut character = character_state();
        target_session.write().zone_id = Some(500);
        zone.connections.write().insert(target_session.read().username.clone());
        zone.entities.write().insert(
            1,
            crate::zone::ZoneEntity {
                entity_id: 1,
                entity_type: crate::zone::ZoneEntityType::Player,
                character: Some(character.uuid),
                x: 0.0,
                y: 0.0,
                rotation: 0.0,
            },
        );

        let ok = execute(
            &ctx,
            &target_session,
            &mut character,
            &ActionType::ZoneChange { zone_id: 0, dynamic_map_id: 0, x: 0.0, y: 0.0, rotation: 0.0, spot_id: Some(9) },
        );

        assert!(ok);
        assert_eq!(target_session.read().zone_id, Some(500));
        assert_eq!(character.x, 50.0);
        assert_eq!(character.y, 60.0);
        assert!(zone.connections.read().contains(&target_session.read().username));
        assert_eq!(zone.entities.read().get(&1).unwrap().x, 50.0);
    }

    /// `ADD_REMOVE_ITEMS(MATERIAL_TANK,...)` against an item whose
    /// category isn't the material-tank category fails outright, before
    /// any store mutation is attempted.
    #[tokio::test]
    async fn add_remove_items_material_tank_rejects_wrong_category() {
        let mut items = HashMap::new();
        items.insert(1234, ItemDefinition { id: 1234, name: "widget".into(), category_main: 2, category_sub: 3, stack_size: 99 });
        let definitions = Definitions::from_tables(items, HashMap::new(), HashMap::new(), HashMap::new(), HashMap::new(), HashMap::new());
        let ctx = test_ctx(definitions).await;

        let target_session = session();
        let mut character = character_state();
        character.character.item_boxes.push(Uuid::new_v4());

        let ok = execute(
            &ctx,
            &target_session,
            &mut character,
            &ActionType::AddRemoveItems { mode: ItemMode::MaterialTank, item_type: 1234, quantity: 10 },
        );

        assert!(!ok);
    }
}
