//! EventRuntime — the stack-based event-graph interpreter.
//!
//! One event node is "current" at a time, pushed/popped on a per-session
//! stack ([`crate::state::Session`]'s `current_event`/`previous_events`/
//! `queued_events`), with branch resolution driven by conditions or an
//! optional named script. `ScriptHost` (see [`script`]) is the seam for a
//! pluggable scripting engine.

mod condition;
mod demon_quest;
mod instance;
mod quest;
mod script;

pub use condition::{evaluate, CompareMode, CompareSet, Condition, ConditionContext, ConditionType};
pub use demon_quest::{new_demon_quest, quest_type as demon_quest_type, sequence_bonus_xp, update_demon_quest_progress};
pub use instance::{EventBranch, EventBranchState, EventDefinition, EventInstance, EventType};
pub use quest::{update_quest, update_quest_kill_count, ActiveQuestState};
pub use script::{NoopScriptHost, ScriptContext, ScriptHost};

use std::collections::HashMap;

use dashmap::DashMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::network::ServerPacket;
use crate::state::{CharacterState, ServerCtx, SharedSession, WorldClock};

/// Failures raised by the event runtime.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("unknown event {0}")]
    UnknownEvent(String),
    #[error("no event is currently running for this session")]
    NoCurrentEvent,
    #[error("choice {0} is disabled for the current event")]
    ChoiceDisabled(u32),
}

/// A snapshot of everything a condition needs to read, cloned out from
/// under the locks that actually own it so [`ConditionContext`] can hold
/// plain references with a local lifetime.
struct EvalSnapshot {
    zone_flags: HashMap<(i32, String), i32>,
    instance_flags: HashMap<(i32, String), i32>,
    event_counters: HashMap<u32, i32>,
    world_counters: HashMap<u32, i32>,
    active_quest_phases: HashMap<u32, i8>,
    comp_devil_ids: Vec<u32>,
    comp_free_slots: i32,
    material_counts: HashMap<u32, i32>,
    destiny_box_free_slots: Option<i32>,
    instance_access: Option<(u32, u32)>,
}

impl EvalSnapshot {
    fn context<'a>(&'a self, character: &'a CharacterState, clock: &'a WorldClock) -> ConditionContext<'a> {
        ConditionContext {
            character,
            zone_flags: &self.zone_flags,
            instance_flags: &self.instance_flags,
            event_counters: &self.event_counters,
            world_counters: &self.world_counters,
            active_quest_phases: &self.active_quest_phases,
            comp_devil_ids: &self.comp_devil_ids,
            comp_free_slots: self.comp_free_slots,
            material_counts: &self.material_counts,
            destiny_box_free_slots: self.destiny_box_free_slots,
            instance_access: self.instance_access,
            clock,
        }
    }
}

/// Which [`ConditionType`] variants [`condition::evaluate`] itself
/// resolves from core state. Everything else routes to the
/// [`ScriptHost`] fallback in [`evaluate_with_script`] instead of being
/// treated as a hard "false".
fn is_core_backed(condition_type: ConditionType) -> bool {
    use ConditionType::*;
    matches!(
        condition_type,
        Level
            | Lnc
            | ZoneFlags
            | ZoneCharacterFlags
            | ZoneInstanceFlags
            | ZoneInstanceCharacterFlags
            | EventCounter
            | EventWorldCounter
            | Timespan
            | TimespanWeek
            | TimespanDatetime
            | InventoryFree
            | QuestComplete
            | QuestActive
            | QuestSequence
            | QuestsActive
            | SkillLearned
            | StatusActive
            | Gender
            | ClanHome
            | Equipped
            | SiEquipped
            | CompDemon
            | CompFree
            | StatValue
            | Material
            | DestinyBox
            | InstanceAccess
            | PartySize
            | TeamSize
            | TeamLeader
            | TeamType
            | TeamCategory
    )
}

/// Evaluates one condition, falling back to `script_host` for the types
/// `condition::evaluate` doesn't model directly. The condition's own `negate` flag is honored in both paths.
pub fn evaluate_with_script(
    condition: &Condition,
    ctx: &ConditionContext<'_>,
    script_ctx: &ScriptContext<'_>,
    script_host: &dyn ScriptHost,
) -> bool {
    if is_core_backed(condition.condition_type) {
        return evaluate(condition, ctx);
    }
    let tag = format!("{:?}", condition.condition_type);
    let params = vec![
        condition.value1.to_string(),
        condition.value2.to_string(),
        condition.value3.to_string(),
    ];
    let Some(result) = script_host.eval_condition(&tag, &params, script_ctx) else {
        return false;
    };
    if condition.negate {
        !result
    } else {
        result
    }
}

/// Owns the authored event graph and the server-wide counter table (spec
/// §4.G `EVENT_WORLD_COUNTER`). Per-session state lives on `Session`
/// itself, not here — this is the read-mostly graph plus the one piece of
/// genuinely shared mutable state the graph can reference.
pub struct EventRuntime {
    definitions: HashMap<String, EventDefinition>,
    world_counters: DashMap<u32, i32>,
}

impl Default for EventRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl EventRuntime {
    pub fn new() -> Self {
        Self {
            definitions: HashMap::new(),
            world_counters: DashMap::new(),
        }
    }

    pub fn register(&mut self, definition: EventDefinition) {
        self.definitions.insert(definition.id.clone(), definition);
    }

    pub fn get(&self, event_id: &str) -> Option<&EventDefinition> {
        self.definitions.get(event_id)
    }

    pub fn world_counter(&self, counter_id: u32) -> i32 {
        self.world_counters.get(&counter_id).map(|e| *e).unwrap_or(0)
    }

    pub fn set_world_counter(&self, counter_id: u32, value: i32) {
        self.world_counters.insert(counter_id, value);
    }

    fn snapshot(&self, ctx: &ServerCtx, session: &SharedSession, character: &CharacterState) -> EvalSnapshot {
        let zone_flags = session
            .read()
            .zone_id
            .and_then(|zone_id| {
                let dynamic_map_id = character.instance_id.map(|_| 0).unwrap_or(0);
                ctx.zones
                    .resolve_zone(session, zone_id, dynamic_map_id)
                    .map(|zone| ctx.zones.zone_flags_snapshot(&zone))
            })
                .unwrap_or_default();
        let instance_flags = character
            .instance_id
            .and_then(|id| ctx.zones.instance(id))
            .map(|instance| instance.flags.read().clone())
            .unwrap_or_default();
        let active_quest_phases = character
            .active_quests
            .iter()
            .map(|(id, state)| (*id, state.phase))
            .collect();
        let world_counters: HashMap<u32, i32> = self
            .world_counters
            .iter()
            .map(|e| (*e.key(), *e.value()))
            .collect();

        let instance = character.instance_id.and_then(|id| ctx.zones.instance(id));
        let destiny_box_free_slots = instance.as_ref().and_then(|instance| {
            session.read().world_cid.map(|world_cid| {
                let occupied = instance.destiny_box(world_cid).len() as i32;
                (ctx.config.limits.destiny_box_slots as i32 - occupied).max(0)
            })
        });
        let instance_access = instance.as_ref().map(|instance| (instance.definition_id, instance.variant_id));

        EvalSnapshot {
            zone_flags,
            instance_flags,
            event_counters: character.event_counters.clone(),
            world_counters,
            active_quest_phases,
            comp_devil_ids: character.comp_devil_ids.clone(),
            comp_free_slots: character.comp_free_slots,
            material_counts: character.material_counts.clone(),
            destiny_box_free_slots,
            instance_access,
        }
    }

    /// Builds a fresh instance for `definition`, pre-evaluating
    /// `PROMPT`/`ITIME` branch conditions so a choice whose branch
    /// wouldn't pass is recorded in `disabled_choices` up front rather
    /// than only discovered once the client picks it, and opening an
    /// `ITIME` menu by giving it a non-zero `itime_id`.
    fn build_instance(
        &self,
        ctx: &ServerCtx,
        session: &SharedSession,
        character: &CharacterState,
        definition: &EventDefinition,
        event_id: impl Into<String>,
        source_entity_id: i32,
    ) -> EventInstance {
        let mut instance = EventInstance::new(event_id, definition.event_type, source_entity_id);

        if matches!(definition.event_type, EventType::Prompt | EventType::ITime) {
            let snapshot = self.snapshot(ctx, session, character);
            let eval_ctx = snapshot.context(character, &ctx.clock);
            let script_ctx = ScriptContext { character: Some(character), demon: None, zone: None };
            for (idx, branch) in definition.branches.iter().enumerate() {
                let passes = branch
                    .conditions
                    .iter()
                    .all(|c| evaluate_with_script(c, &eval_ctx, &script_ctx, ctx.script_host.as_ref()));
                if !passes {
                    instance.disabled_choices.insert(idx as u32);
                }
            }
        }

        if definition.event_type == EventType::ITime {
            instance.itime_id = if source_entity_id != 0 { source_entity_id } else { 1 };
        }

        instance
    }

    /// Starts (or queues) `event_id` as the session's current event once
    /// its entry conditions pass.
    pub fn handle_event(
        &self,
        ctx: &ServerCtx,
        session: &SharedSession,
        character: &mut CharacterState,
        event_id: &str,
        source_entity_id: i32,
    ) -> Result<(), EventError> {
        let definition = self
            .definitions
            .get(event_id)
            .ok_or_else(|| EventError::UnknownEvent(event_id.to_string()))?;

        let snapshot = self.snapshot(ctx, session, character);
        let eval_ctx = snapshot.context(character, &ctx.clock);
        let script_ctx = ScriptContext { character: Some(character), demon: None, zone: None };
        let passes = definition
            .entry_conditions
            .iter()
            .all(|c| evaluate_with_script(c, &eval_ctx, &script_ctx, ctx.script_host.as_ref()));
        if !passes {
            debug!(event_id, "event entry conditions failed");
            return Ok(());
        }

        let instance = self.build_instance(ctx, session, character, definition, event_id, source_entity_id);
        session.write().set_or_queue_event(instance);
        self.dispatch_current(ctx, session, character)
    }

    /// Applies a client's menu/prompt choice and advances the state
    /// machine.
    /// `choice` is signed so an `ITIME` menu's first response — the
    /// client's negated acknowledgement of the menu having opened, not a
    /// real selection — can be told apart from an actual choice index.
    pub fn handle_response(
        &self,
        ctx: &ServerCtx,
        session: &SharedSession,
        character: &mut CharacterState,
        choice: i32,
    ) -> Result<(), EventError> {
        {
            let s = session.read();
            let current = s.current_event.as_ref().ok_or(EventError::NoCurrentEvent)?;
            if current.event_type == EventType::ITime && choice < 0 {
                drop(s);
                return self.send_current(ctx, session);
            }
            if choice >= 0 && current.disabled_choices.contains(&(choice as u32)) {
                return Err(EventError::ChoiceDisabled(choice as u32));
            }
        }
        self.transition(ctx, session, character, Some(choice as usize))?;
        self.dispatch_current(ctx, session, character)
    }

    /// Advances past a non-interactive node (`NPC_MESSAGE`/`MULTITALK`
    /// continue click, or the auto-continue after `PERFORM_ACTIONS`
    /// finishes) without a client-supplied choice.
    pub fn handle_next(
        &self,
        ctx: &ServerCtx,
        session: &SharedSession,
        character: &mut CharacterState,
    ) -> Result<(), EventError> {
        self.transition(ctx, session, character, None)?;
        self.dispatch_current(ctx, session, character)
    }

    /// Resends the client-visible message for the session's current event
    /// without re-running entry conditions, for the `ChannelLogin`
    /// hand-off case where the event stack already moved with the session.
    pub fn resume_after_channel_change(
        &self,
        ctx: &ServerCtx,
        session: &SharedSession,
        character: &mut CharacterState,
    ) -> Result<(), EventError> {
        if session.read().current_event.is_none() {
            return Ok(());
        }
        self.send_current(ctx, session)
    }

    fn transition(
        &self,
        ctx: &ServerCtx,
        session: &SharedSession,
        character: &mut CharacterState,
        branch_choice: Option<usize>,
    ) -> Result<(), EventError> {
        let current_id = session
            .read()
            .current_event
            .as_ref()
            .ok_or(EventError::NoCurrentEvent)?
            .event_id
            .clone();
        let source_entity_id = session.read().current_event.as_ref().map(|e| e.source_entity_id).unwrap_or(0);
        let definition = self
            .definitions
            .get(&current_id)
            .ok_or_else(|| EventError::UnknownEvent(current_id.clone()))?;

        let still_reading = {
            let s = session.read();
            let current = s.current_event.as_ref().ok_or(EventError::NoCurrentEvent)?;
            branch_choice.is_none()
                && matches!(current.event_type, EventType::NpcMessage | EventType::ExNpcMessage | EventType::Multitalk)
                && current.index + 1 < definition.message_count
        };
        if still_reading {
            session.write().current_event.as_mut().unwrap().index += 1;
            return Ok(());
        }

        let (next, queue_next) = self.resolve_branch(ctx, session, character, definition, branch_choice);

        if let Some(qid) = &queue_next {
            if let Some(def) = self.definitions.get(qid) {
                let instance = self.build_instance(ctx, session, character, def, qid.clone(), source_entity_id);
                session.write().queued_events.push_back(instance);
            } else {
                warn!(event_id = %qid, "queue_next target event is not registered");
            }
        }

        if let Some(nid) = next {
            if let Some(def) = self.definitions.get(&nid) {
                let instance = self.build_instance(ctx, session, character, def, nid, source_entity_id);
                session.write().current_event = Some(instance);
                return Ok(());
            }
            warn!(event_id = %nid, "next target event is not registered");
        }

        let mut s = session.write();
        if definition.pop {
            if let Some(resumed) = s.previous_events.pop() {
                s.current_event = Some(resumed);
                return Ok(());
            }
        }
        if let Some(queued) = s.queued_events.pop_front() {
            s.current_event = Some(queued);
        } else {
            s.end_event();
        }
        Ok(())
    }

    /// Resolves which branch fires: a named branch script takes
    /// precedence, then the client's own choice index, then the first
    /// branch whose conditions all pass, finally the event's own
    /// `next`/`queue_next` fallback.
    fn resolve_branch(
        &self,
        ctx: &ServerCtx,
        session: &SharedSession,
        character: &CharacterState,
        definition: &EventDefinition,
        branch_choice: Option<usize>,
    ) -> (Option<String>, Option<String>) {
        if let Some(script_id) = &definition.branch_script_id {
            let script_ctx = ScriptContext { character: Some(character), demon: None, zone: None };
            if let Some(idx) = ctx.script_host.eval_branch(script_id, &definition.branch_script_params, &script_ctx) {
                if let Some(branch) = definition.branches.get(idx) {
                    return (branch.next.clone(), branch.queue_next.clone());
                }
            }
        }

        if let Some(idx) = branch_choice {
            if let Some(branch) = definition.branches.get(idx) {
                return (branch.next.clone(), branch.queue_next.clone());
            }
        }

        let snapshot = self.snapshot(ctx, session, character);
        let eval_ctx = snapshot.context(character, &ctx.clock);
        let script_ctx = ScriptContext { character: Some(character), demon: None, zone: None };
        for branch in &definition.branches {
            let passes = branch
                .conditions
                .iter()
                .all(|c| evaluate_with_script(c, &eval_ctx, &script_ctx, ctx.script_host.as_ref()));
            if passes {
                return (branch.next.clone(), branch.queue_next.clone());
            }
        }

        (definition.next.clone(), definition.queue_next.clone())
    }

    /// Sends the client-visible message for whatever the session's
    /// current event now is, running `PERFORM_ACTIONS` groups inline and
    /// immediately advancing past them since they have no message of
    /// their own to display.
    fn dispatch_current(&self, ctx: &ServerCtx, session: &SharedSession, character: &mut CharacterState) -> Result<(), EventError> {
        let Some(current) = session.read().current_event.clone() else {
            return Ok(());
        };

        if current.event_type == EventType::PerformActions {
            let group_id = self
                .definitions
                .get(&current.event_id)
                .map(|d| d.action_group_id)
                .unwrap_or(0);
            crate::action::run_event_actions(ctx, session, character, group_id);

            // An action mid-group requested a channel switch: the resume
            // cursor is already stamped onto the parked `ChannelLogin`, so
            // ship it now and stop advancing the event here — the target
            // channel continues it, not this one.
            if session.read().channel_switch_pending {
                ctx.account.finalize_channel_change(ctx, character.uuid);
                session.write().channel_switch_pending = false;
                return Ok(());
            }
            return self.handle_next(ctx, session, character);
        }

        // FORK has no client-visible message of its own — it's a silent
        // branch node, so it auto-advances through `resolve_branch` the
        // same way PERFORM_ACTIONS does once its group is done.
        if current.event_type == EventType::Fork {
            return self.handle_next(ctx, session, character);
        }

        self.send_current(ctx, session)
    }

    fn send_current(&self, ctx: &ServerCtx, session: &SharedSession) -> Result<(), EventError> {
        let Some(current) = session.read().current_event.clone() else {
            return Ok(());
        };
        let definition = self.definitions.get(&current.event_id);
        let packet = match current.event_type {
            EventType::NpcMessage => ServerPacket::EventNpcMessage {
                event_id: current.source_entity_id as u32,
                message_id: current.index,
            },
            EventType::ExNpcMessage => ServerPacket::EventExNpcMessage {
                event_id: current.source_entity_id as u32,
                message_id: current.index,
            },
            EventType::Multitalk => ServerPacket::EventMultitalk { event_id: current.source_entity_id as u32 },
            EventType::Prompt | EventType::ITime => {
                let choice_count = definition.map(|d| d.choice_count).unwrap_or(0);
                let choices: Vec<u32> = (0..choice_count).collect();
                let disabled: Vec<bool> = choices.iter().map(|c| current.disabled_choices.contains(c)).collect();
                ServerPacket::EventPrompt { event_id: current.source_entity_id as u32, choices, disabled }
            }
            EventType::PlayScene => ServerPacket::EventPlayScene { scene_id: current.source_entity_id as u32 },
            EventType::OpenMenu => ServerPacket::EventOpenMenu { menu_id: current.source_entity_id as u32 },
            EventType::Direction => ServerPacket::EventDirection { event_id: current.source_entity_id as u32 },
            EventType::PerformActions | EventType::Fork => return Ok(()),
        };
        session.read().send(packet);
        Ok(())
    }
}

/// A character's active status effects and skills, plus the zone/instance
/// flag state, are everything [`ScriptHost`] transforms may read — never
/// mutate directly.
pub fn script_context<'a>(character: &'a CharacterState, demon: Option<&'a crate::state::DemonState>) -> ScriptContext<'a> {
    ScriptContext { character: Some(character), demon, zone: None }
}
