//! Action-type catalog and the authored `Action` record.
//!
//! One variant per effect, carrying exactly the parameters that effect
//! needs, matched in [`super::handlers::execute`] instead of stored as a
//! function pointer.

use uuid::Uuid;

use super::fanout::{Location, SourceContext};

/// `ADD_REMOVE_ITEMS` destination. `Post` only accepts
/// additions; `MaterialTank` additionally validates the item's category
/// and caps each stack at the item's own `stack_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemMode {
    Inventory,
    TimeTrialReward,
    MaterialTank,
    Post,
}

/// `ZONE_INSTANCE` sub-operation.
#[derive(Debug, Clone)]
pub enum ZoneInstanceMode {
    Create {
        definition_id: u32,
        variant_id: u32,
    },
    Join,
    Remove,
    StartTimer {
        timer_id: u32,
        expire_event_id: Option<String>,
    },
    StopTimer,
}

/// One effect an authored action performs.
#[derive(Debug, Clone)]
pub enum ActionType {
    /// `(zone_id, dynamic_map_id) == (0, 0)` with no `spot_id` means
    /// "return to homepoint"; `dynamic_map_id == 0` inside a known
    /// instance resolves from the instance's own zone list instead of the
    /// global zone map.
    ZoneChange {
        zone_id: u32,
        dynamic_map_id: u32,
        x: f32,
        y: f32,
        rotation: f32,
        spot_id: Option<u32>,
    },
    StartEvent {
        event_id: String,
    },
    SetHomepoint,
    SetNpcState {
        entity_id: u32,
        state: i32,
    },
    AddRemoveItems {
        mode: ItemMode,
        item_type: u32,
        /// Positive adds, negative removes.
        quantity: i32,
    },
    AddRemoveStatus {
        status_id: u32,
        /// Positive adds/refreshes stack, negative removes it.
        stack_delta: i16,
        /// Overrides the status definition's own default duration.
        duration_ms: Option<u32>,
    },
    UpdateComp {
        add_slots: u8,
        remove: Vec<Uuid>,
        contract: Vec<Uuid>,
    },
    GrantSkills {
        skill_ids: Vec<u32>,
    },
    GrantXp {
        amount: i32,
    },
    DisplayMessage {
        message_id: u32,
    },
    StageEffect {
        effect_id: u32,
    },
    SpecialDirection {
        direction_id: u32,
    },
    /// `None` stops whatever BGM is currently playing.
    PlayBgm {
        bgm_id: Option<u32>,
    },
    PlaySoundEffect {
        effect_id: u32,
    },
    /// Character-scoped flag; distinct
    /// from `UpdateZoneFlags`, which is zone-wide.
    UpdateFlag {
        key: i32,
        value: i32,
    },
    UpdateLnc {
        delta: i16,
    },
    UpdatePoints {
        point_type: u32,
        delta: i32,
    },
    UpdateQuest {
        quest_id: u32,
        phase: i8,
        /// Bypasses the non-repeatable-already-completed refusal.
        force: bool,
        /// `(flag index, value)` pairs applied on top of whatever flags
        /// the phase transition keeps.
        flag_updates: Vec<(usize, i32)>,
    },
    /// Zone-wide flag; fires any
    /// [`crate::zone::FlagSetTrigger`]s that match.
    UpdateZoneFlags {
        key: i32,
        value: i32,
    },
    ZoneInstance {
        mode: ZoneInstanceMode,
    },
    Spawn {
        group_id: Option<u32>,
        force: bool,
    },
    /// No drop-set/loot-table definition exists in `Definitions`:
    /// contents are carried explicitly as `(item_type, quantity)` pairs
    /// rather than computed from a drop set.
    CreateLoot {
        items: Vec<(u32, u16)>,
        x: f32,
        y: f32,
        relative_to_source: bool,
        expiration_time: i64,
    },
}

/// One authored entry in an action group. `source_context`/
/// `location` select which live sessions it runs against; `stop_on_failure`
/// halts the rest of the group the first time this action's handler
/// returns `false` for any resolved target; `on_failure_event` fires
/// through [`crate::event::EventRuntime`] for that same target when it
/// fails, regardless of whether the group itself stops.
#[derive(Debug, Clone)]
pub struct Action {
    pub action_type: ActionType,
    pub source_context: SourceContext,
    pub location: Location,
    pub stop_on_failure: bool,
    pub on_failure_event: Option<String>,
}

impl Action {
    pub fn new(action_type: ActionType) -> Self {
        Self {
            action_type,
            source_context: SourceContext::Source,
            location: Location::Zone,
            stop_on_failure: false,
            on_failure_event: None,
        }
    }

    pub fn with_fanout(mut self, source_context: SourceContext, location: Location) -> Self {
        self.source_context = source_context;
        self.location = location;
        self
    }

    pub fn with_failure_policy(mut self, stop_on_failure: bool, on_failure_event: Option<String>) -> Self {
        self.stop_on_failure = stop_on_failure;
        self.on_failure_event = on_failure_event;
        self
    }
}
