//! Event instances and the branch-state they track while running (spec
//! §4.G "Event instance").

use std::collections::HashSet;

/// The eight event node kinds plus `FORK`, a branch-only node with no
/// client-visible send step of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    NpcMessage,
    ExNpcMessage,
    Multitalk,
    Prompt,
    PlayScene,
    PerformActions,
    OpenMenu,
    Direction,
    ITime,
    Fork,
}

/// A single branch definition: conditions (or a named branch-logic
/// script) gating a `next`/`queue_next` target, mirroring
/// `EventManager::HandleNext`'s branch table.
#[derive(Debug, Clone, Default)]
pub struct EventBranch {
    pub conditions: Vec<super::Condition>,
    pub next: Option<String>,
    pub queue_next: Option<String>,
}

/// One node in the event graph.
#[derive(Debug, Clone)]
pub struct EventDefinition {
    pub id: String,
    pub event_type: EventType,
    pub entry_conditions: Vec<super::Condition>,
    pub branches: Vec<EventBranch>,
    /// Name of a registered `ScriptHost` branch-logic script; when set,
    /// takes precedence over `branches`' own conditions.
    pub branch_script_id: Option<String>,
    pub branch_script_params: Vec<String>,
    /// Single fallback successor when there are no branches at all.
    pub next: Option<String>,
    pub queue_next: Option<String>,
    /// `PROMPT`/`ITIME` menu choice count; `PERFORM_ACTIONS` action-group id.
    pub choice_count: u32,
    pub action_group_id: u32,
    /// Number of lines an `NPC_MESSAGE`/`EX_NPC_MESSAGE`/`MULTITALK` node
    /// has; a "continue" click advances `EventInstance::index` through
    /// these before the node actually branches. `1` for every other type.
    pub message_count: u32,
    /// Pushes this event onto the previous-stack instead of discarding it
    /// once `next`/`queue_next` both resolve empty.
    pub pop: bool,
    pub pop_next: bool,
}

/// Whether an instance is running its own event or a pushed sub-branch;
/// kept distinct from the id so an instance can resume a branch that
/// isn't the event's own root state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventBranchState {
    Root,
    Branch(u32),
}

/// A running (or suspended) event, one per entry on a session's event
/// stack.
#[derive(Debug, Clone)]
pub struct EventInstance {
    pub event_id: String,
    pub event_type: EventType,
    pub state: EventBranchState,
    pub source_entity_id: i32,
    pub action_group_id: u32,
    /// Message cursor for `NPC_MESSAGE`/`MULTITALK`, action-list cursor
    /// for `PERFORM_ACTIONS`.
    pub index: u32,
    pub disabled_choices: HashSet<u32>,
    pub no_interrupt: bool,
    /// Non-zero only while an `ITIME` menu is open (spec invariant 4).
    pub itime_id: i32,
}

impl EventInstance {
    pub fn new(event_id: impl Into<String>, event_type: EventType, source_entity_id: i32) -> Self {
        Self {
            event_id: event_id.into(),
            event_type,
            state: EventBranchState::Root,
            source_entity_id,
            action_group_id: 0,
            index: 0,
            disabled_choices: HashSet::new(),
            no_interrupt: false,
            itime_id: 0,
        }
    }
}
