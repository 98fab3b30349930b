//! Transient runtime mirror of a hydrated `Character`.

use crate::db::{Character, CharacterProgress};
use crate::event::ActiveQuestState;
use std::collections::HashMap;
use uuid::Uuid;

/// Computed stats recalculated whenever level, equipment, or active
/// effects change. Kept separate from the persisted `Character` record so
/// recalculation never touches the store directly.
#[derive(Debug, Clone, Default)]
pub struct ComputedStats {
    pub str_: i32,
    pub magic: i32,
    pub vit: i32,
    pub intel: i32,
    pub speed: i32,
    pub luck: i32,
    pub max_hp: i32,
    pub max_mp: i32,
    pub hp: i32,
    pub mp: i32,
}

/// Runtime mirror held while a character is in play. `uuid` addresses the
/// backing `Character` record in the `Store`; this struct never leaks a
/// reference to another runtime object, only UUIDs.
pub struct CharacterState {
    pub uuid: Uuid,
    pub character: Character,
    pub progress: CharacterProgress,
    pub stats: ComputedStats,
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub zone_id: u32,
    pub instance_id: Option<u32>,
    pub active_status_effects: HashMap<u32, crate::db::StatusEffect>,
    pub active_skills: Vec<u32>,
    /// Quests currently in progress, keyed by quest id. `progress.completed_quests`/`active_quests`
    /// hold the persisted projection; this is the live scratch state the
    /// event runtime mutates as kills/flags come in.
    pub active_quests: HashMap<u32, ActiveQuestState>,
    /// Event counters, keyed by
    /// counter id.
    pub event_counters: HashMap<u32, i32>,
    /// Backing `EventCounter` record uuid for each hydrated counter id, so
    /// logout can update an existing record instead of minting a
    /// duplicate for a counter that already has one.
    pub event_counter_records: HashMap<u32, Uuid>,
    /// Devil ids of demons currently in COMP, hydrated at login from
    /// `character.demon_boxes`. Not refreshed by `UPDATE_COMP`, which
    /// mutates the `DemonBox` record directly without touching this
    /// mirror — same lag `active_skills`/`InventoryFree` already carry.
    pub comp_devil_ids: Vec<u32>,
    pub comp_free_slots: i32,
    /// Material item type -> stacked count, hydrated at login by scanning
    /// the character's item boxes for material-tank slots. Same
    /// hydrate-once tradeoff as `comp_devil_ids`.
    pub material_counts: HashMap<u32, i32>,
}

impl CharacterState {
    pub fn new(character: Character, progress: CharacterProgress) -> Self {
        Self {
            uuid: character.uuid,
            character,
            progress,
            stats: ComputedStats::default(),
            x: 0.0,
            y: 0.0,
            rotation: 0.0,
            zone_id: 0,
            instance_id: None,
            active_status_effects: HashMap::new(),
            active_skills: Vec::new(),
            active_quests: HashMap::new(),
            event_counters: HashMap::new(),
            event_counter_records: HashMap::new(),
            comp_devil_ids: Vec::new(),
            comp_free_slots: 0,
            material_counts: HashMap::new(),
        }
    }

    /// Recompute derived stats from base character fields, equipment, and
    /// active status effects. Equipment/expertise contributions are
    /// folded in by the caller before status-effect modifiers are applied,
    /// matching the hydrate-then-recalculate order in `AccountManager`.
    pub fn recalculate_stats(&mut self) {
        let level = self.character.level as i32;
        self.stats.max_hp = 100 + level * 20;
        self.stats.max_mp = 50 + level * 10;
        self.stats.hp = self.stats.hp.min(self.stats.max_hp).max(0);
        self.stats.mp = self.stats.mp.min(self.stats.max_mp).max(0);
        if self.stats.hp == 0 && self.active_status_effects.is_empty() {
            self.stats.hp = self.stats.max_hp;
            self.stats.mp = self.stats.max_mp;
        }
    }
}
