//! `Zone` — one map partition's live state.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use uuid::Uuid;

use super::spawn::SpawnGroupConfig;

/// Kind of a tracked zone entity. NPCs/objects are placed by content
/// authoring; players, enemies, and loot boxes are runtime-created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneEntityType {
    Npc,
    Object,
    Player,
    Enemy,
    LootBox,
}

/// One tracked entity inside a [`Zone`]: an NPC, object, player,
/// enemy, or loot box.
#[derive(Debug, Clone)]
pub struct ZoneEntity {
    pub entity_id: u32,
    pub entity_type: ZoneEntityType,
    /// Backing character UUID, set only for `Player` entities.
    pub character: Option<Uuid>,
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
}

/// An action list fired when a zone flag transitions to a specific value
///. The action list itself is opaque here
/// ([`crate::action::Action`]) to avoid `zone` depending on `action`'s
/// full module for a field type alone; the dispatcher is what actually
/// runs it, handed back by [`super::ZoneManager::set_zone_flag`].
#[derive(Debug, Clone)]
pub struct FlagSetTrigger {
    pub key: i32,
    pub value: i32,
    pub actions: Vec<crate::action::Action>,
}

/// A single zone/map-partition instance. There is no back-pointer to the
/// owning instance here — instances own their zones by `Arc`, and a zone
/// never needs to resolve its own parent (`ZoneManager` always has both
/// ends in hand).
pub struct Zone {
    pub zone_id: u32,
    pub dynamic_map_id: u32,
    pub definition_id: u32,
    pub global: bool,
    pub instance_id: Option<u32>,
    pub flags: RwLock<HashMap<(i32, String), i32>>,
    pub entities: RwLock<HashMap<u32, ZoneEntity>>,
    /// Usernames of sessions with a live connection resident in this zone.
    pub connections: RwLock<HashSet<String>>,
    pub spawn_groups: RwLock<HashMap<u32, SpawnGroupConfig>>,
    pub flag_triggers: Vec<FlagSetTrigger>,
}

impl Zone {
    pub fn new(zone_id: u32, dynamic_map_id: u32, definition_id: u32, global: bool, instance_id: Option<u32>) -> Self {
        Self {
            zone_id,
            dynamic_map_id,
            definition_id,
            global,
            instance_id,
            flags: RwLock::new(HashMap::new()),
            entities: RwLock::new(HashMap::new()),
            connections: RwLock::new(HashSet::new()),
            spawn_groups: RwLock::new(HashMap::new()),
            flag_triggers: Vec::new(),
        }
    }

    pub fn population(&self) -> usize {
        self.connections.read().len()
    }
}
