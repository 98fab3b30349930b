//! Numeric gameplay caps.

use serde::Deserialize;

fn default_inventory_slots() -> usize {
    50
}

fn default_comp_slots() -> usize {
    10
}

fn default_destiny_box_slots() -> usize {
    30
}

fn default_broadcast_radius() -> f32 {
    4000.0
}

/// All eleven `DemonQuestTypeDef` bits set (KILL through PLASMA).
fn default_enabled_demon_quest_types() -> u16 {
    0x07FF
}

fn default_max_post_items() -> usize {
    50
}

/// Output/data caps shared by several components.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Max slots per item box (spec invariant 6: inventory ≤ 50 slots).
    #[serde(default = "default_inventory_slots")]
    pub inventory_slots: usize,
    /// Max COMP demon slots before `UPDATE_COMP` slot-add is capped.
    #[serde(default = "default_comp_slots")]
    pub comp_slots: usize,
    /// Max per-player loot slots in a `ZoneInstance`'s destiny box.
    #[serde(default = "default_destiny_box_slots")]
    pub destiny_box_slots: usize,
    /// Fixed in-game radius used by `send_to_range` and `SAY` chat.
    #[serde(default = "default_broadcast_radius")]
    pub broadcast_radius: f32,
    /// Bitmask gating which `DemonQuestTypeDef` values
    /// `demon_quest::generate` may hand out, bit `n` set for discriminant
    /// `n + 1` (KILL is bit 0, PLASMA is bit 10).
    #[serde(default = "default_enabled_demon_quest_types")]
    pub enabled_demon_quest_types: u16,
    /// Max parked `PostItem` entries a single account's mailbox holds;
    /// a CP shop purchase over this returns `ShopBuy`'s `-1` over-capacity
    /// result instead of minting another one.
    #[serde(default = "default_max_post_items")]
    pub max_post_items: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            inventory_slots: default_inventory_slots(),
            comp_slots: default_comp_slots(),
            destiny_box_slots: default_destiny_box_slots(),
            broadcast_radius: default_broadcast_radius(),
            enabled_demon_quest_types: default_enabled_demon_quest_types(),
            max_post_items: default_max_post_items(),
        }
    }
}
