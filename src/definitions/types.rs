//! Plain data records returned by [`super::Definitions`] lookups.
//!
//! These mirror authored game content, not player state: no field here is
//! ever mutated after load, so every struct derives only the traits a
//! read-only table needs.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ItemDefinition {
    pub id: u32,
    pub name: String,
    pub category_main: u8,
    pub category_sub: u8,
    pub stack_size: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DevilDefinition {
    pub id: u32,
    pub name: String,
    pub race_id: u8,
    pub base_level: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SkillDefinition {
    pub id: u32,
    pub name: String,
    pub function_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusDefinition {
    pub id: u32,
    pub name: String,
    pub default_duration_ms: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZoneDefinition {
    pub id: u32,
    pub name: String,
    pub dynamic_map_id: u32,
    pub global: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotDefinition {
    pub dynamic_map_id: u32,
    pub spot_id: u32,
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
}

/// One kill-target requirement within a quest phase.
#[derive(Debug, Clone, Deserialize)]
pub struct KillRequirement {
    pub enemy_type: u32,
    pub count: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuestDefinition {
    pub id: u32,
    pub name: String,
    pub max_phase: i8,
    /// Whether this quest can be started again after being completed
    /// once, checked by `update_quest` on (re-)creation.
    #[serde(default)]
    pub repeatable: bool,
    /// Kill requirements indexed by phase (phase 0's requirements at
    /// index 0, etc.); phases without a kill objective have an empty entry.
    #[serde(default)]
    pub phase_kill_requirements: Vec<Vec<KillRequirement>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShopProductDefinition {
    pub id: u32,
    pub item_id: u32,
    pub price: u32,
    /// Whether this product is bought with CP (posted to the account's
    /// mailbox) rather than macca/items (added directly to the inventory).
    /// The original keys this off the *item*'s CP flag rather than the
    /// product's price, since some CP products are priced at zero here;
    /// this table only has product-level content, so the flag is carried
    /// on the product instead — a simplification, not a faithful port.
    #[serde(default)]
    pub cp_item: bool,
    /// Stack quantity a CP purchase delivers, overriding the client's
    /// requested quantity the way the original's `product->GetStack()` does.
    #[serde(default)]
    pub cp_stack: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnchantDefinition {
    pub id: u32,
    pub soul_point_cost: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SynthesisDefinition {
    pub id: u32,
    pub result_item_id: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExpertClassDefinition {
    pub id: u32,
    pub name: String,
    pub max_rank: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimeLimitDefinition {
    pub id: u32,
    pub start_minute_of_day: u16,
    pub end_minute_of_day: u16,
    pub days_of_week: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GuardianLevelDefinition {
    pub race_id: u8,
    pub levels: Vec<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokuseiDefinition {
    pub id: i32,
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FusionRangeDefinition {
    pub race_id: u8,
    pub min_level: u8,
    pub max_level: u8,
    pub result_devil_id: u32,
}

/// One of the eleven fixed daily demon-quest kinds (`DemonQuest::Type_t`),
/// discriminant order `KILL..=PLASMA` matching the persisted `quest_type`
/// byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum DemonQuestTypeDef {
    Kill,
    Contract,
    Crystallize,
    EnchantTarot,
    EnchantSoul,
    Fuse,
    Item,
    EquipmentMod,
    SynthMelee,
    SynthGun,
    Plasma,
}

/// One field-roster entry a kill/contract/crystallize/enchant demon quest
/// can draw its target demon from: the enemy type plus the data needed to
/// filter the roster down to a valid candidate pool (level range,
/// talk-resistance, race).
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct DemonQuestCandidate {
    pub enemy_type: u32,
    pub level: u8,
    pub race_id: u8,
    /// 0-100; a spawn at or above 100 can never be talked to and so is
    /// unusable for anything but a KILL quest.
    pub talk_resist: u8,
}

/// One drop entry within a [`DropSetDefinition`].
#[derive(Debug, Clone, Deserialize)]
pub struct ItemDropDefinition {
    pub item_type: u32,
    pub min_stack: u16,
    pub max_stack: u16,
    /// Relative weight out of the drop set's total, used for the
    /// weighted chance item pick.
    pub weight: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DropSetDefinition {
    pub id: u32,
    pub drops: Vec<ItemDropDefinition>,
}

/// Whether a bonus reward takes every qualifying entry or just one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum DemonQuestBonusMode {
    All,
    Single,
}

/// One demon-quest reward-table entry (`DemonQuestReward`). Every
/// restriction field is a filter applied in `AddDemonQuestRewards`'s
/// ground-truth order: quest type, race, level, familiarity, then
/// sequence count.
#[derive(Debug, Clone, Deserialize)]
pub struct DemonQuestRewardDefinition {
    pub id: u32,
    /// `0` means ungrouped; groups with more than one entry keep only the
    /// highest id once sorted.
    pub group_id: u32,
    /// Empty means "applies to every quest type".
    #[serde(default)]
    pub quest_types: Vec<DemonQuestTypeDef>,
    /// `None` means "applies to every race".
    #[serde(default)]
    pub race_id: Option<u8>,
    #[serde(default)]
    pub level_min: u8,
    #[serde(default = "u8::max_value")]
    pub level_max: u8,
    #[serde(default)]
    pub familiarity_min: u16,
    #[serde(default = "u16::max_value")]
    pub familiarity_max: u16,
    /// `0` means "no sequence restriction".
    #[serde(default)]
    pub sequence_start: u32,
    #[serde(default)]
    pub sequence_repeat: u32,
    #[serde(default)]
    pub sequence_end: u32,
    #[serde(default)]
    pub normal_drop_sets: Vec<u32>,
    #[serde(default)]
    pub bonus_drop_sets: Vec<u32>,
    #[serde(default)]
    pub chance_drop_sets: Vec<u32>,
    #[serde(default)]
    pub bonus_titles: Vec<u16>,
    #[serde(default)]
    pub bonus_xp: i32,
    #[serde(default = "demon_quest_bonus_mode_all")]
    pub bonus_mode: DemonQuestBonusMode,
}

fn demon_quest_bonus_mode_all() -> DemonQuestBonusMode {
    DemonQuestBonusMode::All
}
