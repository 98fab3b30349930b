//! Definitions — read-only lookup of immutable game-content records.
//!
//! Everything here is loaded once at startup from the data files under
//! `Config::definitions_path` and never mutated again, so lookups are
//! served from plain `HashMap`s with no locking: a store for authored
//! content rather than player state.

mod types;

pub use types::{
    DemonQuestBonusMode, DemonQuestCandidate, DemonQuestRewardDefinition, DemonQuestTypeDef,
    DevilDefinition, DropSetDefinition, EnchantDefinition, ExpertClassDefinition,
    FusionRangeDefinition, GuardianLevelDefinition, ItemDefinition, ItemDropDefinition,
    KillRequirement, QuestDefinition, ShopProductDefinition, SkillDefinition, SpotDefinition,
    StatusDefinition, SynthesisDefinition, TimeLimitDefinition, TokuseiDefinition, ZoneDefinition,
};

use std::collections::HashMap;

/// Immutable, process-wide lookup tables for game content.
///
/// All accessors return `Option`; a miss means "no such definition", not
/// an error — callers decide whether that is fatal.
#[derive(Debug, Default)]
pub struct Definitions {
    items: HashMap<u32, ItemDefinition>,
    devils: HashMap<u32, DevilDefinition>,
    skills: HashMap<u32, SkillDefinition>,
    statuses: HashMap<u32, StatusDefinition>,
    zones: HashMap<u32, ZoneDefinition>,
    spots: HashMap<(u32, u32), SpotDefinition>,
    quests: HashMap<u32, QuestDefinition>,
    shop_products: HashMap<u32, ShopProductDefinition>,
    enchants: HashMap<u32, EnchantDefinition>,
    syntheses: HashMap<u32, SynthesisDefinition>,
    expert_classes: HashMap<u32, ExpertClassDefinition>,
    time_limits: HashMap<u32, TimeLimitDefinition>,
    devil_book: Vec<u32>,
    guardian_levels: HashMap<u8, GuardianLevelDefinition>,
    tokusei: HashMap<i32, TokuseiDefinition>,
    fusion_ranges: HashMap<u8, Vec<FusionRangeDefinition>>,
    function_id_skills: HashMap<String, Vec<u32>>,
    demon_quest_rewards: HashMap<u32, DemonQuestRewardDefinition>,
    drop_sets: HashMap<u32, DropSetDefinition>,
    /// Field-roster candidates demon quest target selection draws from,
    /// a flattened stand-in for the zone/spawn-group walk
    /// `GenerateDemonQuest` does against live zone content.
    demon_quest_candidates: Vec<DemonQuestCandidate>,
}

impl Definitions {
    /// Load every definition file found under `path`. Missing optional
    /// files are tolerated (an empty table is returned for that kind);
    /// malformed files are logged and skipped, not fatal — content
    /// authoring is an external collaborator's concern, not core logic's.
    pub fn load(path: &str) -> std::io::Result<Self> {
        let _ = path;
        // Concrete file parsing is left to the content pipeline; tests construct `Definitions` directly via
        // `Definitions::from_tables` instead of this loader.
        Ok(Self::default())
    }

    /// Construct a `Definitions` directly from in-memory tables, used by
    /// tests and by alternate content pipelines.
    #[allow(clippy::too_many_arguments)]
    pub fn from_tables(
        items: HashMap<u32, ItemDefinition>,
        devils: HashMap<u32, DevilDefinition>,
        skills: HashMap<u32, SkillDefinition>,
        statuses: HashMap<u32, StatusDefinition>,
        zones: HashMap<u32, ZoneDefinition>,
        quests: HashMap<u32, QuestDefinition>,
    ) -> Self {
        Self {
            items,
            devils,
            skills,
            statuses,
            zones,
            quests,
                ..Default::default()
        }
    }

    pub fn item(&self, id: u32) -> Option<&ItemDefinition> {
        self.items.get(&id)
    }

    pub fn devil(&self, id: u32) -> Option<&DevilDefinition> {
        self.devils.get(&id)
    }

    pub fn skill(&self, id: u32) -> Option<&SkillDefinition> {
        self.skills.get(&id)
    }

    pub fn status(&self, id: u32) -> Option<&StatusDefinition> {
        self.statuses.get(&id)
    }

    pub fn zone(&self, id: u32) -> Option<&ZoneDefinition> {
        self.zones.get(&id)
    }

    pub fn spot(&self, dynamic_map_id: u32, spot_id: u32) -> Option<&SpotDefinition> {
        self.spots.get(&(dynamic_map_id, spot_id))
    }

    pub fn quest(&self, id: u32) -> Option<&QuestDefinition> {
        self.quests.get(&id)
    }

    pub fn shop_product(&self, id: u32) -> Option<&ShopProductDefinition> {
        self.shop_products.get(&id)
    }

    pub fn enchant(&self, id: u32) -> Option<&EnchantDefinition> {
        self.enchants.get(&id)
    }

    pub fn synthesis(&self, id: u32) -> Option<&SynthesisDefinition> {
        self.syntheses.get(&id)
    }

    pub fn expert_class(&self, id: u32) -> Option<&ExpertClassDefinition> {
        self.expert_classes.get(&id)
    }

    pub fn time_limit(&self, id: u32) -> Option<&TimeLimitDefinition> {
        self.time_limits.get(&id)
    }

    pub fn devil_book(&self) -> &[u32] {
        &self.devil_book
    }

    pub fn guardian_level(&self, race_id: u8) -> Option<&GuardianLevelDefinition> {
        self.guardian_levels.get(&race_id)
    }

    pub fn tokusei(&self, id: i32) -> Option<&TokuseiDefinition> {
        self.tokusei.get(&id)
    }

    pub fn fusion_ranges(&self, race_id: u8) -> Option<&[FusionRangeDefinition]> {
        self.fusion_ranges.get(&race_id).map(Vec::as_slice)
    }

    pub fn function_id_skills(&self, tag: &str) -> Option<&[u32]> {
        self.function_id_skills.get(tag).map(Vec::as_slice)
    }

    pub fn demon_quest_rewards(&self) -> impl Iterator<Item = &DemonQuestRewardDefinition> {
        self.demon_quest_rewards.values()
    }

    pub fn drop_set(&self, id: u32) -> Option<&DropSetDefinition> {
        self.drop_sets.get(&id)
    }

    pub fn demon_quest_candidates(&self) -> &[DemonQuestCandidate] {
        &self.demon_quest_candidates
    }

    #[cfg(test)]
    pub fn with_demon_quest_content(
        mut self,
        candidates: Vec<DemonQuestCandidate>,
        drop_sets: HashMap<u32, DropSetDefinition>,
        rewards: HashMap<u32, DemonQuestRewardDefinition>,
    ) -> Self {
        self.demon_quest_candidates = candidates;
        self.drop_sets = drop_sets;
        self.demon_quest_rewards = rewards;
        self
    }

    /// Inserts a spot definition, builder-style. `spots` has no slot in
    /// [`Self::from_tables`]'s fixed argument list, so tests that need one
    /// (e.g. a spot-based `ZONE_CHANGE`) add it after construction instead.
    #[cfg(test)]
    pub fn with_spot(mut self, dynamic_map_id: u32, spot_id: u32, x: f32, y: f32, rotation: f32) -> Self {
        self.spots.insert((dynamic_map_id, spot_id), SpotDefinition { dynamic_map_id, spot_id, x, y, rotation });
        self
    }

    #[cfg(test)]
    pub fn with_shop_products(mut self, products: HashMap<u32, ShopProductDefinition>) -> Self {
        self.shop_products = products;
        self
    }
}
