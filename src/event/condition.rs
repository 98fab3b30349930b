//! Event/quest condition evaluation.
//!
//! A condition carries a type, up to two integer operands, a compare
//! mode, and a negate flag, and each type fixes its own default compare
//! mode and the set of modes it accepts.

use std::collections::HashMap;

use crate::state::{CharacterState, WorldClock};

/// The full condition-type catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionType {
    Script,
    ZoneFlags,
    ZoneCharacterFlags,
    ZoneInstanceFlags,
    ZoneInstanceCharacterFlags,
    PartnerAlive,
    PartnerLevel,
    QuestActive,
    QuestComplete,
    QuestSequence,
    QuestsActive,
    Level,
    LncType,
    Lnc,
    Item,
    Valuable,
    Timespan,
    TimespanWeek,
    TimespanDatetime,
    MoonPhase,
    Map,
    ExpertiseActive,
    ExpertiseNotMaxed,
    SiEquipped,
    Summoned,
    Bethel,
    ClanHome,
    CompDemon,
    CompFree,
    Cowrie,
    DemonBook,
    DestinyBox,
    DiasporaBase,
    Equipped,
    EventCounter,
    EventWorldCounter,
    FactionGroup,
    Gender,
    InstanceAccess,
    InventoryFree,
    Material,
    NpcState,
    PartySize,
    PentalphaTeam,
    Plugin,
    SkillLearned,
    StatValue,
    StatusActive,
    TeamCategory,
    TeamLeader,
    TeamSize,
    TeamType,
    ZiotiteLarge,
    ZiotiteSmall,
}

/// Compare mode a condition is evaluated under. Two validity sets exist:
/// `EQ|LT|GTE` and `EQ|LT|GTE|BETWEEN`; `EXISTS` and `LT_OR_NAN` are
/// valid only for flag-state conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareMode {
    Equal,
    Lt,
    Gte,
    Between,
    Exists,
    LtOrNan,
    DefaultCompare,
}

/// Which compare modes a condition type accepts, used to validate a
/// configured mode before evaluating it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareSet {
    /// `EQUAL | LT | GTE`.
    Basic,
    /// `EQUAL | LT | GTE | BETWEEN`.
    Ranged,
    /// `EQUAL | LT | GTE | EXISTS | LT_OR_NAN` — flag-state conditions.
    FlagState,
}

impl CompareSet {
    fn accepts(self, mode: CompareMode) -> bool {
        match self {
            CompareSet::Basic => matches!(mode, CompareMode::Equal | CompareMode::Lt | CompareMode::Gte),
            CompareSet::Ranged => matches!(
                mode,
                CompareMode::Equal | CompareMode::Lt | CompareMode::Gte | CompareMode::Between
            ),
            CompareSet::FlagState => matches!(
                mode,
                CompareMode::Equal
                    | CompareMode::Lt
                    | CompareMode::Gte
                    | CompareMode::Exists
                    | CompareMode::LtOrNan
            ),
        }
    }
}

impl ConditionType {
    /// The mode a condition of this type uses when it's configured with
    /// `DefaultCompare`.
    pub fn default_compare(self) -> CompareMode {
        match self {
            ConditionType::ZoneFlags
            | ConditionType::ZoneCharacterFlags
            | ConditionType::ZoneInstanceFlags
            | ConditionType::ZoneInstanceCharacterFlags
            | ConditionType::EventCounter
            | ConditionType::EventWorldCounter => CompareMode::Equal,
            ConditionType::Level
            | ConditionType::Lnc
            | ConditionType::PartySize
            | ConditionType::TeamSize
            | ConditionType::StatValue
            | ConditionType::InventoryFree
            | ConditionType::Cowrie
            | ConditionType::Bethel
            | ConditionType::ZiotiteLarge
            | ConditionType::ZiotiteSmall => CompareMode::Gte,
            _ => CompareMode::Equal,
        }
    }

    /// Which compare modes this condition type is allowed to be
    /// configured with.
    pub fn compare_set(self) -> CompareSet {
        match self {
            ConditionType::ZoneFlags
            | ConditionType::ZoneCharacterFlags
            | ConditionType::ZoneInstanceFlags
            | ConditionType::ZoneInstanceCharacterFlags => CompareSet::FlagState,
            ConditionType::Level
            | ConditionType::Lnc
            | ConditionType::PartySize
            | ConditionType::TeamSize
            | ConditionType::StatValue
            | ConditionType::InventoryFree
            | ConditionType::Timespan
            | ConditionType::TimespanWeek
            | ConditionType::TimespanDatetime => CompareSet::Ranged,
            _ => CompareSet::Basic,
        }
    }
}

/// One evaluable predicate. `value1`/`value2` are the
/// configured operands; for `Between` mode `value2` is the range's lower
/// bound and `value3` the upper bound.
#[derive(Debug, Clone)]
pub struct Condition {
    pub condition_type: ConditionType,
    pub value1: i32,
    pub value2: i32,
    pub value3: i32,
    pub compare_mode: CompareMode,
    pub negate: bool,
}

impl Condition {
    pub fn new(condition_type: ConditionType, value1: i32, value2: i32) -> Self {
        Self {
            condition_type,
            value1,
            value2,
            value3: 0,
            compare_mode: CompareMode::DefaultCompare,
            negate: false,
        }
    }

    pub fn between(condition_type: ConditionType, value1: i32, low: i32, high: i32) -> Self {
        Self {
            condition_type,
            value1,
            value2: low,
            value3: high,
            compare_mode: CompareMode::Between,
            negate: false,
        }
    }

    pub fn negated(mut self) -> Self {
        self.negate = true;
        self
    }

    pub fn with_mode(mut self, mode: CompareMode) -> Self {
        self.compare_mode = mode;
        self
    }

    fn resolved_mode(&self) -> Option<CompareMode> {
        let mode = if self.compare_mode == CompareMode::DefaultCompare {
            self.condition_type.default_compare()
        } else {
            self.compare_mode
        };
        if mode == CompareMode::DefaultCompare {
            return None;
        }
        if mode == CompareMode::Exists && self.condition_type.compare_set() != CompareSet::FlagState
        {
            return None;
        }
        if !self.condition_type.compare_set().accepts(mode) {
            return None;
        }
        Some(mode)
    }

    /// Numeric comparison of `actual` against the condition's configured
    /// operand(s), per `EventManager::Compare`.
    fn compare(&self, actual: i32) -> bool {
        let Some(mode) = self.resolved_mode() else {
            return false;
        };
        match mode {
            CompareMode::Equal => actual == self.value1,
            CompareMode::Lt | CompareMode::LtOrNan => actual < self.value1,
            CompareMode::Gte => actual >= self.value1,
            CompareMode::Between => actual >= self.value2 && actual <= self.value3,
            CompareMode::Exists | CompareMode::DefaultCompare => false,
        }
    }

    /// Same as [`Condition::compare`] but against `value2`/`value3` rather
    /// than `value1` — `STAT_VALUE` and `MATERIAL` use `value1` to select
    /// what to read (a stat index, a material item type) and `value2` as
    /// the actual threshold.
    fn compare_threshold(&self, actual: i32) -> bool {
        let Some(mode) = self.resolved_mode() else {
            return false;
        };
        match mode {
            CompareMode::Equal => actual == self.value2,
            CompareMode::Lt | CompareMode::LtOrNan => actual < self.value2,
            CompareMode::Gte => actual >= self.value2,
            CompareMode::Between => actual >= self.value2 && actual <= self.value3,
            CompareMode::Exists | CompareMode::DefaultCompare => false,
        }
    }
}

/// Everything a condition needs to read to evaluate: the acting
/// character, the zone/instance flag tables, and the world clock for
/// timespan conditions.
pub struct ConditionContext<'a> {
    pub character: &'a CharacterState,
    pub zone_flags: &'a HashMap<(i32, String), i32>,
    pub instance_flags: &'a HashMap<(i32, String), i32>,
    pub event_counters: &'a HashMap<u32, i32>,
    pub world_counters: &'a HashMap<u32, i32>,
    /// `quest_id -> phase` for every quest currently active on the
    /// character, backing `QUEST_ACTIVE`/`QUEST_SEQUENCE`/`QUESTS_ACTIVE`.
    pub active_quest_phases: &'a HashMap<u32, i8>,
    /// Devil ids of demons currently in COMP, hydrated at login; stays
    /// stale against a `UPDATE_COMP` mutation until the next re-login,
    /// same eventual-consistency tradeoff `InventoryFree` already has.
    pub comp_devil_ids: &'a [u32],
    pub comp_free_slots: i32,
    /// Material item type -> stacked count, hydrated at login from the
    /// item boxes' material-tank slots.
    pub material_counts: &'a HashMap<u32, i32>,
    /// `None` when the character isn't in an instance; `Some(n)` for the
    /// instance's per-player destiny box free-slot count otherwise.
    pub destiny_box_free_slots: Option<i32>,
    /// `(definition_id, variant_id)` of the instance the character is
    /// currently in, if any.
    pub instance_access: Option<(u32, u32)>,
    pub clock: &'a WorldClock,
}

/// Evaluate a single condition against `ctx`. `None` means the condition
/// type isn't backed by core state (handed to `script_host` instead of
/// failing outright) — callers treat a `None` from both evaluators as
/// "condition not satisfied" (fail-closed), matching the source's
/// `LOG_ERROR` + `return false` pattern for malformed conditions.
pub fn evaluate(condition: &Condition, ctx: &ConditionContext<'_>) -> bool {
    let raw = match condition.condition_type {
        ConditionType::Level => evaluate_numeric(condition, ctx.character.character.level as i32),
        ConditionType::Lnc => evaluate_numeric(condition, ctx.character.character.lnc as i32),
        ConditionType::ZoneFlags => evaluate_flags(condition, ctx.zone_flags, 0),
        ConditionType::ZoneCharacterFlags => {
            evaluate_flags(condition, ctx.zone_flags, condition.value1)
        }
        ConditionType::ZoneInstanceFlags => evaluate_flags(condition, ctx.instance_flags, 0),
        ConditionType::ZoneInstanceCharacterFlags => {
            evaluate_flags(condition, ctx.instance_flags, condition.value1)
        }
        ConditionType::EventCounter => {
            let actual = ctx.event_counters.get(&(condition.value1 as u32)).copied().unwrap_or(0);
            condition.compare(actual)
        }
        ConditionType::EventWorldCounter => {
            let actual = ctx.world_counters.get(&(condition.value1 as u32)).copied().unwrap_or(0);
            condition.compare(actual)
        }
        ConditionType::Timespan => {
            ctx.clock.in_minute_range(condition.value1 as u32, condition.value2 as u32)
        }
        ConditionType::TimespanWeek => {
            ctx.clock.day_of_week() == condition.value1 as u32
        }
        ConditionType::TimespanDatetime => {
            ctx.clock.in_day_range(condition.value1 as u32, condition.value2 as u32)
        }
        ConditionType::InventoryFree => evaluate_numeric(condition, condition.value2),
        ConditionType::QuestComplete => {
            let bit = condition.value1 as u8;
            let byte = (bit / 8) as usize;
            let mask = 1u8 << (bit % 8);
            ctx.character
                .progress
                .completed_quests
                .get(byte)
                .map(|b| b & mask != 0)
                .unwrap_or(false)
        }
        ConditionType::QuestActive => ctx.active_quest_phases.contains_key(&(condition.value1 as u32)),
        ConditionType::QuestSequence => ctx
            .active_quest_phases
            .get(&(condition.value1 as u32))
            .map(|phase| condition.compare(*phase as i32))
            .unwrap_or(false),
        ConditionType::QuestsActive => evaluate_numeric(condition, ctx.active_quest_phases.len() as i32),
        ConditionType::SkillLearned => ctx.character.active_skills.contains(&(condition.value1 as u32)),
        ConditionType::StatusActive => ctx
            .character
            .active_status_effects
            .contains_key(&(condition.value1 as u32)),
        ConditionType::Gender => ctx.character.character.gender as i32 == condition.value1,
        ConditionType::ClanHome => ctx.character.character.homepoint_zone as i32 == condition.value1,
        ConditionType::Equipped => ctx
            .character
            .character
            .equipment
            .iter()
            .any(|slot| *slot == Some(condition.value1 as u32)),
        // Item-effect data isn't modeled; simplified to "any equip slot
        // occupied" rather than checking for a basic/special effect.
        ConditionType::SiEquipped => ctx.character.character.equipment.iter().any(|slot| slot.is_some()),
        ConditionType::CompDemon => ctx.comp_devil_ids.contains(&(condition.value1 as u32)),
        ConditionType::CompFree => condition.compare(ctx.comp_free_slots),
        ConditionType::StatValue => {
            let actual = match condition.value1 {
                0 => ctx.character.stats.str_,
                1 => ctx.character.stats.magic,
                2 => ctx.character.stats.vit,
                3 => ctx.character.stats.intel,
                4 => ctx.character.stats.speed,
                5 => ctx.character.stats.luck,
                6 => ctx.character.stats.max_hp,
                7 => ctx.character.stats.max_mp,
                8 => ctx.character.stats.hp,
                9 => ctx.character.stats.mp,
                _ => return false,
            };
            condition.compare_threshold(actual)
        }
        ConditionType::Material => {
            let actual = ctx.material_counts.get(&(condition.value1 as u32)).copied().unwrap_or(0);
            condition.compare_threshold(actual)
        }
        ConditionType::DestinyBox => match condition.compare_mode {
            CompareMode::Exists => ctx.destiny_box_free_slots.is_some(),
            _ => ctx.destiny_box_free_slots.map(|slots| condition.compare(slots)).unwrap_or(false),
        },
        ConditionType::InstanceAccess => match condition.compare_mode {
            CompareMode::Exists => ctx.instance_access.is_some(),
            _ => ctx
                .instance_access
                .map(|(definition_id, _variant_id)| definition_id as i32 == condition.value1)
                .unwrap_or(false),
        },
        // No party/team manager is tracked anywhere in this server; these
        // honestly report "no party"/"no team" (size 0, not a leader, no
        // type) rather than fabricating a subsystem that doesn't exist.
        ConditionType::PartySize | ConditionType::TeamSize => match condition.compare_mode {
            CompareMode::Exists => false,
            _ => condition.compare(0),
        },
        ConditionType::TeamLeader => false,
        ConditionType::TeamType | ConditionType::TeamCategory => condition.compare(-1),
        // Remaining condition types need content not modeled in core state
        // (script-provided tokusei, demon book, expertise tables, NPC
        // state) — see `EventRuntime::evaluate_with_script`, which falls
        // back to the `ScriptHost` for these before failing closed.
        _ => return false,
    };
    if condition.negate {
        !raw
    } else {
        raw
    }
}

fn evaluate_numeric(condition: &Condition, actual: i32) -> bool {
    condition.compare(actual)
}

fn evaluate_flags(
    condition: &Condition,
    flags: &HashMap<(i32, String), i32>,
    world_cid: i32,
) -> bool {
    let key = (world_cid, condition.value1.to_string());
    let mode = if condition.compare_mode == CompareMode::DefaultCompare {
        CompareMode::Equal
    } else {
        condition.compare_mode
    };
    match mode {
        CompareMode::Exists => flags.contains_key(&key),
        CompareMode::LtOrNan => flags.get(&key).map(|v| *v < condition.value2).unwrap_or(true),
        CompareMode::Lt => flags.get(&key).map(|v| *v < condition.value2).unwrap_or(false),
        CompareMode::Gte => flags.get(&key).map(|v| *v >= condition.value2).unwrap_or(false),
        _ => flags.get(&key).map(|v| *v == condition.value2).unwrap_or(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Character, CharacterProgress};
    use crate::state::ClockSource;
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::Arc;
    use uuid::Uuid;

    struct FixedClock(DateTime<Utc>);
    impl ClockSource for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn character_state() -> CharacterState {
        let character = Character {
            uuid: Uuid::new_v4(),
            account: Uuid::new_v4(),
            name: "Tester".into(),
            level: 42,
            lnc: -5000,
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

    fn ctx_at<'a>(character: &'a CharacterState, clock: &'a WorldClock, empty: &'a HashMap<(i32, String), i32>, empty_counters: &'a HashMap<u32, i32>, empty_phases: &'a HashMap<u32, i8>) -> ConditionContext<'a> {
        ConditionContext {
            character,
            zone_flags: empty,
            instance_flags: empty,
            event_counters: empty_counters,
            world_counters: empty_counters,
            active_quest_phases: empty_phases,
            comp_devil_ids: &[],
            comp_free_slots: 0,
            material_counts: empty_counters,
            destiny_box_free_slots: None,
            instance_access: None,
            clock,
        }
    }

    /// A timespan of 22:00-04:00 must accept times in either half of the
    /// wraparound, not just the literal `[min, max)` range.
    #[test]
    fn timespan_wraps_past_midnight() {
        let character = character_state();
        let flags = HashMap::new();
        let counters = HashMap::new();
        let phases = HashMap::new();

        let late_night = WorldClock::fixed(Arc::new(FixedClock(Utc.with_ymd_and_hms(2026, 1, 1, 23, 0, 0).unwrap())));
        let ctx = ctx_at(&character, &late_night, &flags, &counters, &phases);
        let condition = Condition::new(ConditionType::Timespan, 22 * 60, 4 * 60);
        assert!(evaluate(&condition, &ctx));

        let early_morning = WorldClock::fixed(Arc::new(FixedClock(Utc.with_ymd_and_hms(2026, 1, 2, 2, 0, 0).unwrap())));
        let ctx = ctx_at(&character, &early_morning, &flags, &counters, &phases);
        assert!(evaluate(&condition, &ctx));

        let midday = WorldClock::fixed(Arc::new(FixedClock(Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap())));
        let ctx = ctx_at(&character, &midday, &flags, &counters, &phases);
        assert!(!evaluate(&condition, &ctx));
    }

    #[test]
    fn level_condition_respects_negate() {
        let character = character_state();
        let flags = HashMap::new();
        let counters = HashMap::new();
        let phases = HashMap::new();
        let clock = WorldClock::system();
        let ctx = ctx_at(&character, &clock, &flags, &counters, &phases);

        let at_least_30 = Condition::new(ConditionType::Level, 30, 0).with_mode(CompareMode::Gte);
        assert!(evaluate(&at_least_30, &ctx));

        let below_30 = at_least_30.negated();
        assert!(!evaluate(&below_30, &ctx));
    }

    #[test]
    fn quest_complete_reads_progress_bitmask() {
        let mut character = character_state();
        character.progress.completed_quests = vec![0b0000_0100];
        let flags = HashMap::new();
        let counters = HashMap::new();
        let phases = HashMap::new();
        let clock = WorldClock::system();
        let ctx = ctx_at(&character, &clock, &flags, &counters, &phases);

        assert!(evaluate(&Condition::new(ConditionType::QuestComplete, 2, 0), &ctx));
        assert!(!evaluate(&Condition::new(ConditionType::QuestComplete, 3, 0), &ctx));
    }
}
