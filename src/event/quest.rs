//! Quest progression engine.

use tracing::debug;

use crate::definitions::Definitions;
use crate::state::CharacterState;

/// Live scratch state for one in-progress quest, keyed by
/// quest id on [`crate::state::CharacterState::active_quests`].
#[derive(Debug, Clone, Default)]
pub struct ActiveQuestState {
    pub phase: i8,
    pub kill_counts: Vec<u16>,
    pub custom_data: Vec<i32>,
    /// Persists across phase advances (unlike `kill_counts`, which is
    /// reset scratch data); only a flag-updates call or a later phase
    /// rewrites an entry here.
    pub flags: Vec<i32>,
}

/// Outcome of [`update_quest`]: whether the transition applied, and
/// whether the caller should notify the client (a phase-0 flags-only
/// update is deliberately silent).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuestUpdateOutcome {
    pub applied: bool,
    pub notify: bool,
}

const NOT_APPLIED: QuestUpdateOutcome = QuestUpdateOutcome { applied: false, notify: false };

/// Starts, advances, completes (`phase == -1`), or deletes
/// (`phase == -2`) `quest_id`, per spec §4.G:
/// - `-2`: clears the completion bit and removes the active record.
/// - `-1`: removes the active record and sets the completion bit
///   unconditionally, then recalculates the character's quest-state
///   tokusei.
/// - same phase as the quest's current phase (most commonly `0`): applies
///   `flag_updates` in place with no kill-count reset and no client
///   notification.
/// - a phase greater than current: advances, resets kill-count scratch,
///   keeps prior flags, then applies `flag_updates` on top.
///
/// `force` bypasses the non-repeatable-already-completed refusal.
pub fn update_quest(
    definitions: &Definitions,
    character: &mut CharacterState,
    quest_id: u32,
    phase: i8,
    force: bool,
    flag_updates: &[(usize, i32)],
) -> QuestUpdateOutcome {
    let Some(def) = definitions.quest(quest_id) else {
        debug!(quest_id, "update_quest: unknown quest definition");
        return NOT_APPLIED;
    };

    if phase == -2 {
        character.active_quests.remove(&quest_id);
        clear_completed(character, quest_id);
        return QuestUpdateOutcome { applied: true, notify: true };
    }

    if phase == -1 {
        character.active_quests.remove(&quest_id);
        mark_completed(character, quest_id);
        character.recalculate_stats();
        return QuestUpdateOutcome { applied: true, notify: true };
    }

    if def.max_phase > 0 && phase > def.max_phase {
        debug!(quest_id, phase, "update_quest: phase out of range");
        return NOT_APPLIED;
    }

    let current_phase = character.active_quests.get(&quest_id).map(|s| s.phase);

    if current_phase == Some(phase) {
        let entry = character.active_quests.get_mut(&quest_id).expect("just checked present");
        apply_flag_updates(&mut entry.flags, flag_updates);
        return QuestUpdateOutcome { applied: true, notify: false };
    }

    if let Some(current) = current_phase {
        if phase < current {
            debug!(quest_id, phase, current, "update_quest: refusing to move phase backward");
            return NOT_APPLIED;
        }
    }

    if !force && !def.repeatable && is_completed(character, quest_id) {
        debug!(quest_id, "update_quest: non-repeatable quest already completed");
        return NOT_APPLIED;
    }

    let prior_flags = character.active_quests.get(&quest_id).map(|s| s.flags.clone()).unwrap_or_default();
    let kill_slots = def
        .phase_kill_requirements
        .get(phase as usize)
        .map(Vec::len)
        .unwrap_or(0);
    let entry = character.active_quests.entry(quest_id).or_default();
    entry.phase = phase;
    entry.kill_counts = vec![0; kill_slots];
    entry.flags = prior_flags;
    apply_flag_updates(&mut entry.flags, flag_updates);
    QuestUpdateOutcome { applied: true, notify: true }
}

fn apply_flag_updates(flags: &mut Vec<i32>, updates: &[(usize, i32)]) {
    for &(idx, value) in updates {
        if flags.len() <= idx {
            flags.resize(idx + 1, 0);
        }
        flags[idx] = value;
    }
}

fn is_completed(character: &CharacterState, quest_id: u32) -> bool {
    let byte = (quest_id / 8) as usize;
    let mask = 1u8 << (quest_id % 8);
    character
        .progress
        .completed_quests
        .get(byte)
        .map(|b| b & mask != 0)
        .unwrap_or(false)
}

fn mark_completed(character: &mut CharacterState, quest_id: u32) {
    let byte = (quest_id / 8) as usize;
    let mask = 1u8 << (quest_id % 8);
    if character.progress.completed_quests.len() <= byte {
        character.progress.completed_quests.resize(byte + 1, 0);
    }
    character.progress.completed_quests[byte] |= mask;
}

fn clear_completed(character: &mut CharacterState, quest_id: u32) {
    let byte = (quest_id / 8) as usize;
    let mask = 1u8 << (quest_id % 8);
    if let Some(b) = character.progress.completed_quests.get_mut(byte) {
        *b &= !mask;
    }
}

/// Increments the kill count for `enemy_type` across every active quest
/// whose current phase requires it, returning the ids whose requirements
/// are now fully met.
pub fn update_quest_kill_count(definitions: &Definitions, character: &mut CharacterState, enemy_type: u32) -> Vec<u32> {
    let mut satisfied = Vec::new();
    let quest_ids: Vec<u32> = character.active_quests.keys().copied().collect();

    for quest_id in quest_ids {
        let Some(def) = definitions.quest(quest_id) else { continue };
        let phase = character.active_quests[&quest_id].phase;
        let Some(requirements) = def.phase_kill_requirements.get(phase as usize) else { continue };
        if requirements.is_empty() {
            continue;
        }

        let state = character.active_quests.get_mut(&quest_id).expect("just checked present");
        let mut all_met = true;
        for (idx, req) in requirements.iter().enumerate() {
            if req.enemy_type == enemy_type {
                if let Some(count) = state.kill_counts.get_mut(idx) {
                    *count = count.saturating_add(1).min(req.count);
                }
            }
            all_met &= state.kill_counts.get(idx).copied().unwrap_or(0) >= req.count;
        }
        if all_met {
            satisfied.push(quest_id);
        }
    }

    satisfied
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Character, CharacterProgress};
    use crate::definitions::{KillRequirement, QuestDefinition};
    use std::collections::HashMap;
    use uuid::Uuid;

    fn character_state() -> CharacterState {
        let character = Character {
            uuid: Uuid::new_v4(),
            account: Uuid::new_v4(),
            name: "Tester".into(),
            level: 10,
            lnc: 0,
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

    fn definitions_with(quest: QuestDefinition) -> Definitions {
        let mut quests = HashMap::new();
        quests.insert(quest.id, quest);
        Definitions::from_tables(HashMap::new(), HashMap::new(), HashMap::new(), HashMap::new(), HashMap::new(), quests)
    }

    fn kill_quest() -> QuestDefinition {
        QuestDefinition {
            id: 42,
            name: "kill quest".into(),
            max_phase: 2,
            repeatable: false,
            phase_kill_requirements: vec![vec![KillRequirement { enemy_type: 100, count: 3 }], Vec::new()],
        }
    }

    /// A quest requiring 3 kills of enemy 100 reaches its cap on the
    /// third kill event, not before, and never overshoots.
    #[test]
    fn kill_count_caps_at_requirement() {
        let defs = definitions_with(kill_quest());
        let mut character = character_state();
        assert!(update_quest(&defs, &mut character, 42, 0, false, &[]).applied);

        assert!(update_quest_kill_count(&defs, &mut character, 100).is_empty());
        assert!(update_quest_kill_count(&defs, &mut character, 100).is_empty());
        assert_eq!(character.active_quests[&42].kill_counts[0], 2);

        let satisfied = update_quest_kill_count(&defs, &mut character, 100);
        assert_eq!(satisfied, vec![42]);
        assert_eq!(character.active_quests[&42].kill_counts[0], 3);

        // A fourth kill event must not push the count past the cap.
        update_quest_kill_count(&defs, &mut character, 100);
        assert_eq!(character.active_quests[&42].kill_counts[0], 3);
    }

    #[test]
    fn phase_minus_one_completes_and_clears_active_record() {
        let defs = definitions_with(kill_quest());
        let mut character = character_state();
        update_quest(&defs, &mut character, 42, 1, false, &[]);
        assert!(character.active_quests.contains_key(&42));

        let outcome = update_quest(&defs, &mut character, 42, -1, false, &[]);
        assert!(outcome.applied && outcome.notify);
        assert!(!character.active_quests.contains_key(&42));
        assert!(is_completed(&character, 42));
    }

    /// Invariant 4: `-1` sets the completion bit unconditionally, even
    /// when the quest was stopped short of its final phase.
    #[test]
    fn phase_minus_one_completes_even_mid_quest() {
        let defs = definitions_with(kill_quest());
        let mut character = character_state();
        update_quest(&defs, &mut character, 42, 0, false, &[]);

        update_quest(&defs, &mut character, 42, -1, false, &[]);
        assert!(is_completed(&character, 42));
        assert!(!character.active_quests.contains_key(&42));
    }

    #[test]
    fn phase_minus_two_clears_completion_bit() {
        let defs = definitions_with(kill_quest());
        let mut character = character_state();
        update_quest(&defs, &mut character, 42, 1, false, &[]);
        update_quest(&defs, &mut character, 42, -1, false, &[]);
        assert!(is_completed(&character, 42));

        let outcome = update_quest(&defs, &mut character, 42, -2, false, &[]);
        assert!(outcome.applied && outcome.notify);
        assert!(!is_completed(&character, 42));
        assert!(!character.active_quests.contains_key(&42));
    }

    #[test]
    fn non_repeatable_quest_refuses_restart_after_completion() {
        let defs = definitions_with(kill_quest());
        let mut character = character_state();
        update_quest(&defs, &mut character, 42, 1, false, &[]);
        update_quest(&defs, &mut character, 42, -1, false, &[]);

        assert!(!update_quest(&defs, &mut character, 42, 0, false, &[]).applied);
        assert!(!character.active_quests.contains_key(&42));
    }

    /// `force` bypasses the non-repeatable-already-completed refusal.
    #[test]
    fn force_bypasses_non_repeatable_refusal() {
        let defs = definitions_with(kill_quest());
        let mut character = character_state();
        update_quest(&defs, &mut character, 42, 1, false, &[]);
        update_quest(&defs, &mut character, 42, -1, false, &[]);

        assert!(update_quest(&defs, &mut character, 42, 0, true, &[]).applied);
        assert!(character.active_quests.contains_key(&42));
    }

    #[test]
    fn advancing_phase_resets_kill_count_scratch() {
        let defs = definitions_with(kill_quest());
        let mut character = character_state();
        update_quest(&defs, &mut character, 42, 0, false, &[]);
        update_quest_kill_count(&defs, &mut character, 100);
        assert_eq!(character.active_quests[&42].kill_counts[0], 1);

        update_quest(&defs, &mut character, 42, 1, false, &[]);
        assert!(character.active_quests[&42].kill_counts.is_empty());
    }

    /// A same-phase call with flag updates only is silent (no kill-count
    /// reset) and must not reset flags set by an earlier call.
    #[test]
    fn same_phase_flag_update_is_silent_and_preserves_kill_counts() {
        let defs = definitions_with(kill_quest());
        let mut character = character_state();
        update_quest(&defs, &mut character, 42, 0, false, &[]);
        update_quest_kill_count(&defs, &mut character, 100);

        let outcome = update_quest(&defs, &mut character, 42, 0, false, &[(0, 7)]);
        assert!(outcome.applied && !outcome.notify);
        assert_eq!(character.active_quests[&42].flags, vec![7]);
        assert_eq!(character.active_quests[&42].kill_counts[0], 1);
    }

    /// Advancing to a later phase keeps prior flags and overlays
    /// `flag_updates` on top rather than discarding them.
    #[test]
    fn advancing_phase_keeps_prior_flags_and_overlays_updates() {
        let defs = definitions_with(kill_quest());
        let mut character = character_state();
        update_quest(&defs, &mut character, 42, 0, false, &[(0, 1), (1, 2)]);

        update_quest(&defs, &mut character, 42, 1, false, &[(1, 99)]);
        assert_eq!(character.active_quests[&42].flags, vec![1, 99]);
    }
}
