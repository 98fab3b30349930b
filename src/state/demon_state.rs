//! Transient runtime mirror of a summoned `Demon`.

use crate::db::Demon;
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct DemonComputedStats {
    pub max_hp: i32,
    pub max_mp: i32,
    pub hp: i32,
    pub mp: i32,
    pub attack: i32,
    pub defense: i32,
}

/// Runtime mirror of a demon currently summoned into a zone. Demons resting
/// in the COMP are represented only by their persisted `Demon` record —
/// this struct exists only while the demon is active in the field.
pub struct DemonState {
    pub uuid: Uuid,
    pub owner_character: Uuid,
    pub demon: Demon,
    pub stats: DemonComputedStats,
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub active_skills: Vec<u32>,
    pub inherited_skill_progress: Vec<(u32, u32)>,
}

impl DemonState {
    pub fn new(owner_character: Uuid, demon: Demon) -> Self {
        Self {
            uuid: demon.uuid,
            owner_character,
            demon,
            stats: DemonComputedStats::default(),
            x: 0.0,
            y: 0.0,
            rotation: 0.0,
            active_skills: Vec::new(),
            inherited_skill_progress: Vec::new(),
        }
    }

    pub fn recalculate_stats(&mut self) {
        let base = self.demon.reunion_ranks.iter().map(|&r| r as i32).sum::<i32>();
        self.stats.max_hp = 200 + base * 15;
        self.stats.max_mp = 100 + base * 8;
        self.stats.attack = 10 + base * 3;
        self.stats.defense = 10 + base * 2;
        self.stats.hp = self.stats.hp.min(self.stats.max_hp);
        self.stats.mp = self.stats.mp.min(self.stats.max_mp);
        if self.stats.hp == 0 {
            self.stats.hp = self.stats.max_hp;
            self.stats.mp = self.stats.max_mp;
        }
    }
}
