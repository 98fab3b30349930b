//! `ZoneInstance` — a bounded runtime copy of one or more zones.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use super::zone::Zone;

/// An active instance timer. Time-trial
/// and demon-only instance types carry an implicit timer that
/// `ZONE_INSTANCE::START_TIMER` refuses to override.
#[derive(Debug, Clone)]
pub struct InstanceTimer {
    pub timer_id: u32,
    pub expire_event_id: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub has_implicit_timer: bool,
}

/// A bounded runtime copy of one or more zones with per-group access
///.
pub struct ZoneInstance {
    pub instance_id: u32,
    pub definition_id: u32,
    pub variant_id: u32,
    /// Zones bound to this instance, keyed by (zone_id, dynamic_map_id).
    pub zones: RwLock<HashMap<(u32, u32), Arc<Zone>>>,
    /// World-CIDs of characters granted access to this instance.
    pub access_cids: RwLock<HashSet<i32>>,
    /// Per-player loot buffer attached to this instance (glossary
    /// "Destiny box"), keyed by world-CID.
    pub destiny_boxes: RwLock<HashMap<i32, Vec<Uuid>>>,
    pub flags: RwLock<HashMap<(i32, String), i32>>,
    pub timer: RwLock<Option<InstanceTimer>>,
}

impl ZoneInstance {
    pub fn new(instance_id: u32, definition_id: u32, variant_id: u32, access_cids: HashSet<i32>) -> Self {
        Self {
            instance_id,
            definition_id,
            variant_id,
            zones: RwLock::new(HashMap::new()),
            access_cids: RwLock::new(access_cids),
            destiny_boxes: RwLock::new(HashMap::new()),
            flags: RwLock::new(HashMap::new()),
            timer: RwLock::new(None),
        }
    }

    pub fn grant_access(&self, world_cid: i32) {
        self.access_cids.write().insert(world_cid);
    }

    pub fn has_access(&self, world_cid: i32) -> bool {
        self.access_cids.read().contains(&world_cid)
    }

    pub fn destiny_box(&self, world_cid: i32) -> Vec<Uuid> {
        self.destiny_boxes.read().get(&world_cid).cloned().unwrap_or_default()
    }

    pub fn add_to_destiny_box(&self, world_cid: i32, item: Uuid) {
        self.destiny_boxes.write().entry(world_cid).or_default().push(item);
    }

    pub fn timer_id(&self) -> Option<u32> {
        self.timer.read().as_ref().map(|t| t.timer_id)
    }
}
