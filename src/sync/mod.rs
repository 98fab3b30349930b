//! SyncManager — typed record replication to/from the world server.
//!
//! A per-type update/sync-complete handler pair plus a `SearchEntry` table
//! keyed by type, collapsed to a single upstream link since this fabric
//! has exactly one counterpart (the world server). The per-type dispatch
//! is an exhaustive `match` in [`update_one`]/[`sync_complete_one`]; the
//! config table below stays as the declarative `persistent`/`store`
//! metadata callers actually need to read.

mod object;

pub use object::{
    MatchEntry, PentalphaMatch, PvPMatch, StoreKind, SyncCode, SyncObject, SyncRecord,
    SyncRecordType, UBResult,
};

use std::collections::HashMap;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::db::{SearchEntryType, StatusEffect};
use crate::state::ServerCtx;
use crate::zone::CreateInstanceRequest;

/// Declarative per-type metadata. The actual
/// build/update/sync-complete behavior lives in [`update_one`]/
/// [`sync_complete_one`] as a tagged match, not as stored function
/// pointers — see the module doc comment.
#[derive(Debug, Clone, Copy)]
pub struct ObjectConfig {
    pub persistent: bool,
    pub store: Option<StoreKind>,
}

/// Looks up the declarative metadata for a record kind, e.g. so a caller
/// holding only a [`SyncRecordType`] can tell which store (if any) owns
/// it without matching on every variant itself.
pub fn config_for(record_type: SyncRecordType) -> ObjectConfig {
    object_config(record_type)
}

fn object_config(record_type: SyncRecordType) -> ObjectConfig {
    use SyncRecordType::*;
    match record_type {
        SearchEntry => ObjectConfig { persistent: true, store: Some(StoreKind::World) },
        Account => ObjectConfig { persistent: true, store: Some(StoreKind::Lobby) },
        CharacterLogin => ObjectConfig { persistent: false, store: None },
        CharacterProgress => ObjectConfig { persistent: true, store: Some(StoreKind::World) },
        InstanceAccess => ObjectConfig { persistent: true, store: Some(StoreKind::World) },
        Match => ObjectConfig { persistent: false, store: None },
        MatchEntry => ObjectConfig { persistent: false, store: None },
        EventCounter => ObjectConfig { persistent: true, store: Some(StoreKind::World) },
        PentalphaEntry => ObjectConfig { persistent: true, store: Some(StoreKind::World) },
        PentalphaMatch => ObjectConfig { persistent: false, store: None },
        PvPMatch => ObjectConfig { persistent: false, store: None },
        StatusEffect => ObjectConfig { persistent: true, store: Some(StoreKind::World) },
        UBResult => ObjectConfig { persistent: false, store: None },
        UBTournament => ObjectConfig { persistent: true, store: Some(StoreKind::World) },
    }
}

/// Replication layer for one channel<->world link.
pub struct SyncManager {
    outgoing: Mutex<Vec<SyncRecord>>,
    /// `SearchEntry`s held by type, mirroring
    /// `ChannelSyncManager::mSearchEntries`. Kept server-side (not behind
    /// the `Store`) since search postings are ephemeral and
    /// cross-channel visible only through this table.
    search_entries: RwLock<HashMap<SyncRecordType, Vec<crate::db::SearchEntry>>>,
    active_pentalpha: RwLock<Option<PentalphaMatch>>,
    active_ub_tournament: RwLock<Option<crate::db::UBTournament>>,
}

impl Default for SyncManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncManager {
    pub fn new() -> Self {
        Self {
            outgoing: Mutex::new(Vec::new()),
            search_entries: RwLock::new(HashMap::new()),
            active_pentalpha: RwLock::new(None),
            active_ub_tournament: RwLock::new(None),
        }
    }

    /// Queues an outbound update.
    pub fn update_record(&self, object: SyncObject) {
        self.outgoing.lock().push(SyncRecord { object, is_remove: false });
    }

    /// Queues an outbound typed delete.
    pub fn remove_record(&self, object: SyncObject) {
        self.outgoing.lock().push(SyncRecord { object, is_remove: true });
    }

    /// Flushes and returns the currently-queued outbound batch. The
    /// caller serializes it into a `WorldPacket::Sync` and sends it
    /// through [`crate::network::WorldConnection`]; this module doesn't
    /// know the wire encoding.
    pub fn sync_outgoing(&self) -> Vec<SyncRecord> {
        std::mem::take(&mut *self.outgoing.lock())
    }

    /// Handles one inbound batch: every record's `update_handler` runs
    /// before any `sync_complete_handler`, and all `sync_complete_handler`
    /// calls for this batch happen after every `update_handler` call
    /// finishes.
    pub fn handle_inbound(&self, ctx: &ServerCtx, batch: Vec<SyncRecord>, source: &str) -> Vec<SyncCode> {
        let mut codes = Vec::with_capacity(batch.len());
        let mut by_type: HashMap<SyncRecordType, Vec<(SyncObject, bool)>> = HashMap::new();

        for record in batch {
            let record_type = record.object.record_type();
            let code = self.update_one(ctx, &record.object, record.is_remove, source);
            codes.push(code);
            by_type
                .entry(record_type)
                .or_default()
                .push((record.object, record.is_remove));
        }

        for (record_type, objs) in by_type {
            self.sync_complete_one(ctx, record_type, &objs, source);
        }

        codes
    }

    /// Per-record local handling.
    fn update_one(&self, ctx: &ServerCtx, object: &SyncObject, is_remove: bool, source: &str) -> SyncCode {
        match object {
            SyncObject::SearchEntry(entry) => {
                if is_remove {
                    self.remove_search_entry(entry);
                } else {
                    self.insert_search_entry(ctx, entry.clone());
                }
                SyncCode::Updated
            }
            SyncObject::CharacterLogin(login) => {
                // Bulk handling happens in `sync_complete_one`, per spec
                // §4.D ("bulk updates are routed to
                // `AccountManager.update_logins`"); acknowledge here.
                let _ = login;
                SyncCode::Handled
            }
            SyncObject::InstanceAccess(access) => {
                if access.instance_id == 0 {
                    let request = CreateInstanceRequest {
                        definition_id: access.zone_definition_id,
                        variant_id: access.variant_id,
                        access_world_cids: Vec::new(),
                        timer_id: None,
                        timer_expire_event_id: None,
                    };
                    match ctx.zones.create_instance(ctx, request) {
                        Ok(instance) => {
                            let mut echoed = access.clone();
                            echoed.instance_id = instance.instance_id;
                            self.update_record(SyncObject::InstanceAccess(echoed));
                            SyncCode::Updated
                        }
                        Err(e) => {
                            warn!(error = %e, "instance creation request failed");
                            SyncCode::Failed
                        }
                    }
                } else {
                    SyncCode::Updated
                }
            }
            SyncObject::StatusEffect(effect) => {
                if is_remove {
                    SyncCode::Updated
                } else {
                    self.apply_inbound_status_effect(ctx, effect);
                    SyncCode::Updated
                }
            }
            SyncObject::PentalphaMatch(m) => {
                let mut active = self.active_pentalpha.write();
                if m.end_time.timestamp() == 0 {
                    *active = Some(m.clone());
                } else if active.as_ref().map(|a| a.uuid) == Some(m.uuid) {
                    *active = None;
                }
                SyncCode::Updated
            }
            SyncObject::UBTournament(t) => {
                let mut active = self.active_ub_tournament.write();
                if t.end_time.timestamp() == 0 {
                    *active = Some(t.clone());
                } else if active.as_ref().map(|a| a.uuid) == Some(t.uuid) {
                    *active = None;
                }
                SyncCode::Updated
            }
            _ => {
                debug!(source, "record synced with no type-specific handling");
                SyncCode::Updated
            }
        }
    }

    fn sync_complete_one(&self, ctx: &ServerCtx, record_type: SyncRecordType, objs: &[(SyncObject, bool)], source: &str) {
        if record_type == SyncRecordType::CharacterLogin {
            let logins: Vec<(crate::db::ChannelLogin, bool)> = objs
                .iter()
                .filter_map(|(o, remove)| match o {
                    SyncObject::CharacterLogin(l) => Some((l.clone(), *remove)),
                    _ => None,
                })
                    .collect();
            ctx.account.update_logins(&logins);
        }
        debug!(?record_type, count = objs.len(), source, "sync batch complete");
    }

    /// Insert with higher-entry-id-first ordering. An
    /// "application" sub-type (odd `entry_type` discriminant) additionally
    /// notifies the parent entry's source character — the parent entry id
    /// is carried in `data[0]` by convention (there is no separate field
    /// on the wire `SearchEntry` shape).
    fn insert_search_entry(&self, ctx: &ServerCtx, entry: crate::db::SearchEntry) {
        let record_type = SyncRecordType::SearchEntry;
        let is_application = (entry.entry_type as u8) % 2 == 1;
        let parent_entry_id = entry.data.first().copied();

        let mut table = self.search_entries.write();
        let bucket = table.entry(record_type).or_default();
        bucket.retain(|e| e.uuid != entry.uuid);
        let insert_at = bucket.partition_point(|e| e.entry_id > entry.entry_id);
        bucket.insert(insert_at, entry.clone());
        drop(table);

        if is_application {
            if let Some(parent_id) = parent_entry_id {
                if let Some(parent) = self
                    .search_entries
                    .read()
                    .get(&record_type)
                    .and_then(|b| b.iter().find(|e| e.entry_id as i32 == parent_id))
                    .cloned()
                {
                    if let Some(session) = find_session_by_character(ctx, parent.character) {
                        session.read().send(crate::network::ServerPacket::SearchEntryApplication {
                            entry_id: entry.entry_id,
                            applicant: entry.character,
                        });
                    }
                }
            }
        }
    }

    fn remove_search_entry(&self, entry: &crate::db::SearchEntry) {
        let mut table = self.search_entries.write();
        if let Some(bucket) = table.get_mut(&SyncRecordType::SearchEntry) {
            bucket.retain(|e| e.uuid != entry.uuid);
        }
    }

    pub fn search_entries_by_type(&self, entry_type: SearchEntryType) -> Vec<crate::db::SearchEntry> {
        self.search_entries
            .read()
            .get(&SyncRecordType::SearchEntry)
            .map(|bucket| bucket.iter().filter(|e| e.entry_type == entry_type).cloned().collect())
            .unwrap_or_default()
    }

    /// Hydrates the target character, finds its session, and applies the
    /// effect immediately with the stack/duration carried in the payload:
    /// inserts (or removes, at `stack == 0`) it in the target's own
    /// `CharacterState.active_status_effects` and recalculates stats, the
    /// same end state `add_remove_status` leaves a locally-applied effect
    /// in.
    fn apply_inbound_status_effect(&self, ctx: &ServerCtx, effect: &StatusEffect) {
        let Some(session) = find_session_by_character(ctx, effect.entity) else {
            debug!(entity = %effect.entity, "status effect target has no live session");
            return;
        };
        let Some(character_uuid) = session.read().character else {
            debug!(entity = %effect.entity, "status effect target session has no character loaded");
            return;
        };
        let Some(state_lock) = ctx.account.character(character_uuid) else {
            debug!(entity = %effect.entity, "status effect target character not resident");
            return;
        };
        {
            let mut state = state_lock.write();
            if effect.stack == 0 {
                state.active_status_effects.remove(&effect.status_id);
            } else {
                state.active_status_effects.insert(effect.status_id, effect.clone());
            }
            state.recalculate_stats();
        }
        session.write().touch(ctx.clock.now());
        info!(entity = %effect.entity, status = effect.status_id, stack = effect.stack, "status effect applied");
    }
}

fn find_session_by_character(ctx: &ServerCtx, character: uuid::Uuid) -> Option<crate::state::SharedSession> {
    let mut found = None;
    ctx.sessions.broadcast(|session| {
        if found.is_none() && session.read().character == Some(character) {
            found = Some(session.clone());
        }
    });
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountManager;
    use crate::action::ActionGroupRegistry;
    use crate::db::{SearchEntryType, Store};
    use crate::definitions::Definitions;
    use crate::event::{EventRuntime, NoopScriptHost};
    use crate::network::WorldConnection;
    use crate::state::SessionRegistry;
    use crate::zone::ZoneManager;
    use std::sync::Arc;
    use uuid::Uuid;

    async fn test_ctx() -> ServerCtx {
        let store = Store::connect(":memory:", 1).await.expect("in-memory store");
        ServerCtx::new(
            store.clone(),
            Arc::new(Definitions::default()),
            Arc::new(ZoneManager::new()),
            Arc::new(SessionRegistry::new()),
            Arc::new(SyncManager::new()),
            Arc::new(WorldConnection::new().0),
            Arc::new(AccountManager::new(store)),
            Arc::new(EventRuntime::new()),
            Arc::new(ActionGroupRegistry::new()),
            Arc::new(NoopScriptHost) as Arc<dyn crate::event::ScriptHost>,
            Arc::new(crate::config::Config {
                server: crate::config::ServerConfig {
                    channel_id: 1,
                    expected_client_version: "1.000".into(),
                    name: "test-channel".into(),
                    listen_address: "127.0.0.1:0".parse().unwrap(),
                    log_format: crate::config::LogFormat::Pretty,
                    metrics_port: 0,
                    session_sweep_interval_secs: 10,
                    session_timeout_secs: 300,
                },
                world: crate::config::WorldConfig {
                    address: "127.0.0.1:0".parse().unwrap(),
                    link_password: "test".into(),
                    reconnect_secs: 5,
                    sync_flush_interval_ms: 100,
                },
                database: crate::config::DatabaseConfig { url: ":memory:".into(), max_connections: 1 },
                limits: crate::config::LimitsConfig::default(),
                security: crate::config::SecurityConfig::default(),
                definitions_path: ".".into(),
            }),
        )
    }

    fn search_entry(entry_id: u32, entry_type: SearchEntryType) -> crate::db::SearchEntry {
        crate::db::SearchEntry {
            uuid: Uuid::new_v4(),
            entry_id,
            character: Uuid::new_v4(),
            entry_type,
            posted: chrono::Utc::now(),
            data: Vec::new(),
        }
    }

    /// Queuing an update and draining it is a no-op on the manager's own
    /// state: nothing is left behind, and the drained batch is exactly
    /// what was queued.
    #[test]
    fn update_record_round_trips_through_sync_outgoing() {
        let manager = SyncManager::new();
        let entry = search_entry(1, SearchEntryType::ClanJoin);
        manager.update_record(SyncObject::SearchEntry(entry.clone()));

        let batch = manager.sync_outgoing();
        assert_eq!(batch.len(), 1);
        assert!(!batch[0].is_remove);
        assert_eq!(batch[0].object.uuid(), entry.uuid);

        assert!(manager.sync_outgoing().is_empty());
    }

    /// Search postings sort higher-entry-id-first.
    #[tokio::test]
    async fn inbound_search_entries_sort_highest_id_first() {
        let ctx = test_ctx().await;
        let manager = SyncManager::new();

        let batch = vec![
            SyncRecord { object: SyncObject::SearchEntry(search_entry(5, SearchEntryType::ClanJoin)), is_remove: false },
            SyncRecord { object: SyncObject::SearchEntry(search_entry(10, SearchEntryType::ClanJoin)), is_remove: false },
            SyncRecord { object: SyncObject::SearchEntry(search_entry(7, SearchEntryType::ClanJoin)), is_remove: false },
        ];
        manager.handle_inbound(&ctx, batch, "world");

        let entries = manager.search_entries_by_type(SearchEntryType::ClanJoin);
        let ids: Vec<u32> = entries.iter().map(|e| e.entry_id).collect();
        assert_eq!(ids, vec![10, 7, 5]);
    }
}
