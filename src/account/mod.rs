//! AccountManager — login/character lifecycle and the CP ledger.
//!
//! Authentication itself is the world/lobby's job (the channel only
//! carries the username/session-key round trip); this module owns what
//! happens once the world has answered — hydrating the character,
//! tracking it while the session is live, and building the change-sets
//! logout and CP changes commit.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::{
    Account, BazaarData, ChangeSet, Character, CharacterProgress, ChannelLogin, Clan, Demon,
    DemonBox, DemonQuest, EventCounter, Expertise, FriendSettings, Hotbar, Item, ItemBox, Match,
    PersistentRecord, Quest, Store,
};
use crate::error::{AuthError, ChannelError, StoreError};
use crate::event::ActiveQuestState;
use crate::network::{LogoutNotifyAction, ServerPacket, WebGameAction, WorldPacket};
use crate::state::{CharacterState, ServerCtx, Session, SharedSession};
use crate::sync::SyncObject;

/// Seed values for a freshly created character.
#[derive(Debug, Clone)]
pub struct NewCharacterTemplate {
    pub starting_level: u8,
    pub homepoint_zone: u32,
    pub homepoint_spot: u32,
}

/// Owns every character currently hydrated on this channel, the lobby-side
/// account store, and a mirror of other channels' `ChannelLogin`
/// projections.
pub struct AccountManager {
    lobby_store: Store,
    characters: DashMap<Uuid, Arc<RwLock<CharacterState>>>,
    remote_logins: DashMap<i32, ChannelLogin>,
    /// `ChannelLogin`s parked between `prepare_channel_change` and
    /// `finalize_channel_change`, keyed by character — lets
    /// `set_pending_action_cursor` stamp a resume point onto one before
    /// it ships, if the switch fired mid-`PERFORM_ACTIONS`.
    pending_logins: DashMap<Uuid, ChannelLogin>,
}

impl AccountManager {
    pub fn new(lobby_store: Store) -> Self {
        Self {
            lobby_store,
            characters: DashMap::new(),
            remote_logins: DashMap::new(),
            pending_logins: DashMap::new(),
        }
    }

    pub fn character(&self, character_uuid: Uuid) -> Option<Arc<RwLock<CharacterState>>> {
        self.characters.get(&character_uuid).map(|e| e.clone())
    }

    /// Full login round trip: validate the client build, reject a
    /// still-logged-in username, then await the world's `ACCOUNT_LOGIN`
    /// response and hydrate the selected character.
    pub async fn handle_login_request(
        &self,
        ctx: &ServerCtx,
        username: &str,
        client_version: &str,
        session_key: &str,
    ) -> Result<SharedSession, ChannelError> {
        if client_version != ctx.config.server.expected_client_version {
            return Err(AuthError::WrongClientVersion(client_version.to_string()).into());
        }
        if ctx.sessions.by_username(username).is_some() {
            return Err(AuthError::AccountStillLoggedIn.into());
        }

        let session = ctx.sessions.set(Session::new(username));
        let outcome = ctx
            .world_conn
            .send_login(username, session_key)
            .await
            .map_err(|_| AuthError::InvalidSessionKey)?;

        use crate::network::LoginOutcome;
        match outcome {
            LoginOutcome::CharacterSelected { world_cid, character } => {
                ctx.sessions.link_world_cid(username, world_cid);
                let state = self.initialize_character(ctx, character).await?;
                let account = state.read().character.account;
                {
                    let mut s = session.write();
                    s.character = Some(character);
                    s.account = Some(account);
                }
                session.read().send(ServerPacket::Login { result: 0 });
                info!(%username, %character, "character login complete");
                Ok(session)
            }
            LoginOutcome::Rejected => {
                ctx.sessions.remove(username);
                session.read().send(ServerPacket::Login { result: -1 });
                ctx.world_conn.send_packet(WorldPacket::AccountLogout {
                    action: LogoutNotifyAction::Disconnect,
                    username: username.to_string(),
                    kick_level: None,
                });
                Err(AuthError::UnknownAccount.into())
            }
        }
    }

    /// Hydrates a character into a live [`CharacterState`], reusing an
    /// already-resident one if the character is already tracked (e.g. a
    /// reconnect racing the sweep that would otherwise have evicted it).
    /// Runs orphan recovery and skill-id validation before the state is
    /// handed back.
    pub async fn initialize_character(
        &self,
        ctx: &ServerCtx,
        character_uuid: Uuid,
    ) -> Result<Arc<RwLock<CharacterState>>, ChannelError> {
        if let Some(existing) = self.characters.get(&character_uuid) {
            return Ok(existing.clone());
        }

        let character: Character = ctx.store.load(character_uuid, false).await?;
        let progress: CharacterProgress = ctx.store.load(character.progress, false).await?;

        self.recover_orphans(ctx, &character).await;
        let (comp_devil_ids, comp_free_slots) = self.hydrate_comp(ctx, &character).await;
        let material_counts = self.hydrate_materials(ctx, &character).await;

        let mut state = CharacterState::new(character, progress);
        state.comp_devil_ids = comp_devil_ids;
        state.comp_free_slots = comp_free_slots;
        state.material_counts = material_counts;

        let quest_ids = state.progress.active_quests.clone();
        for quest_uuid in quest_ids {
            match ctx.store.load::<Quest>(quest_uuid, false).await {
                Ok(quest) => {
                    state.active_quests.insert(
                        quest.quest_id,
                        ActiveQuestState {
                            phase: quest.phase,
                            kill_counts: quest.kill_counts.clone(),
                            custom_data: quest.custom_data.clone(),
                            flags: quest.flags.clone(),
                        },
                    );
                }
                Err(e) => warn!(character = %character_uuid, error = %e, "active quest record missing, dropping"),
            }
        }

        let counter_ids = state.character.event_counters.clone();
        for counter_uuid in counter_ids {
            match ctx.store.load::<EventCounter>(counter_uuid, false).await {
                Ok(counter) => {
                    state.event_counters.insert(counter.counter_id, counter.value);
                    state.event_counter_records.insert(counter.counter_id, counter.uuid);
                }
                Err(e) => warn!(character = %character_uuid, error = %e, "event counter record missing, dropping"),
            }
        }

        self.validate_skills(ctx, &mut state);
        state.recalculate_stats();

        let shared = Arc::new(RwLock::new(state));
        self.characters.insert(character_uuid, shared.clone());
        Ok(shared)
    }

    /// Checks every item slot this character's boxes claim actually points
    /// back at a record consistent with that slot, and that every other
    /// UUID the character record carries (hotbar, friend settings, bazaar
    /// data, expertises, demon quests, clan) still resolves — logging (not
    /// failing) on a mismatch, the original's "fix it and keep going"
    /// orphan recovery rather than refusing the login outright.
    async fn recover_orphans(&self, ctx: &ServerCtx, character: &Character) {
        for box_uuid in &character.item_boxes {
            let Ok(item_box) = ctx.store.load::<ItemBox>(*box_uuid, false).await else {
                warn!(character = %character.uuid, box_uuid = %box_uuid, "item box missing for character");
                continue;
            };
            for (slot, item_uuid) in item_box.slots.iter().enumerate() {
                let Some(item_uuid) = item_uuid else { continue };
                match ctx.store.load::<Item>(*item_uuid, false).await {
                    Ok(item) if item.box_id == Some(item_box.uuid) && item.box_slot == Some(slot as u16) => {}
                    Ok(_) => warn!(
                        character = %character.uuid,
                        item = %item_uuid,
                        slot,
                        "orphaned item slot pointer, character's box claims a slot the item disagrees with"
                    ),
                    Err(e) => warn!(character = %character.uuid, item = %item_uuid, error = %e, "item referenced by box slot is missing"),
                }
            }
        }
        for box_uuid in &character.demon_boxes {
            let Ok(demon_box) = ctx.store.load::<DemonBox>(*box_uuid, false).await else {
                warn!(character = %character.uuid, box_uuid = %box_uuid, "demon box missing for character");
                continue;
            };
            for demon_uuid in demon_box.slots.iter().flatten() {
                if let Err(e) = ctx.store.load::<Demon>(*demon_uuid, false).await {
                    warn!(character = %character.uuid, demon = %demon_uuid, error = %e, "demon referenced by demon box slot is missing");
                }
            }
        }
        if let Some(uuid) = character.hotbar {
            if let Err(e) = ctx.store.load::<Hotbar>(uuid, false).await {
                warn!(character = %character.uuid, error = %e, "hotbar record missing");
            }
        }
        if let Some(uuid) = character.friend_settings {
            if let Err(e) = ctx.store.load::<FriendSettings>(uuid, false).await {
                warn!(character = %character.uuid, error = %e, "friend settings record missing");
            }
        }
        if let Some(uuid) = character.bazaar_data {
            if let Err(e) = ctx.store.load::<BazaarData>(uuid, false).await {
                warn!(character = %character.uuid, error = %e, "bazaar data record missing");
            }
        }
        if let Some(uuid) = character.clan {
            if let Err(e) = ctx.store.load::<Clan>(uuid, false).await {
                warn!(character = %character.uuid, error = %e, "clan record missing");
            }
        }
        for uuid in &character.expertises {
            if let Err(e) = ctx.store.load::<Expertise>(*uuid, false).await {
                warn!(character = %character.uuid, expertise = %uuid, error = %e, "expertise record missing");
            }
        }
        for uuid in &character.demon_quests {
            if let Err(e) = ctx.store.load::<DemonQuest>(*uuid, false).await {
                warn!(character = %character.uuid, demon_quest = %uuid, error = %e, "demon quest record missing");
            }
        }
    }

    /// Devil ids and free-slot count across every `DemonBox` the
    /// character owns, for `COMP_DEMON`/`COMP_FREE` condition evaluation.
    async fn hydrate_comp(&self, ctx: &ServerCtx, character: &Character) -> (Vec<u32>, i32) {
        let mut devil_ids = Vec::new();
        let mut total_slots = 0i32;
        let mut occupied = 0i32;
        for box_uuid in &character.demon_boxes {
            let Ok(demon_box) = ctx.store.load::<DemonBox>(*box_uuid, false).await else { continue };
            total_slots += demon_box.slots.len() as i32;
            for demon_uuid in demon_box.slots.iter().flatten() {
                occupied += 1;
                if let Ok(demon) = ctx.store.load::<Demon>(*demon_uuid, false).await {
                    devil_ids.push(demon.devil_id);
                }
            }
        }
        (devil_ids, (total_slots - occupied).max(0))
    }

    /// Stacked count per material item type, for the `MATERIAL`
    /// condition, scanning every item box for material-tank items the
    /// same way `add_remove_items`'s `MaterialTank` mode validates them.
    async fn hydrate_materials(&self, ctx: &ServerCtx, character: &Character) -> HashMap<u32, i32> {
        let mut counts = HashMap::new();
        for box_uuid in &character.item_boxes {
            let Ok(item_box) = ctx.store.load::<ItemBox>(*box_uuid, false).await else { continue };
            for item_uuid in item_box.slots.iter().flatten() {
                let Ok(item) = ctx.store.load::<Item>(*item_uuid, false).await else { continue };
                let Some(item_def) = ctx.definitions.item(item.item_type) else { continue };
                if item_def.category_main != 1 || item_def.category_sub != 64 {
                    continue;
                }
                *counts.entry(item.item_type).or_insert(0) += item.stack_size as i32;
            }
        }
        counts
    }

    /// Drops any active skill id this character carries that no longer
    /// resolves to a definition, rather than letting a stale content
    /// update leave the character permanently broken.
    fn validate_skills(&self, ctx: &ServerCtx, state: &mut CharacterState) {
        let before = state.active_skills.len();
        state.active_skills.retain(|id| ctx.definitions.skill(*id).is_some());
        if state.active_skills.len() != before {
            warn!(character = %state.uuid, dropped = before - state.active_skills.len(), "removed unknown skill ids");
        }
    }

    /// Builds the persistent records for a brand new character from
    /// `template`, returning the character along with the change-set the
    /// caller commits.
    pub fn build_new_character(
        &self,
        ctx: &ServerCtx,
        account: Uuid,
        name: &str,
        template: &NewCharacterTemplate,
    ) -> (Character, ChangeSet) {
        let item_box = ctx.store.new_record(
            |uuid| ItemBox { uuid, character: Uuid::nil(), slots: vec![None; ctx.config.limits.inventory_slots] },
            false,
        );
        let demon_box = ctx.store.new_record(
            |uuid| DemonBox { uuid, character: Uuid::nil(), slots: vec![None; ctx.config.limits.comp_slots] },
            false,
        );
        let progress = ctx.store.new_record(
            |uuid| CharacterProgress {
                uuid,
                character: Uuid::nil(),
                completed_quests: Vec::new(),
                active_quests: Vec::new(),
            },
            false,
        );
        let character = ctx.store.new_record(
            |uuid| Character {
                uuid,
                account,
                name: name.to_string(),
                level: template.starting_level,
                lnc: 0,
                homepoint_zone: template.homepoint_zone,
                homepoint_spot: template.homepoint_spot,
                progress: progress.uuid,
                item_boxes: vec![item_box.uuid],
                demon_boxes: vec![demon_box.uuid],
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
            },
            false,
        );

        let mut item_box = item_box;
        item_box.character = character.uuid;
        let mut demon_box = demon_box;
        demon_box.character = character.uuid;
        let mut progress = progress;
        progress.character = character.uuid;

        let change_set = ChangeSet::new()
            .insert(character.clone().into_record())
            .insert(progress.into_record())
            .insert(item_box.into_record())
            .insert(demon_box.into_record());

        (character, change_set)
    }

    /// Stops tracking `character_uuid` on this channel and returns the
    /// change-set persisting its final state.
    /// Returns an empty change-set if the character wasn't resident (a
    /// double logout, or one that raced a channel switch). Writes back
    /// live position (invariant 5) and every event counter mutated this
    /// session, minting a new `EventCounter` record for a counter id that
    /// started this session with none.
    pub fn logout_character(&self, ctx: &ServerCtx, character_uuid: Uuid, save: bool) -> ChangeSet {
        let Some((_, shared)) = self.characters.remove(&character_uuid) else {
            return ChangeSet::new();
        };
        if !save {
            debug!(%character_uuid, "logout without save, discarding in-memory state");
            return ChangeSet::new();
        }
        let mut state = shared.write();
        state.character.logout_zone = state.zone_id;
        state.character.logout_x = state.x;
        state.character.logout_y = state.y;
        state.character.logout_rot = state.rotation;

        let mut change_set = ChangeSet::new().update(state.progress.uuid, state.progress.clone().into_record());

        let counters = state.event_counters.clone();
        for (counter_id, value) in counters {
            if let Some(&record_uuid) = state.event_counter_records.get(&counter_id) {
                change_set = change_set.update(
                    record_uuid,
                    EventCounter { uuid: record_uuid, character: character_uuid, counter_id, value }.into_record(),
                );
            } else {
                let counter = ctx.store.new_record(
                    |uuid| EventCounter { uuid, character: character_uuid, counter_id, value },
                    false,
                );
                state.character.event_counters.push(counter.uuid);
                state.event_counter_records.insert(counter_id, counter.uuid);
                change_set = change_set.insert(counter.into_record());
            }
        }

        change_set.update(state.character.uuid, state.character.clone().into_record())
    }

    /// Full session teardown (spec §4.F "Logout"). Zone membership is
    /// always dropped, regardless of `delay`. Everything else — ending an
    /// open web-game, rejecting a pending demon quest, completing an
    /// in-progress digitalize, dropping a parked match entry, persisting
    /// the character, and tearing down the session/store residency — only
    /// runs when `!delay`, matching the original's channel-switch path
    /// (`delay = true`) skipping all of it since the target channel picks
    /// the character back up via `ChannelLogin`.
    pub async fn logout(&self, ctx: &ServerCtx, session: &SharedSession, delay: bool) {
        ctx.zones.leave_zone(session, true);
        if delay {
            return;
        }

        let (character_uuid, account_uuid, username) = {
            let s = session.read();
            (s.character, s.account, s.username.clone())
        };
        let Some(character_uuid) = character_uuid else {
            ctx.sessions.remove(&username);
            return;
        };

        let (web_game_active, world_cid, pending_demon_quest, pending_match, channel_switch_pending) = {
            let s = session.read();
            (s.web_game_active, s.world_cid, s.pending_demon_quest, s.pending_match, s.channel_switch_pending)
        };

        if web_game_active {
            if let Some(world_cid) = world_cid {
                ctx.world_conn.send_packet(WorldPacket::WebGame(WebGameAction::End { world_cid }));
            }
            session.write().web_game_active = false;
        }

        if let Some(quest_uuid) = pending_demon_quest {
            if let Ok(quest) = ctx.store.load::<DemonQuest>(quest_uuid, false).await {
                if let Ok(mut character) = ctx.store.load::<Character>(quest.character, false).await {
                    character.demon_quests.retain(|&q| q != quest_uuid);
                    let change_set = ChangeSet::new().delete(quest_uuid).update(character.uuid, character.into_record());
                    if let Err(e) = ctx.store.apply(&change_set).await {
                        warn!(%quest_uuid, error = %e, "logout: failed to reject pending demon quest");
                    }
                }
            }
            session.write().pending_demon_quest = None;
        }

        if !channel_switch_pending {
            session.write().digitalize_demon = None;
        }

        if let Some(match_uuid) = pending_match {
            if let Ok(mut m) = ctx.store.load::<Match>(match_uuid, false).await {
                m.entries.retain(|&c| c != character_uuid);
                if let Err(e) = ctx.store.apply(&ChangeSet::new().update(match_uuid, m.into_record())).await {
                    warn!(%match_uuid, error = %e, "logout: failed to drop pending match entry");
                }
            }
            session.write().pending_match = None;
        }

        let change_set = self.logout_character(ctx, character_uuid, true);
        if let Err(e) = ctx.store.apply(&change_set).await {
            warn!(%character_uuid, error = %e, "logout: failed to persist character");
        }

        ctx.sessions.remove(&username);
        ctx.store.unload(character_uuid);
        if let Some(account_uuid) = account_uuid {
            ctx.store.unload(account_uuid);
        }
        info!(%username, %character_uuid, "logout complete");
    }

    /// Parks the `ChannelLogin` a channel switch will hand off, without
    /// shipping it yet — `dispatch_actions` may still stamp a resume
    /// cursor onto it if the switch fired mid-`PERFORM_ACTIONS` (spec:
    /// "the current action index is preserved in `ChannelLogin` so the
    /// target channel resumes after the executed actions"). The logout
    /// save runs separately and immediately, per spec; this only readies
    /// the hand-off projection. Call `finalize_channel_change` once the
    /// caller is done mutating the session for the switch.
    pub fn prepare_channel_change(&self, session: &SharedSession, character_uuid: Uuid, world_cid: i32, new_channel_id: u8, new_zone_id: u32) {
        self.pending_logins.insert(
            character_uuid,
            ChannelLogin {
                uuid: Uuid::new_v4(),
                character: character_uuid,
                world_cid,
                channel_id: new_channel_id,
                zone_id: new_zone_id,
                pending_action_group: None,
                pending_action_index: None,
            },
        );
        session.write().channel_switch_pending = true;
    }

    /// Stamps the action-group resume point onto a parked channel login,
    /// called by [`crate::action::dispatch_actions`] when it notices a
    /// switch fired mid-group. No-op if nothing is parked for this
    /// character (the switch didn't originate from `prepare_channel_change`).
    pub fn set_pending_action_cursor(&self, character_uuid: Uuid, group_id: u32, next_index: u32) {
        if let Some(mut login) = self.pending_logins.get_mut(&character_uuid) {
            login.pending_action_group = Some(group_id);
            login.pending_action_index = Some(next_index);
        }
    }

    /// Ships the parked `ChannelLogin` through the sync fabric now that
    /// the hand-off is ready (spec: "consumed when the target channel
    /// resumes the event").
    pub fn finalize_channel_change(&self, ctx: &ServerCtx, character_uuid: Uuid) {
        let Some((_, login)) = self.pending_logins.remove(&character_uuid) else {
            warn!(%character_uuid, "finalize_channel_change: no pending channel login");
            return;
        };
        ctx.sync.update_record(SyncObject::CharacterLogin(login));
    }

    /// Re-establishes a session arriving via `ChannelLogin` hand-off,
    /// re-hydrating the character without repeating the world
    /// round-trip. Resumes a `PERFORM_ACTIONS` group at its recorded
    /// cursor and re-renders the current event if the hand-off carried
    /// one, then consumes the `ChannelLogin` (spec: it's "consumed when
    /// the target channel resumes the event").
    pub async fn channel_login(
        &self,
        ctx: &ServerCtx,
        username: &str,
        world_cid: i32,
        character_uuid: Uuid,
    ) -> Result<SharedSession, ChannelError> {
        let session = ctx.sessions.set(Session::new(username));
        ctx.sessions.link_world_cid(username, world_cid);
        let state = self.initialize_character(ctx, character_uuid).await?;

        let login = self
            .remote_logins
            .remove(&world_cid)
            .map(|(_, login)| login)
            .filter(|login| login.character == character_uuid);

        {
            let mut s = session.write();
            s.character = Some(character_uuid);
            s.account = Some(state.read().character.account);
            if let Some(login) = &login {
                s.zone_id = Some(login.zone_id);
            }
        }

        if let Some(login) = login {
            if let (Some(group_id), Some(index)) = (login.pending_action_group, login.pending_action_index) {
                let mut character_state = state.write();
                crate::action::resume_event_actions(ctx, &session, &mut character_state, group_id, index as usize);
            }
            let mut character_state = state.write();
            if let Err(e) = ctx.event_runtime.resume_after_channel_change(ctx, &session, &mut character_state) {
                warn!(%character_uuid, error = %e, "resume_after_channel_change failed");
            }
        }

        Ok(session)
    }

    /// Applies the inbound bulk `CharacterLogin` batch the sync fabric
    /// hands this manager after every per-record handler has run (spec
    /// §4.D).
    pub fn update_logins(&self, logins: &[(ChannelLogin, bool)]) {
        for (login, remove) in logins {
            if *remove {
                self.remote_logins.remove(&login.world_cid);
            } else {
                self.remote_logins.insert(login.world_cid, login.clone());
            }
        }
    }

    pub fn remote_login(&self, world_cid: i32) -> Option<ChannelLogin> {
        self.remote_logins.get(&world_cid).map(|e| e.clone())
    }

    /// CAS-style CP balance change: reloads the
    /// current balance, submits an `ExplicitUpdate` expecting that exact
    /// value, and retries on conflict rather than losing a concurrent
    /// gift. Bounded so a pathological hot account can't spin forever.
    /// On success syncs the updated `Account` record (spec §4.F) and, if
    /// the account is online, sends it the refreshed CP balance.
    pub async fn increase_cp(&self, ctx: &ServerCtx, account: Uuid, delta: i64) -> Result<i64, ChannelError> {
        const MAX_ATTEMPTS: u32 = 5;
        for attempt in 0..MAX_ATTEMPTS {
            let current: Account = self.lobby_store.load(account, true).await?;
            let change_set = ChangeSet::new().explicit_update(account, "cp", delta, current.cp);
            match self.lobby_store.apply(&change_set).await {
                Ok(()) => {
                    let new_balance = current.cp + delta;
                    ctx.sync.update_record(SyncObject::Account(Account { cp: new_balance, ..current }));
                    if let Some(session) = find_session_by_account(ctx, account) {
                        session.read().send(ServerPacket::CashBalance { cp: new_balance, unknown: 0 });
                    }
                    return Ok(new_balance);
                }
                Err(StoreError::ExplicitUpdateConflict {.. }) => {
                    debug!(%account, attempt, "cp explicit_update lost the race, retrying");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(StoreError::ApplyConflict(format!("increase_cp retry budget exhausted for {account}")).into())
    }
}

/// Finds the live session logged into `account`, if any. No index keys
/// sessions by account, so this scans the registry the way
/// `sync::find_session_by_character` scans it by character.
fn find_session_by_account(ctx: &ServerCtx, account: Uuid) -> Option<SharedSession> {
    let mut found = None;
    ctx.sessions.broadcast(|session| {
        if found.is_some() {
            return;
        }
        if session.read().account == Some(account) {
            found = Some(session.clone());
        }
    });
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionGroupRegistry;
    use crate::definitions::Definitions;
    use crate::event::{EventRuntime, NoopScriptHost};
    use crate::sync::SyncManager;
    use crate::zone::ZoneManager;

    async fn test_ctx() -> ServerCtx {
        let store = Store::connect(":memory:", 1).await.expect("in-memory store");
        ServerCtx::new(
            store.clone(),
            Arc::new(Definitions::default()),
            Arc::new(ZoneManager::new()),
            Arc::new(crate::state::SessionRegistry::new()),
            Arc::new(SyncManager::new()),
            Arc::new(crate::network::WorldConnection::new().0),
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

    /// A username already holding a live session is refused a second
    /// login outright, before the world round trip.
    #[tokio::test]
    async fn double_login_is_rejected_for_already_logged_in_username() {
        let ctx = test_ctx().await;
        ctx.sessions.set(Session::new("alice"));

        let result = ctx.account.handle_login_request(&ctx, "alice", "1.000", "some-key").await;

        assert!(matches!(result, Err(ChannelError::Auth(AuthError::AccountStillLoggedIn))));
    }

    #[tokio::test]
    async fn login_request_rejects_mismatched_client_version() {
        let ctx = test_ctx().await;

        let result = ctx.account.handle_login_request(&ctx, "bob", "0.999", "some-key").await;

        assert!(matches!(result, Err(ChannelError::Auth(AuthError::WrongClientVersion(_)))));
        assert!(ctx.sessions.by_username("bob").is_none());
    }

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

    /// A resident character with `save = false` is dropped from tracking
    /// with no change-set to apply; with `save = true` the change-set
    /// carries its current state forward.
    #[tokio::test]
    async fn logout_character_without_save_discards_state() {
        let ctx = test_ctx().await;
        let manager = &ctx.account;
        let state = character_state();
        let character_uuid = state.uuid;
        manager.characters.insert(character_uuid, Arc::new(RwLock::new(state)));

        let change_set = manager.logout_character(&ctx, character_uuid, false);

        assert!(change_set.is_empty());
        assert!(manager.character(character_uuid).is_none());
    }

    #[tokio::test]
    async fn logout_character_with_save_persists_current_state() {
        let ctx = test_ctx().await;
        let manager = &ctx.account;
        let state = character_state();
        let character_uuid = state.uuid;
        manager.characters.insert(character_uuid, Arc::new(RwLock::new(state)));

        let change_set = manager.logout_character(&ctx, character_uuid, true);

        assert!(!change_set.is_empty());
        assert!(manager.character(character_uuid).is_none());

        // A repeat logout for the same (now untracked) character is a
        // harmless no-op, not an error.
        let second = manager.logout_character(&ctx, character_uuid, true);
        assert!(second.is_empty());
    }
}
