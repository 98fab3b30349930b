//! Typed sync payloads, the minimum replicated record set.
//!
//! Most kinds reuse the persistent record types from [`crate::db`] — they
//! already carry a `Store`-resolvable UUID. A handful are transport-only:
//! they never back to the local `Store` (`persistent: false` in their
//! `ObjectConfig`) and are constructed straight from the wire payload by a
//! `build_handler`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{
    Account, ChannelLogin, CharacterProgress, EventCounter, InstanceAccess, Match,
    PentalphaEntry, SearchEntry, StatusEffect, UBTournament,
};

/// Links a character into a `Match` (non-persistent: rebuilt per match).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchEntry {
    pub uuid: Uuid,
    pub match_id: Uuid,
    pub character: Uuid,
    pub team: u8,
}

/// The world-wide Pentalpha team competition window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PentalphaMatch {
    pub uuid: Uuid,
    pub end_time: DateTime<Utc>,
    pub team_points: [i32; 5],
}

/// A versus-mode PvP match window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PvPMatch {
    pub uuid: Uuid,
    pub end_time: DateTime<Utc>,
    pub variant_type: u8,
}

/// One character's placement in an Ultimate Battle tournament.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UBResult {
    pub uuid: Uuid,
    pub character: Uuid,
    pub rank: u32,
    pub points: i32,
}

/// Tag identifying one of the fourteen sync record kinds, used as the key
/// into [`super::SyncManager`]'s `ObjectConfig` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncRecordType {
    SearchEntry,
    Account,
    CharacterLogin,
    CharacterProgress,
    InstanceAccess,
    Match,
    MatchEntry,
    EventCounter,
    PentalphaEntry,
    PentalphaMatch,
    PvPMatch,
    StatusEffect,
    UBResult,
    UBTournament,
}

/// One replicated record, tagged so a heterogeneous batch can be held in
/// a single `Vec`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SyncObject {
    SearchEntry(SearchEntry),
    Account(Account),
    CharacterLogin(ChannelLogin),
    CharacterProgress(CharacterProgress),
    InstanceAccess(InstanceAccess),
    Match(Match),
    MatchEntry(MatchEntry),
    EventCounter(EventCounter),
    PentalphaEntry(PentalphaEntry),
    PentalphaMatch(PentalphaMatch),
    PvPMatch(PvPMatch),
    StatusEffect(StatusEffect),
    UBResult(UBResult),
    UBTournament(UBTournament),
}

impl SyncObject {
    pub fn record_type(&self) -> SyncRecordType {
        match self {
            Self::SearchEntry(_) => SyncRecordType::SearchEntry,
            Self::Account(_) => SyncRecordType::Account,
            Self::CharacterLogin(_) => SyncRecordType::CharacterLogin,
            Self::CharacterProgress(_) => SyncRecordType::CharacterProgress,
            Self::InstanceAccess(_) => SyncRecordType::InstanceAccess,
            Self::Match(_) => SyncRecordType::Match,
            Self::MatchEntry(_) => SyncRecordType::MatchEntry,
            Self::EventCounter(_) => SyncRecordType::EventCounter,
            Self::PentalphaEntry(_) => SyncRecordType::PentalphaEntry,
            Self::PentalphaMatch(_) => SyncRecordType::PentalphaMatch,
            Self::PvPMatch(_) => SyncRecordType::PvPMatch,
            Self::StatusEffect(_) => SyncRecordType::StatusEffect,
            Self::UBResult(_) => SyncRecordType::UBResult,
            Self::UBTournament(_) => SyncRecordType::UBTournament,
        }
    }

    pub fn uuid(&self) -> Uuid {
        match self {
            Self::SearchEntry(r) => r.uuid,
            Self::Account(r) => r.uuid,
            Self::CharacterLogin(r) => r.uuid,
            Self::CharacterProgress(r) => r.uuid,
            Self::InstanceAccess(r) => r.uuid,
            Self::Match(r) => r.uuid,
            Self::MatchEntry(r) => r.uuid,
            Self::EventCounter(r) => r.uuid,
            Self::PentalphaEntry(r) => r.uuid,
            Self::PentalphaMatch(r) => r.uuid,
            Self::PvPMatch(r) => r.uuid,
            Self::StatusEffect(r) => r.uuid,
            Self::UBResult(r) => r.uuid,
            Self::UBTournament(r) => r.uuid,
        }
    }
}

/// One entry in an inbound or outbound sync batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRecord {
    pub object: SyncObject,
    pub is_remove: bool,
}

/// Which backing store a record's UUID resolves through. Purely
/// descriptive metadata today — resolution itself happens in the handler
/// that needs the dereferenced record, using whichever of
/// `ServerCtx::store`/`lobby_store` matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Lobby,
    World,
}

/// Result of handling one inbound record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncCode {
    Updated,
    Handled,
    Failed,
}
