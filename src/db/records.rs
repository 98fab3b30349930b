//! Persistent record types owned by the [`super::Store`].
//!
//! Every long-lived domain record lives in one `Record` enum so the store
//! can keep a single `DashMap<Uuid, Arc<RwLock<Record>>>` arena instead of a
//! type-erased cache per record kind — cross-record references are UUIDs
//! resolved back through the store, never pointers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A record kind that can be loaded from and stored into the arena.
///
/// `record_type` feeds `StoreError::LoadMiss` so a failed lookup names what
/// was being looked for.
pub trait PersistentRecord: Clone + Send + Sync + 'static {
    const RECORD_TYPE: &'static str;

    fn into_record(self) -> Record;
    fn from_record(record: &Record) -> Option<Self>;
}

macro_rules! persistent_record {
    ($ty:ident, $variant:ident) => {
        impl PersistentRecord for $ty {
            const RECORD_TYPE: &'static str = stringify!($ty);

            fn into_record(self) -> Record {
                Record::$variant(self)
            }

            fn from_record(record: &Record) -> Option<Self> {
                match record {
                    Record::$variant(inner) => Some(inner.clone()),
                    _ => None,
                }
            }
        }
    };
}

/// Login account as held by the lobby-side store. Owns the CAS-style CP
/// balance (`cp`), mutated only through `Store::explicit_update`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub uuid: Uuid,
    pub username: String,
    pub banned: bool,
    pub cp: i64,
    pub last_login: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Character {
    pub uuid: Uuid,
    pub account: Uuid,
    pub name: String,
    pub level: u8,
    pub lnc: i16,
    pub homepoint_zone: u32,
    pub homepoint_spot: u32,
    pub progress: Uuid,
    pub item_boxes: Vec<Uuid>,
    pub demon_boxes: Vec<Uuid>,
    pub active_demon: Option<Uuid>,
    pub hotbar: Option<Uuid>,
    pub friend_settings: Option<Uuid>,
    pub bazaar_data: Option<Uuid>,
    pub expertises: Vec<Uuid>,
    pub demon_quests: Vec<Uuid>,
    pub clan: Option<Uuid>,
    pub event_counters: Vec<Uuid>,
    /// `0` = unset, matching the original's gender enum (`NONE = 0`).
    pub gender: u8,
    /// Item type equipped per slot (helm, top, bottom, weapon, ...),
    /// indexed by equip-type id. No in-session mutation path exists yet
    /// (no `EQUIP_ITEM` action), so this is hydrated once at login and
    /// never refreshed mid-session.
    pub equipment: Vec<Option<u32>>,
    /// Zone/position recorded at the moment of logout (spec invariant 5);
    /// `0`/`0.0` for a character that has never logged out, same as a
    /// freshly created character's unset `zone_id`.
    pub logout_zone: u32,
    pub logout_x: f32,
    pub logout_y: f32,
    pub logout_rot: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemBox {
    pub uuid: Uuid,
    pub character: Uuid,
    pub slots: Vec<Option<Uuid>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub uuid: Uuid,
    pub item_type: u32,
    pub stack_size: u16,
    pub box_id: Option<Uuid>,
    pub box_slot: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemonBox {
    pub uuid: Uuid,
    pub character: Uuid,
    pub slots: Vec<Option<Uuid>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Demon {
    pub uuid: Uuid,
    pub devil_id: u32,
    pub box_id: Option<Uuid>,
    pub box_slot: Option<u16>,
    pub locked: bool,
    pub reunion_ranks: [u8; 12],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterProgress {
    pub uuid: Uuid,
    pub character: Uuid,
    pub completed_quests: Vec<u8>,
    pub active_quests: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quest {
    pub uuid: Uuid,
    pub character: Uuid,
    pub quest_id: u32,
    pub phase: i8,
    pub kill_counts: Vec<u16>,
    pub custom_data: Vec<i32>,
    /// Persists across phase advances, unlike `kill_counts`/`custom_data`;
    /// see `event::update_quest`'s `flag_updates` parameter.
    pub flags: Vec<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemonQuest {
    pub uuid: Uuid,
    pub character: Uuid,
    pub demon: Uuid,
    pub quest_type: u8,
    pub target_type: u32,
    pub target_number: u16,
    pub progress: u16,
    pub started: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clan {
    pub uuid: Uuid,
    pub name: String,
    pub members: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Party {
    pub uuid: Uuid,
    pub leader: Uuid,
    pub members: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub uuid: Uuid,
    pub leader: Uuid,
    pub members: Vec<Uuid>,
    pub team_type: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    pub uuid: Uuid,
    pub match_type: u8,
    pub entries: Vec<Uuid>,
    pub end_time: DateTime<Utc>,
}

/// One of the twenty `SearchEntry` kinds (party recruit, clan recruit,
/// trade, free, etc.).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum SearchEntryType {
    PartyJoin = 0,
    PartyRecruit = 1,
    ClanJoin = 2,
    ClanRecruit = 3,
    TradeSelling = 4,
    TradeBuying = 5,
    Free = 6,
    TeamJoin = 7,
    TeamRecruit = 8,
    TrendSelling = 9,
    TrendBuying = 10,
    DemonJoin = 11,
    DemonRecruit = 12,
    FriendJoin = 13,
    FriendRecruit = 14,
    BazaarJoin = 15,
    BazaarRecruit = 16,
    UbJoin = 17,
    UbRecruit = 18,
    Other = 19,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchEntry {
    pub uuid: Uuid,
    /// Monotonically assigned registration id; search lists sort
    /// higher-id-first so the most recent posting surfaces
    /// on top.
    pub entry_id: u32,
    pub character: Uuid,
    pub entry_type: SearchEntryType,
    pub posted: DateTime<Utc>,
    pub data: Vec<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceAccess {
    pub uuid: Uuid,
    pub instance_id: u32,
    pub zone_definition_id: u32,
    pub variant_id: u32,
    pub access_characters: Vec<Uuid>,
}

/// World-visible projection of a logged-in character, replicated by the
/// sync fabric so other channels can see who is where without touching the
/// owning channel's full `Character` record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelLogin {
    pub uuid: Uuid,
    pub character: Uuid,
    pub world_cid: i32,
    pub channel_id: u8,
    pub zone_id: u32,
    /// Action group a `PERFORM_ACTIONS` node was mid-dispatch through when
    /// the channel switch fired; `None` if the switch wasn't triggered
    /// from inside an action group.
    pub pending_action_group: Option<u32>,
    /// Index into `pending_action_group` to resume at — one past the
    /// last action this channel executed.
    pub pending_action_index: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEffect {
    pub uuid: Uuid,
    pub entity: Uuid,
    pub status_id: u32,
    pub stack: u8,
    pub expires: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventCounter {
    pub uuid: Uuid,
    pub character: Uuid,
    pub counter_id: u32,
    pub value: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PentalphaEntry {
    pub uuid: Uuid,
    pub character: Uuid,
    pub points: [i32; 5],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UBTournament {
    pub uuid: Uuid,
    pub end_time: DateTime<Utc>,
    pub participants: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hotbar {
    pub uuid: Uuid,
    pub character: Uuid,
    pub pages: Vec<Vec<Option<u32>>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expertise {
    pub uuid: Uuid,
    pub character: Uuid,
    pub expertise_id: u32,
    pub points: u32,
    pub rank: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendSettings {
    pub uuid: Uuid,
    pub character: Uuid,
    pub friends: Vec<Uuid>,
    pub blocked: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BazaarData {
    pub uuid: Uuid,
    pub character: Uuid,
    pub market_id: u32,
    pub items: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BazaarItem {
    pub uuid: Uuid,
    pub item: Uuid,
    pub price: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CultureData {
    pub uuid: Uuid,
    pub character: Uuid,
    pub item_id: u32,
    pub points: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InheritedSkill {
    pub uuid: Uuid,
    pub demon: Uuid,
    pub skill_id: u32,
    pub progress: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountWorldData {
    pub uuid: Uuid,
    pub account: Uuid,
    pub characters: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PvPData {
    pub uuid: Uuid,
    pub character: Uuid,
    pub wins: u32,
    pub losses: u32,
}

/// A CP-shop purchase parked in the recipient's mailbox. `giftee` differs
/// from `purchaser` only when `ShopBuy` carried a gift target; the post
/// mailbox's capacity (not the item box's) is what a CP purchase checks
/// for over-capacity, matching the original's separate `PostItem` store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostItem {
    pub uuid: Uuid,
    pub account: Uuid,
    pub item_type: u32,
    pub stack_size: u16,
    pub timestamp: DateTime<Utc>,
}

/// Every persistent record kind, tagged so the arena can hold them in one
/// map. Never match on this directly outside the store — use
/// [`PersistentRecord::from_record`] so callers stay type-safe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Record {
    Account(Account),
    Character(Character),
    ItemBox(ItemBox),
    Item(Item),
    DemonBox(DemonBox),
    Demon(Demon),
    CharacterProgress(CharacterProgress),
    Quest(Quest),
    DemonQuest(DemonQuest),
    Clan(Clan),
    Party(Party),
    Team(Team),
    Match(Match),
    SearchEntry(SearchEntry),
    InstanceAccess(InstanceAccess),
    ChannelLogin(ChannelLogin),
    StatusEffect(StatusEffect),
    EventCounter(EventCounter),
    PentalphaEntry(PentalphaEntry),
    UBTournament(UBTournament),
    Hotbar(Hotbar),
    Expertise(Expertise),
    FriendSettings(FriendSettings),
    BazaarData(BazaarData),
    BazaarItem(BazaarItem),
    CultureData(CultureData),
    InheritedSkill(InheritedSkill),
    AccountWorldData(AccountWorldData),
    PvPData(PvPData),
    PostItem(PostItem),
}

impl Record {
    pub fn uuid(&self) -> Uuid {
        match self {
            Record::Account(r) => r.uuid,
            Record::Character(r) => r.uuid,
            Record::ItemBox(r) => r.uuid,
            Record::Item(r) => r.uuid,
            Record::DemonBox(r) => r.uuid,
            Record::Demon(r) => r.uuid,
            Record::CharacterProgress(r) => r.uuid,
            Record::Quest(r) => r.uuid,
            Record::DemonQuest(r) => r.uuid,
            Record::Clan(r) => r.uuid,
            Record::Party(r) => r.uuid,
            Record::Team(r) => r.uuid,
            Record::Match(r) => r.uuid,
            Record::SearchEntry(r) => r.uuid,
            Record::InstanceAccess(r) => r.uuid,
            Record::ChannelLogin(r) => r.uuid,
            Record::StatusEffect(r) => r.uuid,
            Record::EventCounter(r) => r.uuid,
            Record::PentalphaEntry(r) => r.uuid,
            Record::UBTournament(r) => r.uuid,
            Record::Hotbar(r) => r.uuid,
            Record::Expertise(r) => r.uuid,
            Record::FriendSettings(r) => r.uuid,
            Record::BazaarData(r) => r.uuid,
            Record::BazaarItem(r) => r.uuid,
            Record::CultureData(r) => r.uuid,
            Record::InheritedSkill(r) => r.uuid,
            Record::AccountWorldData(r) => r.uuid,
            Record::PvPData(r) => r.uuid,
            Record::PostItem(r) => r.uuid,
        }
    }

    pub fn record_type(&self) -> &'static str {
        match self {
            Record::Account(_) => "Account",
            Record::Character(_) => "Character",
            Record::ItemBox(_) => "ItemBox",
            Record::Item(_) => "Item",
            Record::DemonBox(_) => "DemonBox",
            Record::Demon(_) => "Demon",
            Record::CharacterProgress(_) => "CharacterProgress",
            Record::Quest(_) => "Quest",
            Record::DemonQuest(_) => "DemonQuest",
            Record::Clan(_) => "Clan",
            Record::Party(_) => "Party",
            Record::Team(_) => "Team",
            Record::Match(_) => "Match",
            Record::SearchEntry(_) => "SearchEntry",
            Record::InstanceAccess(_) => "InstanceAccess",
            Record::ChannelLogin(_) => "ChannelLogin",
            Record::StatusEffect(_) => "StatusEffect",
            Record::EventCounter(_) => "EventCounter",
            Record::PentalphaEntry(_) => "PentalphaEntry",
            Record::UBTournament(_) => "UBTournament",
            Record::Hotbar(_) => "Hotbar",
            Record::Expertise(_) => "Expertise",
            Record::FriendSettings(_) => "FriendSettings",
            Record::BazaarData(_) => "BazaarData",
            Record::BazaarItem(_) => "BazaarItem",
            Record::CultureData(_) => "CultureData",
            Record::InheritedSkill(_) => "InheritedSkill",
            Record::AccountWorldData(_) => "AccountWorldData",
            Record::PvPData(_) => "PvPData",
            Record::PostItem(_) => "PostItem",
        }
    }
}

persistent_record!(Account, Account);
persistent_record!(Character, Character);
persistent_record!(ItemBox, ItemBox);
persistent_record!(Item, Item);
persistent_record!(DemonBox, DemonBox);
persistent_record!(Demon, Demon);
persistent_record!(CharacterProgress, CharacterProgress);
persistent_record!(Quest, Quest);
persistent_record!(DemonQuest, DemonQuest);
persistent_record!(Clan, Clan);
persistent_record!(Party, Party);
persistent_record!(Team, Team);
persistent_record!(Match, Match);
persistent_record!(SearchEntry, SearchEntry);
persistent_record!(InstanceAccess, InstanceAccess);
persistent_record!(ChannelLogin, ChannelLogin);
persistent_record!(StatusEffect, StatusEffect);
persistent_record!(EventCounter, EventCounter);
persistent_record!(PentalphaEntry, PentalphaEntry);
persistent_record!(UBTournament, UBTournament);
persistent_record!(Hotbar, Hotbar);
persistent_record!(Expertise, Expertise);
persistent_record!(FriendSettings, FriendSettings);
persistent_record!(BazaarData, BazaarData);
persistent_record!(BazaarItem, BazaarItem);
persistent_record!(CultureData, CultureData);
persistent_record!(InheritedSkill, InheritedSkill);
persistent_record!(AccountWorldData, AccountWorldData);
persistent_record!(PvPData, PvPData);
persistent_record!(PostItem, PostItem);
