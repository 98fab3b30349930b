//! Wire message shapes.
//!
//! Payload layout (the actual byte framing of each code) is an external
//! collaborator's concern — see [`super::codec::ClientCodec`] — these
//! types are what the rest of the crate dispatches on once a payload has
//! been decoded.

use serde::{Deserialize, Serialize};

/// A decoded client message: a message code paired with its body.
#[derive(Debug, Clone)]
pub struct ClientMessage {
    pub code: ClientCode,
    pub payload: Vec<u8>,
}

/// In-scope client <-> channel message codes. Names are
/// normative; exact numeric values are assigned by the wire codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientCode {
    Login,
    Logout,
    EventResponse,
    ShopBuy,
    SearchEntryRegister,
    SearchEntryUpdate,
    SearchEntryRemove,
    SearchEntryApplicationReply,
}

/// Decoded body of `C->L PACKET_SHOP_BUY`. `cache_id` identifies which of
/// the shop's cached product tabs `product_id` was read from; this crate
/// doesn't model tabs (see [`crate::definitions::Definitions::shop_product`])
/// so it's carried through only for the reply echo.
#[derive(Debug, Clone)]
pub struct ShopBuyRequest {
    pub shop_id: u32,
    pub cache_id: u32,
    pub product_id: u32,
    pub quantity: u16,
    pub giftee_name: Option<String>,
    pub message: Option<String>,
}

/// Reply code for `PACKET_LOGOUT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutAction {
    Prepare,
    Disconnect,
    ChannelSwitch,
}

/// Request code carried by `C->L PACKET_LOGOUT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutCode {
    Quit,
    Cancel,
    Switch,
}

impl LogoutCode {
    pub fn from_wire(code: u8) -> Option<Self> {
        match code {
            6 => Some(Self::Quit),
            7 => Some(Self::Cancel),
            8 => Some(Self::Switch),
            _ => None,
        }
    }
}

/// Internal channel<->world envelope action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InternalAction {
    Add,
    Update,
    Remove,
    ResponseYes,
    ResponseNo,
    YnRequest,
}

/// `PACKET_RELAY` fan-out mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayMode {
    Character,
    Party,
    Clan,
    Team,
}

/// A relay envelope addressed to one or more world-visible targets.
#[derive(Debug, Clone)]
pub struct RelayEnvelope {
    pub world_cid: i32,
    pub mode: RelayMode,
    pub target_id: i32,
    pub include_self: bool,
    pub inner: Vec<u8>,
}

/// Client-facing outbound shapes. Each variant is one of the
/// named `PACKET_*` replies; byte layout is the wire codec's concern, not
/// this type's — components construct one of these and hand it to a
/// session's outbound queue, which a real `ClientCodec` encoder drains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServerPacket {
    Login { result: i32 },
    Logout { action: LogoutActionWire },
    EventNpcMessage { event_id: u32, message_id: u32 },
    EventExNpcMessage { event_id: u32, message_id: u32 },
    EventMultitalk { event_id: u32 },
    EventPrompt { event_id: u32, choices: Vec<u32>, disabled: Vec<bool> },
    EventPlayScene { scene_id: u32 },
    EventOpenMenu { menu_id: u32 },
    EventDirection { event_id: u32 },
    EventMessage { event_id: u32 },
    EventStageEffect { effect_id: u32 },
    EventHomepointUpdate,
    EventSpecialDirection { direction_id: u32 },
    EventPlayBgm { bgm_id: u32 },
    EventStopBgm,
    EventPlaySoundEffect { effect_id: u32 },
    EventEnd,
    EventGetItems { item_type: u32, quantity: u16 },
    QuestActiveList { quests: Vec<(u32, i8)> },
    QuestCompletedList { quests: Vec<u32> },
    QuestPhaseUpdate { quest_id: u32, phase: i8 },
    QuestKillCountUpdate { quest_id: u32, custom_data: Vec<i32> },
    DemonQuestListUpdated,
    DemonQuestCountUpdate { progress: u16, target: u16 },
    DemonQuestEnd { success: bool },
    SearchEntryRegister { entry_id: u32, result: i32 },
    SearchEntryUpdate { entry_id: u32 },
    SearchEntryRemove { entry_id: u32 },
    SearchEntryInfo { entry_id: u32, data: Vec<i32> },
    SearchEntrySelf { entries: Vec<u32> },
    SearchEntryApplication { entry_id: u32, applicant: uuid::Uuid },
    SearchEntryApplicationReply { entry_id: u32, accepted: bool },
    ShopBuy { shop_id: u32, product_id: u32, result: i32, flag: u32, unknown: u32 },
    /// `PACKET_CASH_BALANCE`: always a fresh reload of the account, never a
    /// delta — `unknown` mirrors the original's trailing reserved `S32Little(0)`.
    CashBalance { cp: i64, unknown: i32 },
    Chat { channel: super::super::chat::ChatChannel, sender: String, message: String },
}

/// Wire-level mirror of [`LogoutAction`] (kept `Serialize` separately so
/// `LogoutAction` itself can stay a plain enum used in matches).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogoutActionWire {
    Prepare,
    Disconnect,
    ChannelSwitch,
}

impl From<LogoutAction> for LogoutActionWire {
    fn from(action: LogoutAction) -> Self {
        match action {
            LogoutAction::Prepare => Self::Prepare,
            LogoutAction::Disconnect => Self::Disconnect,
            LogoutAction::ChannelSwitch => Self::ChannelSwitch,
        }
    }
}
