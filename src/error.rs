//! Unified error handling for channel-server.
//!
//! One enum per error kind, each carrying an
//! `error_code()` for metrics labeling and a policy describing how a
//! caller should react, keeping the client-visible reply and the metrics
//! label next to the variant that produces them.

use thiserror::Error;
use uuid::Uuid;

/// Authentication/session lifecycle failures. Hard failures close the session.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("wrong client version: {0}")]
    WrongClientVersion(String),
    #[error("unknown username")]
    UnknownAccount,
    #[error("account banned")]
    AccountBanned,
    #[error("account already logged in")]
    AccountStillLoggedIn,
    #[error("invalid session key")]
    InvalidSessionKey,
}

impl AuthError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::WrongClientVersion(_) => "wrong_client_version",
            Self::UnknownAccount => "unknown_account",
            Self::AccountBanned => "account_banned",
            Self::AccountStillLoggedIn => "account_still_logged_in",
            Self::InvalidSessionKey => "invalid_session_key",
        }
    }
}

/// Out-of-range or malformed input accepted by an operation but rejected
/// logically. The caller decides whether to surface or silently no-op.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("quest {quest_id} phase {phase} is out of range")]
    QuestPhaseOutOfRange { quest_id: u32, phase: i8 },
    #[error("unknown skill id {0}")]
    UnknownSkill(u32),
    #[error("invalid item category: main={main} sub={sub}")]
    InvalidItemCategory { main: u8, sub: u8 },
    #[error("inventory full")]
    InventoryFull,
    #[error("COMP is full")]
    CompFull,
    #[error("demon {0} is locked")]
    DemonLocked(Uuid),
    #[error("quest {0} is not repeatable and was already completed")]
    QuestAlreadyCompleted(u32),
}

impl ValidationError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::QuestPhaseOutOfRange { .. } => "quest_phase_out_of_range",
            Self::UnknownSkill(_) => "unknown_skill",
            Self::InvalidItemCategory { .. } => "invalid_item_category",
            Self::InventoryFull => "inventory_full",
            Self::CompFull => "comp_full",
            Self::DemonLocked(_) => "demon_locked",
            Self::QuestAlreadyCompleted(_) => "quest_already_completed",
        }
    }
}

/// Data-integrity problems found while hydrating or mutating persistent
/// records. Safe-to-repair cases are logged and fixed in place by the
/// caller; the `fatal` cases here are the ones that would lose data if
/// repaired automatically.
#[derive(Debug, Error)]
pub enum IntegrityError {
    #[error("duplicate event counter for type {0}")]
    DuplicateEventCounter(u32),
    #[error("unknown skill id {0} on character {1}")]
    UnknownSkillFatal(u32, Uuid),
    #[error("slot pointer for item box {0} references an owner it doesn't belong to")]
    CrossOwnedSlot(Uuid),
}

impl IntegrityError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::DuplicateEventCounter(_) => "duplicate_event_counter",
            Self::UnknownSkillFatal(..) => "unknown_skill_fatal",
            Self::CrossOwnedSlot(_) => "cross_owned_slot",
        }
    }
}

/// Failures from the persistent `Store`: a required load missed, or a
/// change-set failed to apply atomically.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("load miss for {record_type} {uuid}")]
    LoadMiss { record_type: &'static str, uuid: Uuid },
    #[error("change-set conflict: {0}")]
    ApplyConflict(String),
    #[error("explicit update precondition failed for {uuid}: expected {expected}, found {found}")]
    ExplicitUpdateConflict { uuid: Uuid, expected: i64, found: i64 },
    #[error(transparent)]
    Backend(#[from] sqlx::Error),
}

impl StoreError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::LoadMiss { .. } => "load_miss",
            Self::ApplyConflict(_) => "apply_conflict",
            Self::ExplicitUpdateConflict { .. } => "explicit_update_conflict",
            Self::Backend(_) => "backend_error",
        }
    }
}

/// Malformed or short inbound requests. Dropped silently from the client's
/// point of view; logged at error level for operators.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("short packet: expected at least {expected} bytes, got {got}")]
    ShortPacket { expected: usize, got: usize },
    #[error("malformed search entry payload")]
    MalformedSearchEntry,
    #[error("unknown message code {0}")]
    UnknownCode(u16),
}

impl ProtocolError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ShortPacket { .. } => "short_packet",
            Self::MalformedSearchEntry => "malformed_search_entry",
            Self::UnknownCode(_) => "unknown_code",
        }
    }
}

/// One-shot timeout conditions: session idle sweep, unresolved channel
/// switch. Both result in a disconnect notification to the world.
#[derive(Debug, Error)]
pub enum TimeoutError {
    #[error("session idle past timeout")]
    SessionIdle,
    #[error("channel switch handoff never resolved")]
    ChannelSwitchUnresolved,
}

impl TimeoutError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::SessionIdle => "session_idle",
            Self::ChannelSwitchUnresolved => "channel_switch_unresolved",
        }
    }
}

/// Top-level error aggregating every kind, for propagation at the binary
/// boundary and in tests where only "did it fail" matters.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Integrity(#[from] IntegrityError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Timeout(#[from] TimeoutError),
    #[error("config error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl ChannelError {
    /// Static label for metrics, matching the variant's own `error_code`.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Auth(e) => e.error_code(),
            Self::Validation(e) => e.error_code(),
            Self::Integrity(e) => e.error_code(),
            Self::Store(e) => e.error_code(),
            Self::Protocol(e) => e.error_code(),
            Self::Timeout(e) => e.error_code(),
            Self::Config(_) => "config_error",
        }
    }
}
