//! The channel's single upstream link to the world server.
//!
//! Actual socket plumbing (TCP connect, TLS, framing) is an external
//! collaborator's concern; this type owns only what's in scope — the
//! outbound packet queue a real transport task drains, and the login
//! request/response correlation table: outbound `world.send_packet`
//! acknowledgements that block until a response arrives (e.g.
//! login-request awaits login-response). No lock is held across the
//! `.await` on that oneshot: the table is a `DashMap`, entries are taken
//! by value before the send, dropped before the wait.

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use super::message::RelayEnvelope;

/// `PACKET_ACCOUNT_LOGIN` mode. Only `Normal` is exercised by
/// the core login path; the variant exists so a richer world protocol can
/// extend it without reshaping the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginMode {
    Normal,
}

/// `PACKET_ACCOUNT_LOGOUT` notification action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutNotifyAction {
    Disconnect,
    TimedOut,
    Kicked,
}

/// `PACKET_WEB_GAME` action: either a session carried by value
/// or a lookup by world-CID.
#[derive(Debug, Clone)]
pub enum WebGameAction {
    Start { session_id: String },
    End { world_cid: i32 },
}

/// Outcome of an `ACCOUNT_LOGIN` round-trip, delivered by the world's
/// asynchronous response.
#[derive(Debug, Clone)]
pub enum LoginOutcome {
    CharacterSelected { world_cid: i32, character: uuid::Uuid },
    Rejected,
}

/// One outbound message to the world server. Variants mirror the §6
/// internal protocol; `Sync` carries an opaque serialized batch built by
/// [`crate::sync::SyncManager`] so this module doesn't need to know the
/// sync record types.
#[derive(Debug, Clone)]
pub enum WorldPacket {
    GetWorldInfo,
    AccountLogin {
        mode: LoginMode,
        username: String,
        session_key: String,
    },
    AccountLogout {
        action: LogoutNotifyAction,
        username: String,
        kick_level: Option<u8>,
    },
    PartyUpdate(Vec<u8>),
    ClanUpdate(Vec<u8>),
    WebGame(WebGameAction),
    Relay(RelayEnvelope),
    /// Opaque serialized typed-record sync batch.
    Sync(Vec<u8>),
}

/// The channel's outbound queue to the world plus its login-await table.
pub struct WorldConnection {
    outbound: mpsc::UnboundedSender<WorldPacket>,
    pending_logins: DashMap<String, oneshot::Sender<LoginOutcome>>,
}

impl WorldConnection {
    /// Builds a connection and returns the receiving half a transport
    /// task drains to perform the actual socket write.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<WorldPacket>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                outbound: tx,
                pending_logins: DashMap::new(),
            },
            rx,
        )
    }

    /// Fire-and-forget send; fails only if the transport task has
    /// dropped its receiver (link torn down).
    pub fn send_packet(&self, packet: WorldPacket) -> bool {
        self.outbound.send(packet).is_ok()
    }

    /// Sends `ACCOUNT_LOGIN` and returns a receiver that resolves when
    /// `complete_login` is called for this username. Held across no lock.
    pub fn send_login(&self, username: &str, session_key: &str) -> oneshot::Receiver<LoginOutcome> {
        let (tx, rx) = oneshot::channel();
        self.pending_logins.insert(username.to_string(), tx);
        self.send_packet(WorldPacket::AccountLogin {
            mode: LoginMode::Normal,
            username: username.to_string(),
            session_key: session_key.to_string(),
        });
        rx
    }

    /// Resolves a pending login await with the world's response. A
    /// response for a username with no pending request is logged and
    /// dropped — the request must have already timed out or never
    /// happened on this channel.
    pub fn complete_login(&self, username: &str, outcome: LoginOutcome) {
        if let Some((_, tx)) = self.pending_logins.remove(username) {
            let _ = tx.send(outcome);
        } else {
            warn!(%username, "login response with no pending request");
        }
    }
}
