//! Per-connection session state.

use crate::event::EventInstance;
use crate::network::ServerPacket;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use tokio::sync::mpsc;
use uuid::Uuid;

/// A client's connection-scoped state: who they are, where their event
/// machine stands, and the bookkeeping the registry needs to find them.
pub struct Session {
    pub username: String,
    pub account: Option<Uuid>,
    pub character: Option<Uuid>,
    pub world_cid: Option<i32>,
    pub session_key: Option<String>,
    pub zone_id: Option<u32>,
    pub last_activity: DateTime<Utc>,
    pub timeout_marker: Option<DateTime<Utc>>,
    pub save_on_logout: bool,

    /// Set by `AccountManager::prepare_channel_change` and cleared once
    /// the hand-off is shipped; lets the action dispatcher notice a
    /// channel switch fired mid-`PERFORM_ACTIONS` and stamp a resume
    /// cursor onto the parked `ChannelLogin` before it stops.
    pub channel_switch_pending: bool,

    /// At most one running event (invariant 4).
    pub current_event: Option<EventInstance>,
    /// Stack of suspended events to pop back into once `current_event` ends.
    pub previous_events: Vec<EventInstance>,
    /// FIFO of events requested while another was already running.
    pub queued_events: VecDeque<EventInstance>,

    /// Per-(world_cid, key) zone flags; `world_cid = 0` is the zone-wide
    /// value (invariant 5). Lives here because flags are read far more
    /// often per-session than shared, and the zone-wide case is just
    /// `world_cid = 0` in the same map.
    pub zone_flags: std::collections::HashMap<(i32, String), i32>,

    /// Sink for outbound client packets. `None` in tests that only
    /// inspect state and never assert on wire traffic.
    pub outbound: Option<mpsc::UnboundedSender<ServerPacket>>,

    /// Set while a `PACKET_WEB_GAME` session is open for this client; a
    /// full logout ends it (`AccountManager::logout`'s pre-logout cleanup).
    pub web_game_active: bool,
    /// Demon mid-digitalize, if any. Completed on full logout unless
    /// `channel_switch_pending` is set, in which case it carries over to
    /// the target channel untouched.
    pub digitalize_demon: Option<Uuid>,
    /// `Match` record this session is entered into but hasn't started,
    /// cleaned up (entry removed) on full logout.
    pub pending_match: Option<Uuid>,
    /// Demon quest this session has on offer but hasn't accepted; rejected
    /// (record deleted) on full logout.
    pub pending_demon_quest: Option<Uuid>,
    /// Bazaar/player trade session in progress, if any.
    pub exchange_session: Option<Uuid>,
}

impl Session {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            account: None,
            character: None,
            world_cid: None,
            session_key: None,
            zone_id: None,
            last_activity: Utc::now(),
            timeout_marker: None,
            save_on_logout: true,
            channel_switch_pending: false,
            current_event: None,
            previous_events: Vec::new(),
            queued_events: VecDeque::new(),
            zone_flags: std::collections::HashMap::new(),
            outbound: None,
            web_game_active: false,
            digitalize_demon: None,
            pending_match: None,
            pending_demon_quest: None,
            exchange_session: None,
        }
    }

    /// Wires an outbound channel, returning the receiving half for a test
    /// or a real connection's write task to drain.
    pub fn with_outbound(mut self) -> (Self, mpsc::UnboundedReceiver<ServerPacket>) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.outbound = Some(tx);
        (self, rx)
    }

    /// Sends one packet to the client. Silently dropped if no outbound
    /// channel is wired (headless test session) or the receiver is gone
    /// (client disconnected mid-send).
    pub fn send(&self, packet: ServerPacket) {
        if let Some(tx) = &self.outbound {
            let _ = tx.send(packet);
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity = now;
        self.timeout_marker = None;
    }

    /// Ends the current event, clearing all three event-state slots
    /// together as invariant 4 requires.
    pub fn end_event(&mut self) {
        self.current_event = None;
        self.previous_events.clear();
        self.queued_events.clear();
    }

    pub fn set_or_queue_event(&mut self, instance: EventInstance) {
        if self.current_event.is_none() {
            self.current_event = Some(instance);
        } else {
            self.queued_events.push_back(instance);
        }
    }

    pub fn zone_flag(&self, world_cid: i32, key: &str) -> Option<i32> {
        self.zone_flags.get(&(world_cid, key.to_string())).copied()
    }

    pub fn set_zone_flag(&mut self, world_cid: i32, key: impl Into<String>, value: i32) {
        self.zone_flags.insert((world_cid, key.into()), value);
    }
}
