//! SessionRegistry — maps `username -> Session` and `world-CID -> Session`.
//!
//! Lock order: DashMap shard lock, then a session's own `RwLock`, never
//! the reverse. Broadcast snapshots the connection list under the map
//! lock and releases before sending, a collect-then-release pattern used
//! throughout for fan-out.

use super::session::Session;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info};

pub type SharedSession = Arc<RwLock<Session>>;

/// Live-session directory for one channel process.
pub struct SessionRegistry {
    by_username: DashMap<String, SharedSession>,
    by_world_cid: DashMap<i32, String>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            by_username: DashMap::new(),
            by_world_cid: DashMap::new(),
        }
    }

    /// Inserts only if absent; idempotent for an already-registered
    /// username.
    pub fn set(&self, session: Session) -> SharedSession {
        let username = session.username.clone();
        let world_cid = session.world_cid;
        let shared = self
            .by_username
            .entry(username.clone())
            .or_insert_with(|| Arc::new(RwLock::new(session)))
            .clone();
        if let Some(cid) = world_cid {
            self.by_world_cid.insert(cid, username);
        }
        shared
    }

    /// Removes a session by username. Callers are responsible for emitting
    /// the world-visible "logout" notification; the registry only owns the
    /// map entry itself.
    pub fn remove(&self, username: &str) -> Option<SharedSession> {
        let removed = self.by_username.remove(username).map(|(_, s)| s);
        if let Some(session) = &removed {
            if let Some(cid) = session.read().world_cid {
                self.by_world_cid.remove(&cid);
            }
            info!(%username, "session removed");
        }
        removed
    }

    pub fn by_username(&self, name: &str) -> Option<SharedSession> {
        self.by_username.get(name).map(|e| e.clone())
    }

    pub fn by_world_cid(&self, cid: i32) -> Option<SharedSession> {
        let username = self.by_world_cid.get(&cid)?.clone();
        self.by_username(&username)
    }

    /// Links a session's world-CID after it becomes known (post character
    /// select), keeping the two maps consistent under one pass (invariant 3).
    pub fn link_world_cid(&self, username: &str, cid: i32) {
        if let Some(session) = self.by_username(username) {
            session.write().world_cid = Some(cid);
            self.by_world_cid.insert(cid, username.to_string());
        }
    }

    pub fn len(&self) -> usize {
        self.by_username.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_username.is_empty()
    }

    /// Fan-out to all active sessions. `send` does the actual write; the
    /// snapshot of sessions is taken under the map lock and released
    /// before any `send` runs, so a slow client can't stall the sweep.
    pub fn broadcast(&self, mut send: impl FnMut(&SharedSession)) {
        let snapshot: Vec<SharedSession> = self.by_username.iter().map(|e| e.value().clone()).collect();
        for session in &snapshot {
            send(session);
        }
    }

    /// Periodic sweep: any session whose
    /// last-activity timestamp is older than `timeout_s` seconds is
    /// reported via `on_timeout` and its timeout marker zeroed to prevent
    /// double-reporting.
    pub fn schedule_timeouts(&self, timeout_s: i64, mut on_timeout: impl FnMut(&str)) {
        let now = Utc::now();
        let mut timed_out = Vec::new();
        for entry in self.by_username.iter() {
            let mut session = entry.value().write();
            if session.timeout_marker.is_some() {
                continue;
            }
            let idle = now.signed_duration_since(session.last_activity);
            if idle.num_seconds() >= timeout_s {
                session.timeout_marker = Some(now);
                timed_out.push(entry.key().clone());
            }
        }
        for username in timed_out {
            debug!(%username, "session idle timeout");
            on_timeout(&username);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    /// A session idle past the threshold is reported exactly once: the
    /// timeout marker set on the first sweep suppresses every later one.
    #[test]
    fn schedule_timeouts_reports_idle_session_only_once() {
        let registry = SessionRegistry::new();
        let shared = registry.set(Session::new("idle-user"));
        shared.write().last_activity = Utc::now() - Duration::seconds(400);

        let mut fired = Vec::new();
        registry.schedule_timeouts(300, |username| fired.push(username.to_string()));
        registry.schedule_timeouts(300, |username| fired.push(username.to_string()));

        assert_eq!(fired, vec!["idle-user".to_string()]);
    }

    #[test]
    fn schedule_timeouts_skips_recently_active_session() {
        let registry = SessionRegistry::new();
        registry.set(Session::new("active-user"));

        let mut fired = Vec::new();
        registry.schedule_timeouts(300, |username| fired.push(username.to_string()));

        assert!(fired.is_empty());
    }

    #[test]
    fn set_is_idempotent_for_already_registered_username() {
        let registry = SessionRegistry::new();
        let first = registry.set(Session::new("dup"));
        let second = registry.set(Session::new("dup"));

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }
}
