//! Prometheus metrics collection for channel-server.
//!
//! A process-wide [`prometheus::Registry`] populated with counters/gauges
//! at startup via [`init`], scraped through the HTTP endpoint in [`http`].

mod http;

pub use http::run_http_server;

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ------------------------------------------------------------------
    // Counters
    // ------------------------------------------------------------------

    /// Successful `PACKET_LOGIN` completions.
    pub static ref LOGINS_OK: IntCounter = IntCounter::new(
        "channel_logins_total",
        "Successful character logins"
    ).unwrap();

    /// Login failures, labeled by the `ErrorKind::Auth` variant's error code.
    pub static ref LOGIN_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("channel_login_failures_total", "Failed login attempts by reason"),
        &["reason"]
    ).unwrap();

    /// Completed `Logout(delay=false)` persistence runs.
    pub static ref LOGOUTS: IntCounter = IntCounter::new(
        "channel_logouts_total",
        "Character logouts persisted"
    ).unwrap();

    /// `SyncManager` inbound batches applied, labeled by record type tag.
    pub static ref SYNC_RECORDS_APPLIED: IntCounterVec = IntCounterVec::new(
        Opts::new("channel_sync_records_applied_total", "Inbound sync records applied"),
        &["record_type"]
    ).unwrap();

    /// `EventRuntime::handle_event` invocations.
    pub static ref EVENTS_STARTED: IntCounter = IntCounter::new(
        "channel_events_started_total",
        "Event instances started"
    ).unwrap();

    /// Quest phase transitions, labeled by outcome (`advance`, `complete`, `delete`).
    pub static ref QUEST_TRANSITIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("channel_quest_transitions_total", "Quest phase transitions by outcome"),
        &["outcome"]
    ).unwrap();

    /// Action-dispatcher actions executed, labeled by `ActionType`.
    pub static ref ACTIONS_EXECUTED: IntCounterVec = IntCounterVec::new(
        Opts::new("channel_actions_executed_total", "Actions executed by type"),
        &["action_type"]
    ).unwrap();

    /// Chat messages routed, labeled by `ChatChannel`.
    pub static ref CHAT_MESSAGES_ROUTED: IntCounterVec = IntCounterVec::new(
        Opts::new("channel_chat_messages_routed_total", "Chat messages routed by channel"),
        &["channel"]
    ).unwrap();

    /// Sessions timed out by `SessionRegistry::schedule_timeouts`.
    pub static ref SESSION_TIMEOUTS: IntCounter = IntCounter::new(
        "channel_session_timeouts_total",
        "Sessions disconnected for idle timeout"
    ).unwrap();

    // ------------------------------------------------------------------
    // Gauges
    // ------------------------------------------------------------------

    /// Currently connected sessions.
    pub static ref ACTIVE_SESSIONS: IntGauge = IntGauge::new(
        "channel_active_sessions",
        "Currently connected sessions"
    ).unwrap();

    /// Currently live zone instances.
    pub static ref ACTIVE_INSTANCES: IntGauge = IntGauge::new(
        "channel_active_instances",
        "Live zone instances"
    ).unwrap();
}

/// Registers every metric above. Must run once at startup before any
/// metric is recorded.
pub fn init() {
    REGISTRY.register(Box::new(LOGINS_OK.clone())).unwrap();
    REGISTRY.register(Box::new(LOGIN_FAILURES.clone())).unwrap();
    REGISTRY.register(Box::new(LOGOUTS.clone())).unwrap();
    REGISTRY.register(Box::new(SYNC_RECORDS_APPLIED.clone())).unwrap();
    REGISTRY.register(Box::new(EVENTS_STARTED.clone())).unwrap();
    REGISTRY.register(Box::new(QUEST_TRANSITIONS.clone())).unwrap();
    REGISTRY.register(Box::new(ACTIONS_EXECUTED.clone())).unwrap();
    REGISTRY.register(Box::new(CHAT_MESSAGES_ROUTED.clone())).unwrap();
    REGISTRY.register(Box::new(SESSION_TIMEOUTS.clone())).unwrap();
    REGISTRY.register(Box::new(ACTIVE_SESSIONS.clone())).unwrap();
    REGISTRY.register(Box::new(ACTIVE_INSTANCES.clone())).unwrap();
}

/// Gathers and text-encodes every registered metric for the `/metrics`
/// HTTP endpoint.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gather_metrics_includes_registered_series() {
        // init() is process-global and idempotent-unsafe to call twice
        // (prometheus panics on double-register), so this test only
        // exercises gather() against whatever the process already
        // registered via `init()` at binary startup; in a lib-only test
        // run REGISTRY is simply empty and gather still succeeds.
        let text = gather_metrics();
        assert!(text.is_empty() || text.contains("channel_"));
    }
}
