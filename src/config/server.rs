//! Server identity and listener configuration.

use serde::Deserialize;
use std::net::SocketAddr;

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_session_sweep_interval_secs() -> u64 {
    10
}

/// Log output format, selected at startup before the subscriber is built.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Server identity and client-facing listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// This channel's id, used as the low bits of world-CIDs it mints and
    /// as the `source` tag on sync batches it emits.
    pub channel_id: u8,
    /// Client build string required on `PACKET_LOGIN`.
    pub expected_client_version: String,
    /// Display name, used in logs and in the world handshake.
    pub name: String,
    /// Address the client-facing listener binds to. The wire codec itself
    /// is out of scope; this is the socket the external
    /// `ClientCodec` is handed once accepted.
    pub listen_address: SocketAddr,
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
    /// Interval, in seconds, between `SessionRegistry::schedule_timeouts`
    /// sweeps.
    #[serde(default = "default_session_sweep_interval_secs")]
    pub session_sweep_interval_secs: u64,
    /// Idle seconds after which a session is reported to the world as
    /// timed out.
    pub session_timeout_secs: u64,
}
