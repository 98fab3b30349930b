//! World-server link configuration.

use serde::Deserialize;
use std::net::SocketAddr;

fn default_reconnect_secs() -> u64 {
    5
}

fn default_sync_flush_interval_ms() -> u64 {
    100
}

/// Configuration for the single upstream link to the world server that the
/// [`crate::sync::SyncManager`] maintains.
#[derive(Debug, Clone, Deserialize)]
pub struct WorldConfig {
    /// World server address to connect out to.
    pub address: SocketAddr,
    /// Shared link password, validated during the handshake.
    pub link_password: String,
    /// Seconds to wait before retrying a dropped world connection.
    #[serde(default = "default_reconnect_secs")]
    pub reconnect_secs: u64,
    /// How often queued outbound sync records are flushed into one batch.
    #[serde(default = "default_sync_flush_interval_ms")]
    pub sync_flush_interval_ms: u64,
}
