//! Persistent `Store` backend configuration.

use serde::Deserialize;

fn default_max_connections() -> u32 {
    10
}

/// Connection settings for the SQL database backing the [`crate::db::Store`].
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLx connection string (e.g. `sqlite://channel.db` or `:memory:`).
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}
