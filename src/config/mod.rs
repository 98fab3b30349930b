//! Configuration loading and management.
//!
//! Split into logical submodules following the same shape the rest of the
//! crate uses for its managers: one file per concern, re-exported flat
//! from here.
//! - [`server`]: identity and listen configuration.
//! - [`world`]: the upstream world-server link.
//! - [`database`]: `Store` backend connection settings.
//! - [`limits`]: inventory/COMP/broadcast numeric caps.
//! - [`security`]: session timeout and login rate limiting.

mod database;
mod limits;
mod security;
mod server;
mod validation;
mod world;

pub use database::DatabaseConfig;
pub use limits::LimitsConfig;
pub use security::SecurityConfig;
pub use server::{LogFormat, ServerConfig};
pub use validation::{validate, ValidationError};
pub use world::WorldConfig;

use serde::Deserialize;
use thiserror::Error;

/// Configuration errors encountered while loading `config.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Root configuration for the channel process.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub world: WorldConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    /// Path to the directory holding immutable game-content definition
    /// files consumed by [`crate::definitions::Definitions`].
    pub definitions_path: String,
}

impl Config {
    /// Load and parse `path` into a `Config`. Does not validate; call
    /// [`validate`] separately so callers can log every error found
    /// rather than failing on the first one.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&raw)?;
        Ok(config)
    }
}
