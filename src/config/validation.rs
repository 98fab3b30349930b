//! Configuration validation.
//!
//! Validates configuration at startup so operators see every problem at
//! once instead of fixing one typo per restart.

use super::Config;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("server.name is required")]
    MissingServerName,
    #[error("definitions_path does not exist: {0}")]
    DefinitionsPathNotFound(String),
    #[error("limits.inventory_slots must be nonzero")]
    ZeroInventorySlots,
    #[error("limits.comp_slots must be nonzero")]
    ZeroCompSlots,
}

/// Validate a configuration, returning every error found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.name.is_empty() {
        errors.push(ValidationError::MissingServerName);
    }
    if !std::path::Path::new(&config.definitions_path).exists() {
        errors.push(ValidationError::DefinitionsPathNotFound(
            config.definitions_path.clone(),
        ));
    }
    if config.limits.inventory_slots == 0 {
        errors.push(ValidationError::ZeroInventorySlots);
    }
    if config.limits.comp_slots == 0 {
        errors.push(ValidationError::ZeroCompSlots);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
