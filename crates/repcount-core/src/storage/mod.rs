mod config;
pub mod database;
pub mod migrations;

pub use config::{AlertConfig, Config, SessionConfig};
pub use database::{Database, DaySlotSummary};

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns `~/.config/repcount[-dev]/` based on REPCOUNT_ENV.
///
/// Set REPCOUNT_ENV=dev to use the development data directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("REPCOUNT_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("repcount-dev")
    } else {
        base_dir.join("repcount")
    };

    std::fs::create_dir_all(&dir).map_err(|source| ConfigError::DataDir {
        path: dir.clone(),
        source,
    })?;
    Ok(dir)
}
