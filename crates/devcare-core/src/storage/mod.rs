mod config;
pub mod database;
pub mod ledger;
pub mod migrations;

pub use config::{Config, GitHubConfig, PomodoroConfig, TimerConfig};
pub use database::{Database, STATE_KEY};
pub use ledger::{
    NewSession, SessionKind, SessionLedger, SessionRecord, StateStore, Task, TaskId,
};

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns `~/.config/devcare[-dev]/` based on DEVCARE_ENV.
///
/// Set DEVCARE_ENV=dev to use the development data directory, and
/// DEVCARE_HOME to replace `~/.config` entirely (tests point it at a
/// temporary directory).
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let base_dir = match std::env::var_os("DEVCARE_HOME") {
        Some(home) => PathBuf::from(home),
        None => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config"),
    };

    let env = std::env::var("DEVCARE_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("devcare-dev")
    } else {
        base_dir.join("devcare")
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::DataDir {
        path: dir.clone(),
        message: e.to_string(),
    })?;
    Ok(dir)
}
