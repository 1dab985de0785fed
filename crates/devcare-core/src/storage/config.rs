//! TOML-based application configuration.
//!
//! Stores user preferences including:
//! - Pomodoro phase lengths and the long-break switch
//! - Timer checkpoint cadence
//! - GitHub OAuth client settings and API endpoints
//!
//! Configuration is stored at `~/.config/devcare/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::data_dir;
use crate::error::ConfigError;
use crate::timer::PomodoroDurations;

/// Pomodoro phase lengths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PomodoroConfig {
    #[serde(default = "default_work_minutes")]
    pub work_minutes: u64,
    #[serde(default = "default_break_minutes")]
    pub break_minutes: u64,
    #[serde(default = "default_long_break_minutes")]
    pub long_break_minutes: u64,
    /// Arm `long_break_minutes` after every fourth work phase. Off by
    /// default: every break uses `break_minutes`.
    #[serde(default)]
    pub long_break_every_fourth: bool,
}

/// Tick-loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerConfig {
    /// Persist the running countdown every this many ticks (0 disables).
    #[serde(default = "default_checkpoint_every_ticks")]
    pub checkpoint_every_ticks: u32,
}

/// GitHub OAuth application and API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_redirect_port")]
    pub redirect_port: u16,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    /// The local callback listener closes after this many seconds.
    #[serde(default = "default_callback_timeout_secs")]
    pub callback_timeout_secs: u64,
    /// Attempts for the profile fetch that follows authentication.
    #[serde(default = "default_profile_retries")]
    pub profile_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_oauth_base")]
    pub oauth_base: String,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/devcare/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pomodoro: PomodoroConfig,
    #[serde(default)]
    pub timer: TimerConfig,
    #[serde(default)]
    pub github: GitHubConfig,
}

// Default functions
fn default_work_minutes() -> u64 {
    25
}
fn default_break_minutes() -> u64 {
    5
}
fn default_long_break_minutes() -> u64 {
    15
}
fn default_checkpoint_every_ticks() -> u32 {
    10
}
fn default_redirect_port() -> u16 {
    3000
}
fn default_scopes() -> Vec<String> {
    vec!["repo".into()]
}
fn default_callback_timeout_secs() -> u64 {
    120
}
fn default_profile_retries() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    1000
}
fn default_api_base() -> String {
    "https://api.github.com".into()
}
fn default_oauth_base() -> String {
    "https://github.com".into()
}

impl Default for PomodoroConfig {
    fn default() -> Self {
        Self {
            work_minutes: default_work_minutes(),
            break_minutes: default_break_minutes(),
            long_break_minutes: default_long_break_minutes(),
            long_break_every_fourth: false,
        }
    }
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            checkpoint_every_ticks: default_checkpoint_every_ticks(),
        }
    }
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_port: default_redirect_port(),
            scopes: default_scopes(),
            callback_timeout_secs: default_callback_timeout_secs(),
            profile_retries: default_profile_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            api_base: default_api_base(),
            oauth_base: default_oauth_base(),
        }
    }
}

impl GitHubConfig {
    /// Client id, with `DEVCARE_GITHUB_CLIENT_ID` taking precedence.
    pub fn resolved_client_id(&self) -> String {
        std::env::var("DEVCARE_GITHUB_CLIENT_ID").unwrap_or_else(|_| self.client_id.clone())
    }

    /// Client secret, with `DEVCARE_GITHUB_CLIENT_SECRET` taking precedence.
    pub fn resolved_client_secret(&self) -> String {
        std::env::var("DEVCARE_GITHUB_CLIENT_SECRET")
            .unwrap_or_else(|_| self.client_secret.clone())
    }
}

impl PomodoroConfig {
    pub fn durations(&self) -> PomodoroDurations {
        PomodoroDurations {
            work_minutes: self.work_minutes,
            break_minutes: self.break_minutes,
            long_break_minutes: self.long_break_minutes,
            long_break_every_fourth: self.long_break_every_fourth,
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().map_or(true, |p| p.is_empty()) {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value
                            .parse::<bool>()
                            .map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        let n = value
                            .parse::<u64>()
                            .map_err(|_| invalid(format!("cannot parse '{value}' as number")))?;
                        serde_json::Value::Number(n.into())
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk, writing the defaults on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        match std::fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path,
                message: e.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save()?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path,
                message: e.to_string(),
            }),
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::path()?;
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(&path, content).map_err(|e| ConfigError::SaveFailed {
            path,
            message: e.to_string(),
        })
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key without saving.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value cannot be parsed.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        *self = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Set a config value by key and save.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// or the config cannot be saved.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.apply(key, value)?;
        self.save()
    }

    /// Load from disk, returning default on error.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "falling back to default configuration");
            Self::default()
        })
    }
}
