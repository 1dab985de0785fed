//! Core error types for devcare-core.
//!
//! Timer precondition failures, ledger failures and GitHub failures are kept
//! apart so callers can decide which ones are fatal. Ledger and network
//! errors never reach the timer state: the engine logs them and turns them
//! into advisories.

use std::path::PathBuf;
use thiserror::Error;

use crate::timer::TimerMode;

/// Core error type for devcare-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Pomodoro start without a selected (or existing) task.
    #[error("A task must be selected before starting a Pomodoro")]
    InvalidTask,

    /// Unrecognized automated-timer level.
    #[error("Unknown automated timer level '{0}' (expected easy, medium or hard)")]
    InvalidLevel(String),

    /// A running countdown refuses to be overridden.
    #[error("A {mode} timer is already running; stop it first")]
    TimerBusy { mode: TimerMode },

    /// Operation requires a running countdown.
    #[error("No timer is running")]
    NotRunning,

    /// Operation requires a paused countdown.
    #[error("The timer is not paused")]
    NotPaused,

    /// Countdown length must be a positive number of minutes that fits in
    /// a seconds counter.
    #[error("Invalid timer duration of {0} minutes")]
    InvalidDuration(u64),

    /// Ledger write/read failure.
    #[error("Persistence failure: {0}")]
    Persistence(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Token exchange or profile fetch failure.
    #[error("Authentication failure: {0}")]
    Auth(#[from] OAuthError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// Row addressed by id does not exist.
    #[error("No task with id {0}")]
    TaskNotFound(i64),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Data directory could not be resolved or created
    #[error("Cannot prepare data directory {path}: {message}")]
    DataDir { path: PathBuf, message: String },

    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),
}

/// OAuth and GitHub API errors.
#[derive(Error, Debug)]
pub enum OAuthError {
    /// Browser could not be opened or listener could not bind
    #[error("Authorization failed: {0}")]
    AuthorizationFailed(String),

    /// Token exchange failed
    #[error("Token exchange failed: {0}")]
    TokenExchangeFailed(String),

    /// Callback timeout
    #[error("OAuth callback timeout: no callback received within {timeout_secs} seconds")]
    CallbackTimeout { timeout_secs: u64 },

    /// Invalid callback
    #[error("Invalid OAuth callback: {0}")]
    InvalidCallback(String),

    /// Not authenticated
    #[error("Not authenticated with {service}. Please authenticate first.")]
    NotAuthenticated { service: String },

    /// Credentials not configured
    #[error("OAuth credentials not configured for {service}")]
    CredentialsNotConfigured { service: String },

    /// REST call failed after all attempts
    #[error("{service} API request failed: {message}")]
    ApiFailed { service: String, message: String },
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    /// Invalid date range
    #[error("Invalid date range: {to} is before {from}")]
    InvalidDateRange {
        from: chrono::NaiveDate,
        to: chrono::NaiveDate,
    },
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg) => {
                if e.code == rusqlite::ErrorCode::DatabaseLocked
                    || e.code == rusqlite::ErrorCode::DatabaseBusy
                {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Persistence(err.into())
    }
}

impl From<reqwest::Error> for OAuthError {
    fn from(err: reqwest::Error) -> Self {
        OAuthError::ApiFailed {
            service: "github".into(),
            message: err.to_string(),
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
