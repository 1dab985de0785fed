//! # DevCare Core Library
//!
//! Core logic for DevCare, a developer wellbeing timer: a manual break
//! reminder, a Pomodoro cycle tied to a task list, and a leveled automated
//! work/break round. The `devcare` CLI is a thin layer over this crate.
//!
//! ## Architecture
//!
//! - **Timer Engine**: an owned state machine advanced once per second by an
//!   injected tick driver; every command returns the events it produced
//! - **Storage**: SQLite session ledger, task list and kv store, plus
//!   TOML-based configuration
//! - **Stats**: daily totals, averages and the weekly productivity rating
//! - **Integrations**: GitHub OAuth and profile fetch
//!
//! ## Key Components
//!
//! - [`TimerEngine`]: Core timer state machine
//! - [`Database`]: Session ledger and kv persistence
//! - [`Config`]: Application configuration management
//! - [`GitHubClient`]: Profile and recent activity

pub mod demo;
pub mod error;
pub mod events;
pub mod integrations;
pub mod stats;
pub mod storage;
pub mod timer;

pub use error::{ConfigError, CoreError, DatabaseError, OAuthError, ValidationError};
pub use events::{AdvisoryLevel, Event};
pub use integrations::{GitHubClient, GitHubProfile, GitHubUser};
pub use stats::{rate_week, WeeklyRating};
pub use storage::{
    Config, Database, NewSession, SessionKind, SessionLedger, SessionRecord, StateStore, Task,
    TaskId,
};
pub use timer::{
    IntervalDriver, Level, ManualDriver, PomodoroDurations, TickDriver, TimerEngine, TimerMode,
    TimerState,
};
