use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::{SessionKind, TaskId};
use crate::timer::{TimerMode, TimerState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdvisoryLevel {
    Info,
    Warning,
    Error,
}

/// Every engine state change produces one or more events.
/// The presentation layer renders them; nothing else consumes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    TimerStarted {
        mode: TimerMode,
        phase: String,
        duration_secs: u64,
        at: DateTime<Utc>,
    },
    TimerPaused {
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    TimerResumed {
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    TimerStopped {
        at: DateTime<Utc>,
    },
    /// One second elapsed.
    TimeUpdated {
        remaining_secs: u64,
    },
    /// A manual reminder ran out.
    TimeUp {
        at: DateTime<Utc>,
    },
    /// A Pomodoro or automated countdown moved to its next phase.
    PhaseChanged {
        mode: TimerMode,
        phase: String,
        duration_secs: u64,
        at: DateTime<Utc>,
    },
    /// An automated round ended after its long break.
    RoundCompleted {
        at: DateTime<Utc>,
    },
    SessionRecorded {
        kind: SessionKind,
        duration_min: u64,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        task_id: Option<TaskId>,
    },
    /// Human-readable message for the user.
    Advisory {
        level: AdvisoryLevel,
        message: String,
    },
    StateSnapshot {
        state: TimerState,
        #[serde(default)]
        github_user: Option<String>,
        at: DateTime<Utc>,
    },
}

impl Event {
    pub fn info(message: impl Into<String>) -> Self {
        Event::Advisory {
            level: AdvisoryLevel::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Event::Advisory {
            level: AdvisoryLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Event::Advisory {
            level: AdvisoryLevel::Error,
            message: message.into(),
        }
    }

    /// Advisory text, if this is an advisory.
    pub fn message(&self) -> Option<&str> {
        match self {
            Event::Advisory { message, .. } => Some(message),
            _ => None,
        }
    }
}
