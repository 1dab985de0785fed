//! Session ledger and configuration-store seams.
//!
//! The timer engine only talks to storage through [`SessionLedger`] and
//! [`StateStore`]. [`Database`](super::Database) implements both on SQLite;
//! tests substitute in-memory fakes.

use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ValidationError};
use crate::timer::TimerState;

pub type TaskId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    Work,
    Break,
}

impl SessionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionKind::Work => "work",
            SessionKind::Break => "break",
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "work" => Ok(SessionKind::Work),
            "break" => Ok(SessionKind::Break),
            other => Err(ValidationError::InvalidValue {
                field: "type".into(),
                message: format!("unknown session type '{other}'"),
            }),
        }
    }
}

/// A completed phase about to be written to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSession {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_min: u64,
    pub kind: SessionKind,
    #[serde(default)]
    pub task_id: Option<TaskId>,
}

/// A row of `pomodoro_sessions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: i64,
    pub start_time: DateTime<Utc>,
    /// `None` for dangling rows whose end was never written.
    pub end_time: Option<DateTime<Utc>>,
    pub duration_min: u64,
    pub kind: SessionKind,
    pub task_id: Option<TaskId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    /// Pomodoros left. At least 1 when created or edited; completed work
    /// phases may drive it to zero or below.
    pub pomodoro_budget: i64,
}

impl Task {
    /// Validate user input for a new or edited task.
    pub fn validate(name: &str, pomodoro_budget: i64) -> Result<(), ValidationError> {
        if name.trim().is_empty() {
            return Err(ValidationError::InvalidValue {
                field: "name".into(),
                message: "task name must not be empty".into(),
            });
        }
        if pomodoro_budget < 1 {
            return Err(ValidationError::InvalidValue {
                field: "pomodoros".into(),
                message: format!("pomodoro budget must be at least 1, got {pomodoro_budget}"),
            });
        }
        Ok(())
    }

    /// Tasks whose budget dropped below one are purged.
    pub fn is_exhausted(&self) -> bool {
        self.pomodoro_budget < 1
    }
}

/// Persistent record of sessions and tasks.
pub trait SessionLedger {
    fn insert_session(&self, session: &NewSession) -> Result<i64>;

    /// Subtract one from the task's budget. No floor is applied.
    fn decrement_task_budget(&self, task_id: TaskId) -> Result<()>;

    fn get_task(&self, id: TaskId) -> Result<Option<Task>>;

    fn list_tasks(&self) -> Result<Vec<Task>>;

    fn add_task(&self, name: &str, pomodoro_budget: i64) -> Result<TaskId>;

    fn edit_task(&self, id: TaskId, name: &str, pomodoro_budget: i64) -> Result<()>;

    fn delete_task(&self, id: TaskId) -> Result<()>;

    /// Give every session without an end time the end `end`.
    /// Returns the number of rows closed.
    fn close_dangling_sessions(&self, end: DateTime<Utc>) -> Result<usize>;

    /// Delete tasks with a budget below one. Returns the number removed.
    fn purge_invalid_tasks(&self) -> Result<usize>;
}

/// Global key-value store holding the engine state between runs.
pub trait StateStore {
    fn load_state(&self) -> Result<Option<TimerState>>;

    fn save_state(&self, state: &TimerState) -> Result<()>;
}

impl<T: SessionLedger + ?Sized> SessionLedger for Rc<T> {
    fn insert_session(&self, session: &NewSession) -> Result<i64> {
        (**self).insert_session(session)
    }

    fn decrement_task_budget(&self, task_id: TaskId) -> Result<()> {
        (**self).decrement_task_budget(task_id)
    }

    fn get_task(&self, id: TaskId) -> Result<Option<Task>> {
        (**self).get_task(id)
    }

    fn list_tasks(&self) -> Result<Vec<Task>> {
        (**self).list_tasks()
    }

    fn add_task(&self, name: &str, pomodoro_budget: i64) -> Result<TaskId> {
        (**self).add_task(name, pomodoro_budget)
    }

    fn edit_task(&self, id: TaskId, name: &str, pomodoro_budget: i64) -> Result<()> {
        (**self).edit_task(id, name, pomodoro_budget)
    }

    fn delete_task(&self, id: TaskId) -> Result<()> {
        (**self).delete_task(id)
    }

    fn close_dangling_sessions(&self, end: DateTime<Utc>) -> Result<usize> {
        (**self).close_dangling_sessions(end)
    }

    fn purge_invalid_tasks(&self) -> Result<usize> {
        (**self).purge_invalid_tasks()
    }
}

impl<T: StateStore + ?Sized> StateStore for Rc<T> {
    fn load_state(&self) -> Result<Option<TimerState>> {
        (**self).load_state()
    }

    fn save_state(&self, state: &TimerState) -> Result<()> {
        (**self).save_state(state)
    }
}
