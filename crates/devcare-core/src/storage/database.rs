//! SQLite-based session ledger.
//!
//! Provides persistent storage for:
//! - Completed work and break sessions
//! - The task list with its pomodoro budgets
//! - Key-value store for timer state and GitHub credentials

use std::path::Path;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};

use super::data_dir;
use super::ledger::{NewSession, SessionLedger, SessionRecord, StateStore, Task, TaskId};
use super::migrations;
use crate::error::{DatabaseError, Result};
use crate::stats::{AverageDurations, DailyCounts, DailyTotals, WeekDay};
use crate::timer::TimerState;

/// kv key holding the serialized [`TimerState`].
pub const STATE_KEY: &str = "devcare.state";

/// SQLite database for sessions, tasks and the kv store.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `~/.config/devcare/devcare.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self> {
        let path = data_dir()?.join("devcare.db");
        Self::open_at(&path)
    }

    /// Open (or create) the database at `path`.
    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::init(conn)
    }

    /// Open an in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(DatabaseError::from)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        migrations::migrate(&conn)
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        let db = Self { conn };
        match db.purge_invalid_tasks() {
            Ok(0) => {}
            Ok(n) => tracing::info!(removed = n, "invalid tasks cleaned up"),
            Err(e) => tracing::warn!(error = %e, "error cleaning up invalid tasks"),
        }
        Ok(db)
    }

    // ── Sessions ─────────────────────────────────────────────────────

    /// All sessions, oldest first.
    pub fn list_sessions(&self) -> Result<Vec<SessionRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, start_time, end_time, duration, type, task_id
                 FROM pomodoro_sessions
                 ORDER BY start_time, id",
            )
            .map_err(DatabaseError::from)?;
        let rows = stmt
            .query_map([], |row| {
                let end_raw: String = row.get(2)?;
                let end_time = if end_raw.is_empty() {
                    None
                } else {
                    Some(parse_instant(2, &end_raw)?)
                };
                let kind_raw: String = row.get(4)?;
                Ok(SessionRecord {
                    id: row.get(0)?,
                    start_time: parse_instant(1, &row.get::<_, String>(1)?)?,
                    end_time,
                    duration_min: row.get(3)?,
                    kind: kind_raw.parse().map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e))
                    })?,
                    task_id: row.get(5)?,
                })
            })
            .map_err(DatabaseError::from)?;
        let sessions = rows
            .collect::<Result<Vec<_>, _>>()
            .map_err(DatabaseError::from)?;
        Ok(sessions)
    }

    /// Replace the whole session table with `sessions` in one transaction.
    pub fn replace_sessions(&self, sessions: &[NewSession]) -> Result<usize> {
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(DatabaseError::from)?;
        tx.execute("DELETE FROM pomodoro_sessions", [])
            .map_err(DatabaseError::from)?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO pomodoro_sessions (start_time, end_time, duration, type, task_id)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )
                .map_err(DatabaseError::from)?;
            for s in sessions {
                stmt.execute(params![
                    format_instant(s.start_time),
                    format_instant(s.end_time),
                    s.duration_min,
                    s.kind.as_str(),
                    s.task_id,
                ])
                .map_err(DatabaseError::from)?;
            }
        }
        tx.commit().map_err(DatabaseError::from)?;
        Ok(sessions.len())
    }

    // ── Statistics ───────────────────────────────────────────────────

    /// Work and break minutes per day.
    pub fn daily_session_times(&self) -> Result<Vec<DailyTotals>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT date(start_time) AS session_date,
                        SUM(CASE WHEN type = 'work' THEN duration ELSE 0 END),
                        SUM(CASE WHEN type = 'break' THEN duration ELSE 0 END)
                 FROM pomodoro_sessions
                 GROUP BY session_date
                 ORDER BY session_date",
            )
            .map_err(DatabaseError::from)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(DailyTotals {
                    date: parse_date(0, &row.get::<_, String>(0)?)?,
                    work_min: row.get(1)?,
                    break_min: row.get(2)?,
                })
            })
            .map_err(DatabaseError::from)?;
        Ok(rows
            .collect::<Result<Vec<_>, _>>()
            .map_err(DatabaseError::from)?)
    }

    /// Average work and break session length; `None` without sessions of that kind.
    pub fn average_session_times(&self) -> Result<AverageDurations> {
        let avg = self
            .conn
            .query_row(
                "SELECT AVG(CASE WHEN type = 'work' THEN duration ELSE NULL END),
                        AVG(CASE WHEN type = 'break' THEN duration ELSE NULL END)
                 FROM pomodoro_sessions",
                [],
                |row| {
                    Ok(AverageDurations {
                        work_min: row.get(0)?,
                        break_min: row.get(1)?,
                    })
                },
            )
            .map_err(DatabaseError::from)?;
        Ok(avg)
    }

    /// Number of work and break sessions per day.
    pub fn session_counts_per_day(&self) -> Result<Vec<DailyCounts>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT date(start_time) AS session_date,
                        COUNT(CASE WHEN type = 'work' THEN 1 ELSE NULL END),
                        COUNT(CASE WHEN type = 'break' THEN 1 ELSE NULL END)
                 FROM pomodoro_sessions
                 GROUP BY session_date
                 ORDER BY session_date",
            )
            .map_err(DatabaseError::from)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(DailyCounts {
                    date: parse_date(0, &row.get::<_, String>(0)?)?,
                    work_sessions: row.get(1)?,
                    break_sessions: row.get(2)?,
                })
            })
            .map_err(DatabaseError::from)?;
        Ok(rows
            .collect::<Result<Vec<_>, _>>()
            .map_err(DatabaseError::from)?)
    }

    /// Per-day totals and counts for the seven days before `today` (inclusive).
    pub fn weekly_session_times(&self, today: NaiveDate) -> Result<Vec<WeekDay>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT date(start_time) AS session_date,
                        SUM(CASE WHEN type = 'work' THEN duration ELSE 0 END),
                        SUM(CASE WHEN type = 'break' THEN duration ELSE 0 END),
                        COUNT(CASE WHEN type = 'work' THEN 1 ELSE NULL END),
                        COUNT(CASE WHEN type = 'break' THEN 1 ELSE NULL END)
                 FROM pomodoro_sessions
                 WHERE date(start_time) >= date(?1, '-7 days')
                   AND date(start_time) <= date(?1)
                 GROUP BY session_date
                 ORDER BY session_date",
            )
            .map_err(DatabaseError::from)?;
        let rows = stmt
            .query_map(params![today.format("%Y-%m-%d").to_string()], |row| {
                Ok(WeekDay {
                    date: parse_date(0, &row.get::<_, String>(0)?)?,
                    work_min: row.get(1)?,
                    break_min: row.get(2)?,
                    work_sessions: row.get(3)?,
                    break_sessions: row.get(4)?,
                })
            })
            .map_err(DatabaseError::from)?;
        Ok(rows
            .collect::<Result<Vec<_>, _>>()
            .map_err(DatabaseError::from)?)
    }

    // ── Key-value store ──────────────────────────────────────────────

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()
            .map_err(DatabaseError::from)?;
        Ok(value)
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
                params![key, value],
            )
            .map_err(DatabaseError::from)?;
        Ok(())
    }

    /// Remove a key from the kv store. Missing keys are fine.
    pub fn kv_delete(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM kv WHERE key = ?1", params![key])
            .map_err(DatabaseError::from)?;
        Ok(())
    }
}

impl SessionLedger for Database {
    fn insert_session(&self, session: &NewSession) -> Result<i64> {
        self.conn
            .execute(
                "INSERT INTO pomodoro_sessions (start_time, end_time, duration, type, task_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    format_instant(session.start_time),
                    format_instant(session.end_time),
                    session.duration_min,
                    session.kind.as_str(),
                    session.task_id,
                ],
            )
            .map_err(DatabaseError::from)?;
        Ok(self.conn.last_insert_rowid())
    }

    fn decrement_task_budget(&self, task_id: TaskId) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE tasks SET pomodoros = pomodoros - 1 WHERE id = ?1",
                params![task_id],
            )
            .map_err(DatabaseError::from)?;
        if changed == 0 {
            return Err(DatabaseError::TaskNotFound(task_id).into());
        }
        Ok(())
    }

    fn get_task(&self, id: TaskId) -> Result<Option<Task>> {
        let task = self
            .conn
            .query_row(
                "SELECT id, name, pomodoros FROM tasks WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Task {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        pomodoro_budget: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(DatabaseError::from)?;
        Ok(task)
    }

    fn list_tasks(&self) -> Result<Vec<Task>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, pomodoros FROM tasks ORDER BY id")
            .map_err(DatabaseError::from)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Task {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    pomodoro_budget: row.get(2)?,
                })
            })
            .map_err(DatabaseError::from)?;
        Ok(rows
            .collect::<Result<Vec<_>, _>>()
            .map_err(DatabaseError::from)?)
    }

    fn add_task(&self, name: &str, pomodoro_budget: i64) -> Result<TaskId> {
        Task::validate(name, pomodoro_budget)?;
        self.conn
            .execute(
                "INSERT INTO tasks (name, pomodoros) VALUES (?1, ?2)",
                params![name.trim(), pomodoro_budget],
            )
            .map_err(DatabaseError::from)?;
        Ok(self.conn.last_insert_rowid())
    }

    fn edit_task(&self, id: TaskId, name: &str, pomodoro_budget: i64) -> Result<()> {
        Task::validate(name, pomodoro_budget)?;
        let changed = self
            .conn
            .execute(
                "UPDATE tasks SET name = ?1, pomodoros = ?2 WHERE id = ?3",
                params![name.trim(), pomodoro_budget, id],
            )
            .map_err(DatabaseError::from)?;
        if changed == 0 {
            return Err(DatabaseError::TaskNotFound(id).into());
        }
        Ok(())
    }

    fn delete_task(&self, id: TaskId) -> Result<()> {
        let changed = self
            .conn
            .execute("DELETE FROM tasks WHERE id = ?1", params![id])
            .map_err(DatabaseError::from)?;
        if changed == 0 {
            return Err(DatabaseError::TaskNotFound(id).into());
        }
        Ok(())
    }

    fn close_dangling_sessions(&self, end: DateTime<Utc>) -> Result<usize> {
        let changed = self
            .conn
            .execute(
                "UPDATE pomodoro_sessions SET end_time = ?1 WHERE end_time = ''",
                params![format_instant(end)],
            )
            .map_err(DatabaseError::from)?;
        Ok(changed)
    }

    fn purge_invalid_tasks(&self) -> Result<usize> {
        let removed = self
            .conn
            .execute("DELETE FROM tasks WHERE pomodoros < 1", [])
            .map_err(DatabaseError::from)?;
        Ok(removed)
    }
}

impl StateStore for Database {
    fn load_state(&self) -> Result<Option<TimerState>> {
        match self.kv_get(STATE_KEY)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn save_state(&self, state: &TimerState) -> Result<()> {
        let json = serde_json::to_string(state)?;
        self.kv_set(STATE_KEY, &json)
    }
}

fn format_instant(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, false)
}

fn parse_instant(col: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(col, Type::Text, Box::new(e)))
}

fn parse_date(col: usize, raw: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(col, Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SessionKind;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, h, m, 0).unwrap()
    }

    #[test]
    fn insert_and_list_sessions() {
        let db = Database::open_in_memory().unwrap();
        db.insert_session(&NewSession {
            start_time: at(9, 0),
            end_time: at(9, 25),
            duration_min: 25,
            kind: SessionKind::Work,
            task_id: Some(7),
        })
        .unwrap();

        let sessions = db.list_sessions().unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].start_time, at(9, 0));
        assert_eq!(sessions[0].end_time, Some(at(9, 25)));
        assert_eq!(sessions[0].kind, SessionKind::Work);
        assert_eq!(sessions[0].task_id, Some(7));
    }

    #[test]
    fn task_crud() {
        let db = Database::open_in_memory().unwrap();
        let id = db.add_task("  Refactor parser ", 4).unwrap();
        assert_eq!(db.get_task(id).unwrap().unwrap().name, "Refactor parser");

        db.edit_task(id, "Refactor lexer", 2).unwrap();
        let task = db.get_task(id).unwrap().unwrap();
        assert_eq!(task.name, "Refactor lexer");
        assert_eq!(task.pomodoro_budget, 2);

        db.delete_task(id).unwrap();
        assert!(db.get_task(id).unwrap().is_none());
        assert!(db.delete_task(id).is_err());
    }

    #[test]
    fn add_task_rejects_zero_budget() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.add_task("Nothing", 0).is_err());
        assert!(db.list_tasks().unwrap().is_empty());
    }

    #[test]
    fn decrement_has_no_floor_and_purge_removes_exhausted() {
        let db = Database::open_in_memory().unwrap();
        let id = db.add_task("Short", 1).unwrap();
        db.decrement_task_budget(id).unwrap();
        db.decrement_task_budget(id).unwrap();
        assert_eq!(db.get_task(id).unwrap().unwrap().pomodoro_budget, -1);

        assert_eq!(db.purge_invalid_tasks().unwrap(), 1);
        assert!(db.list_tasks().unwrap().is_empty());
    }

    #[test]
    fn decrement_unknown_task_fails() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.decrement_task_budget(42).is_err());
    }

    #[test]
    fn close_dangling_sessions_only_touches_open_rows() {
        let db = Database::open_in_memory().unwrap();
        db.insert_session(&NewSession {
            start_time: at(9, 0),
            end_time: at(9, 25),
            duration_min: 25,
            kind: SessionKind::Work,
            task_id: None,
        })
        .unwrap();
        db.conn()
            .execute(
                "INSERT INTO pomodoro_sessions (start_time, end_time, duration, type)
                 VALUES ('2024-06-03T10:00:00+00:00', '', 25, 'work')",
                [],
            )
            .unwrap();

        assert_eq!(db.close_dangling_sessions(at(10, 20)).unwrap(), 1);
        let sessions = db.list_sessions().unwrap();
        assert_eq!(sessions[0].end_time, Some(at(9, 25)));
        assert_eq!(sessions[1].end_time, Some(at(10, 20)));
        assert_eq!(db.close_dangling_sessions(at(11, 0)).unwrap(), 0);
    }

    #[test]
    fn kv_store() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.kv_get("test").unwrap().is_none());
        db.kv_set("test", "hello").unwrap();
        assert_eq!(db.kv_get("test").unwrap().unwrap(), "hello");
        db.kv_delete("test").unwrap();
        assert!(db.kv_get("test").unwrap().is_none());
    }

    #[test]
    fn state_round_trips_through_kv() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.load_state().unwrap().is_none());

        let state = TimerState {
            remaining_secs: 90,
            running: true,
            paused: true,
            ..Default::default()
        };
        db.save_state(&state).unwrap();
        assert_eq!(db.load_state().unwrap(), Some(state));
    }
}
