use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::storage::TaskId;

/// Which transition policy fires when the countdown reaches zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerMode {
    #[default]
    Manual,
    Pomodoro,
    Automated,
}

impl fmt::Display for TimerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TimerMode::Manual => "manual",
            TimerMode::Pomodoro => "pomodoro",
            TimerMode::Automated => "automated",
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PomodoroPhase {
    #[default]
    Work,
    Break,
}

impl fmt::Display for PomodoroPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PomodoroPhase::Work => "work",
            PomodoroPhase::Break => "break",
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutomatedPhase {
    #[default]
    Work,
    ShortBreak,
    LongBreak,
}

impl fmt::Display for AutomatedPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AutomatedPhase::Work => "work",
            AutomatedPhase::ShortBreak => "short break",
            AutomatedPhase::LongBreak => "long break",
        })
    }
}

/// Difficulty of the automated timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Easy,
    Medium,
    Hard,
}

impl Level {
    /// (work, short break, long break) minutes.
    pub fn minutes(self) -> (u64, u64, u64) {
        match self {
            Level::Easy => (20, 5, 15),
            Level::Medium => (35, 5, 20),
            Level::Hard => (50, 10, 30),
        }
    }
}

impl FromStr for Level {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Level::Easy),
            "medium" => Ok(Level::Medium),
            "hard" => Ok(Level::Hard),
            _ => Err(CoreError::InvalidLevel(s.to_string())),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Level::Easy => "easy",
            Level::Medium => "medium",
            Level::Hard => "hard",
        })
    }
}

pub const CYCLES_PER_ROUND: u32 = 4;

/// Progress through an automated round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomatedConfig {
    pub work_minutes: u64,
    pub short_break_minutes: u64,
    pub long_break_minutes: u64,
    pub cycles_per_round: u32,
    pub current_cycle: u32,
    pub phase: AutomatedPhase,
}

impl AutomatedConfig {
    pub fn for_level(level: Level) -> Self {
        let (work_minutes, short_break_minutes, long_break_minutes) = level.minutes();
        Self {
            work_minutes,
            short_break_minutes,
            long_break_minutes,
            cycles_per_round: CYCLES_PER_ROUND,
            current_cycle: 0,
            phase: AutomatedPhase::Work,
        }
    }
}

/// Phase lengths for the Pomodoro policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PomodoroDurations {
    pub work_minutes: u64,
    pub break_minutes: u64,
    pub long_break_minutes: u64,
    /// Arm `long_break_minutes` after every fourth work phase instead of the
    /// uniform break.
    pub long_break_every_fourth: bool,
}

impl Default for PomodoroDurations {
    fn default() -> Self {
        Self {
            work_minutes: 25,
            break_minutes: 5,
            long_break_minutes: 15,
            long_break_every_fourth: false,
        }
    }
}

/// Everything the engine owns. Serialized as-is under `devcare.state`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerState {
    pub remaining_secs: u64,
    pub paused: bool,
    pub finished: bool,
    pub running: bool,
    pub mode: TimerMode,
    pub pomodoro_phase: PomodoroPhase,
    pub pomodoro_cycle_count: u32,
    #[serde(default)]
    pub automated: Option<AutomatedConfig>,
    #[serde(default)]
    pub active_task_id: Option<TaskId>,
    #[serde(default)]
    pub phase_started_at: Option<DateTime<Utc>>,
}

impl TimerState {
    /// Label of the phase currently counting down.
    pub fn phase_label(&self) -> String {
        match self.mode {
            TimerMode::Manual => "reminder".to_string(),
            TimerMode::Pomodoro => self.pomodoro_phase.to_string(),
            TimerMode::Automated => self
                .automated
                .as_ref()
                .map(|a| a.phase.to_string())
                .unwrap_or_default(),
        }
    }

    /// Checks the flag constraints: `finished => !running`, `paused => running`,
    /// and automated progress present only in automated mode.
    pub fn is_consistent(&self) -> bool {
        !(self.finished && self.running)
            && !(self.paused && !self.running)
            && (self.automated.is_none() || self.mode == TimerMode::Automated)
    }
}
