//! Countdown engine, its state and the tick drivers.

mod driver;
mod engine;
mod state;

pub use driver::{IntervalDriver, ManualDriver, Tick, TickDriver};
pub use engine::{TimerEngine, DEFAULT_CHECKPOINT_EVERY_TICKS};
pub use state::{
    AutomatedConfig, AutomatedPhase, Level, PomodoroDurations, PomodoroPhase, TimerMode,
    TimerState, CYCLES_PER_ROUND,
};
