//! Timer engine implementation.
//!
//! The engine owns the single countdown and the three transition policies
//! (manual reminder, Pomodoro, automated round). It does not own a clock:
//! the [`TickDriver`] it was given produces ticks, and the loop that owns
//! the engine calls [`TimerEngine::tick`] for each of them.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Running -> (Paused <-> Running) -> Finished | Idle
//! ```
//!
//! Every command returns the events it produced; nothing is pushed to the
//! presentation layer directly.
//!
//! ## Usage
//!
//! ```ignore
//! let mut engine = TimerEngine::new(ledger, store, driver, durations);
//! engine.start_manual(20)?;
//! // For each tick from the driver:
//! for event in engine.tick() { render(event) }
//! ```

use chrono::{DateTime, Duration, Utc};

use super::driver::TickDriver;
use super::state::{
    AutomatedConfig, AutomatedPhase, Level, PomodoroDurations, PomodoroPhase, TimerMode,
    TimerState,
};
use crate::error::{CoreError, Result};
use crate::events::Event;
use crate::storage::{NewSession, SessionKind, SessionLedger, StateStore, TaskId};

/// Ticks between checkpoints of a running countdown.
pub const DEFAULT_CHECKPOINT_EVERY_TICKS: u32 = 10;

/// Core timer engine.
///
/// `L` records completed sessions, `S` keeps the state across restarts and
/// `D` produces the once-per-second tick.
pub struct TimerEngine<L, S, D> {
    state: TimerState,
    durations: PomodoroDurations,
    ledger: L,
    store: S,
    driver: D,
    checkpoint_every: u32,
    ticks_since_checkpoint: u32,
}

impl<L, S, D> TimerEngine<L, S, D>
where
    L: SessionLedger,
    S: StateStore,
    D: TickDriver,
{
    /// Create an idle engine.
    pub fn new(ledger: L, store: S, driver: D, durations: PomodoroDurations) -> Self {
        Self {
            state: TimerState::default(),
            durations,
            ledger,
            store,
            driver,
            checkpoint_every: DEFAULT_CHECKPOINT_EVERY_TICKS,
            ticks_since_checkpoint: 0,
        }
    }

    /// Create an engine from the state saved in `store`.
    ///
    /// A running timer is re-armed right away. Unreadable or inconsistent
    /// state is discarded and the engine starts idle.
    pub fn restore(ledger: L, store: S, driver: D, durations: PomodoroDurations) -> Self {
        let mut engine = Self::new(ledger, store, driver, durations);
        match engine.store.load_state() {
            Ok(Some(state)) if state.is_consistent() => {
                tracing::debug!(
                    mode = %state.mode,
                    remaining_secs = state.remaining_secs,
                    running = state.running,
                    "restored timer state"
                );
                engine.state = state;
                if engine.state.running {
                    engine.driver.rearm();
                }
            }
            Ok(Some(_)) => {
                tracing::warn!("discarding inconsistent saved timer state");
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "failed to load saved timer state");
            }
        }
        engine
    }

    /// Persist the running countdown every `ticks` ticks; 0 disables
    /// checkpoints so only transitions are persisted.
    pub fn with_checkpoint_every(mut self, ticks: u32) -> Self {
        self.checkpoint_every = ticks;
        self
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> &TimerState {
        &self.state
    }

    pub fn durations(&self) -> PomodoroDurations {
        self.durations
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Build a full state snapshot event.
    pub fn snapshot(&self, github_user: Option<String>) -> Event {
        Event::StateSnapshot {
            state: self.state.clone(),
            github_user,
            at: Utc::now(),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start (or re-arm) a manual reminder of `minutes`.
    ///
    /// # Errors
    /// `InvalidDuration` for zero minutes or a length whose seconds overflow,
    /// `TimerBusy` while a Pomodoro or automated timer runs.
    pub fn start_manual(&mut self, minutes: u64) -> Result<Vec<Event>> {
        let remaining_secs = phase_secs(minutes)?;
        self.ensure_replaceable()?;

        let was_paused = self.state.paused;
        let now = Utc::now();
        self.state = TimerState {
            remaining_secs,
            running: true,
            mode: TimerMode::Manual,
            phase_started_at: Some(now),
            ..TimerState::default()
        };
        self.driver.rearm();

        let mut events = vec![self.started_event(now)];
        events.push(Event::info(if was_paused {
            "Timer resumed!"
        } else {
            "Timer started!"
        }));
        self.persist(&mut events);
        tracing::info!(minutes, "manual reminder started");
        Ok(events)
    }

    /// Start a Pomodoro cycle for `task_id`.
    ///
    /// # Errors
    /// `InvalidTask` when no task is given or it does not exist, `TimerBusy`
    /// while any timer runs. The state is left untouched on error.
    pub fn start_pomodoro(&mut self, task_id: Option<TaskId>) -> Result<Vec<Event>> {
        let task_id = task_id.ok_or(CoreError::InvalidTask)?;
        if self.state.running {
            return Err(CoreError::TimerBusy {
                mode: self.state.mode,
            });
        }
        let work_secs = phase_secs(self.durations.work_minutes)?;
        phase_secs(self.durations.break_minutes)?;
        if self.durations.long_break_every_fourth {
            phase_secs(self.durations.long_break_minutes)?;
        }
        let task = self
            .ledger
            .get_task(task_id)?
            .ok_or(CoreError::InvalidTask)?;

        let now = Utc::now();
        self.state = TimerState {
            remaining_secs: work_secs,
            running: true,
            mode: TimerMode::Pomodoro,
            pomodoro_phase: PomodoroPhase::Work,
            pomodoro_cycle_count: 0,
            active_task_id: Some(task_id),
            phase_started_at: Some(now),
            ..TimerState::default()
        };
        self.driver.rearm();

        let mut events = vec![
            self.started_event(now),
            Event::info(format!(
                "Pomodoro started on '{}'. Work for {} minutes!",
                task.name, self.durations.work_minutes
            )),
        ];
        self.persist(&mut events);
        tracing::info!(task_id, "pomodoro started");
        Ok(events)
    }

    /// Start an automated round at `level`.
    ///
    /// # Errors
    /// `TimerBusy` while a Pomodoro or automated timer runs.
    pub fn start_automated(&mut self, level: Level) -> Result<Vec<Event>> {
        self.ensure_replaceable()?;

        let config = AutomatedConfig::for_level(level);
        let now = Utc::now();
        self.state = TimerState {
            remaining_secs: config.work_minutes.saturating_mul(60),
            running: true,
            mode: TimerMode::Automated,
            automated: Some(config),
            phase_started_at: Some(now),
            ..TimerState::default()
        };
        self.driver.rearm();

        let mut events = vec![
            self.started_event(now),
            Event::info(format!("Automated timer started ({level} level).")),
        ];
        self.persist(&mut events);
        tracing::info!(%level, "automated timer started");
        Ok(events)
    }

    /// Freeze the countdown. The driver keeps ticking; ticks are ignored.
    ///
    /// # Errors
    /// `NotRunning` when nothing is counting down.
    pub fn pause(&mut self) -> Result<Vec<Event>> {
        if !self.state.running {
            return Err(CoreError::NotRunning);
        }
        if self.state.paused {
            return Ok(Vec::new());
        }
        self.state.paused = true;
        let mut events = vec![
            Event::TimerPaused {
                remaining_secs: self.state.remaining_secs,
                at: Utc::now(),
            },
            Event::info("Timer paused!"),
        ];
        self.persist(&mut events);
        Ok(events)
    }

    /// Continue from the retained remaining time.
    ///
    /// # Errors
    /// `NotPaused` unless the timer is paused.
    pub fn resume(&mut self) -> Result<Vec<Event>> {
        if !self.state.paused {
            return Err(CoreError::NotPaused);
        }
        self.state.paused = false;
        let mut events = vec![
            Event::TimerResumed {
                remaining_secs: self.state.remaining_secs,
                at: Utc::now(),
            },
            Event::info("Timer resumed!"),
        ];
        self.persist(&mut events);
        Ok(events)
    }

    /// Cancel the driver and reset every field. A no-op on an idle engine.
    pub fn stop(&mut self) -> Vec<Event> {
        let was_idle = self.state == TimerState::default() && !self.driver.is_armed();
        self.driver.cancel();
        if was_idle {
            return Vec::new();
        }

        self.state = TimerState::default();
        let mut events = vec![
            Event::TimerStopped { at: Utc::now() },
            Event::info("The previous timer was stopped."),
        ];
        self.persist(&mut events);
        tracing::info!("timer stopped");
        events
    }

    /// Close sessions left without an end time, then stop.
    pub fn end_pomodoro(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        match self.ledger.close_dangling_sessions(Utc::now()) {
            Ok(0) => {}
            Ok(closed) => tracing::info!(closed, "closed dangling sessions"),
            Err(e) => {
                tracing::warn!(error = %e, "failed to close dangling sessions");
                events.push(Event::warning(format!(
                    "Could not close open sessions: {e}"
                )));
            }
        }
        events.extend(self.stop());
        events.push(Event::info("Pomodoro session ended."));
        events
    }

    /// Advance the countdown by one second.
    pub fn tick(&mut self) -> Vec<Event> {
        if !self.state.running || self.state.paused {
            return Vec::new();
        }
        if self.state.remaining_secs == 0 {
            return self.fire_transition();
        }

        self.state.remaining_secs -= 1;
        let mut events = vec![Event::TimeUpdated {
            remaining_secs: self.state.remaining_secs,
        }];
        if self.state.remaining_secs == 0 {
            events.extend(self.fire_transition());
        } else {
            self.checkpoint();
        }
        events
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// A running manual reminder may be replaced; other modes may not.
    fn ensure_replaceable(&self) -> Result<()> {
        if self.state.running && self.state.mode != TimerMode::Manual {
            return Err(CoreError::TimerBusy {
                mode: self.state.mode,
            });
        }
        Ok(())
    }

    fn started_event(&self, at: DateTime<Utc>) -> Event {
        Event::TimerStarted {
            mode: self.state.mode,
            phase: self.state.phase_label(),
            duration_secs: self.state.remaining_secs,
            at,
        }
    }

    fn phase_changed_event(&self, at: DateTime<Utc>) -> Event {
        Event::PhaseChanged {
            mode: self.state.mode,
            phase: self.state.phase_label(),
            duration_secs: self.state.remaining_secs,
            at,
        }
    }

    fn fire_transition(&mut self) -> Vec<Event> {
        let now = Utc::now();
        let mut events = match self.state.mode {
            TimerMode::Manual => self.finish_manual(now),
            TimerMode::Pomodoro => self.advance_pomodoro(now),
            TimerMode::Automated => self.advance_automated(now),
        };
        self.persist(&mut events);
        events
    }

    fn finish_manual(&mut self, now: DateTime<Utc>) -> Vec<Event> {
        self.finish();
        tracing::info!("manual reminder finished");
        vec![
            Event::TimeUp { at: now },
            Event::info("Time for a break! Move a bit!"),
        ]
    }

    fn advance_pomodoro(&mut self, now: DateTime<Utc>) -> Vec<Event> {
        let mut events = Vec::new();
        match self.state.pomodoro_phase {
            PomodoroPhase::Work => {
                self.record_session(SessionKind::Work, self.durations.work_minutes, now, &mut events);
                if let Some(task_id) = self.state.active_task_id {
                    if let Err(e) = self.ledger.decrement_task_budget(task_id) {
                        tracing::warn!(task_id, error = %e, "failed to decrement task budget");
                        events.push(Event::warning(format!(
                            "Could not update the task's pomodoro count: {e}"
                        )));
                    }
                }

                self.state.pomodoro_cycle_count = (self.state.pomodoro_cycle_count + 1) % 4;
                let message = if self.state.pomodoro_cycle_count == 0 {
                    "Great work! Take a long break!"
                } else {
                    "Work period finished! Time for a short break!"
                };
                self.state.pomodoro_phase = PomodoroPhase::Break;
                self.enter_phase(self.current_break_minutes(), now);
                events.push(self.phase_changed_event(now));
                events.push(Event::info(message));
            }
            PomodoroPhase::Break => {
                self.record_session(SessionKind::Break, self.current_break_minutes(), now, &mut events);
                self.state.pomodoro_phase = PomodoroPhase::Work;
                self.enter_phase(self.durations.work_minutes, now);
                events.push(self.phase_changed_event(now));
                events.push(Event::info("Break finished! Time to get back to work!"));
            }
        }
        events
    }

    /// Length of the break that follows the work phase just counted.
    /// The cycle counter sits at 0 right after every fourth work phase.
    fn current_break_minutes(&self) -> u64 {
        if self.durations.long_break_every_fourth && self.state.pomodoro_cycle_count == 0 {
            self.durations.long_break_minutes
        } else {
            self.durations.break_minutes
        }
    }

    fn advance_automated(&mut self, now: DateTime<Utc>) -> Vec<Event> {
        let Some(mut config) = self.state.automated.take() else {
            tracing::warn!("automated timer without progress; stopping");
            self.finish();
            return vec![Event::error("Automated timer lost its configuration.")];
        };

        let (next_minutes, message) = match config.phase {
            AutomatedPhase::Work => {
                config.phase = AutomatedPhase::ShortBreak;
                (
                    config.short_break_minutes,
                    format!(
                        "Work period finished! Take a {}-minute short break.",
                        config.short_break_minutes
                    ),
                )
            }
            AutomatedPhase::ShortBreak => {
                config.current_cycle += 1;
                if config.current_cycle < config.cycles_per_round {
                    config.phase = AutomatedPhase::Work;
                    (
                        config.work_minutes,
                        format!(
                            "Break over! Work cycle {} of {} begins.",
                            config.current_cycle + 1,
                            config.cycles_per_round
                        ),
                    )
                } else {
                    config.phase = AutomatedPhase::LongBreak;
                    (
                        config.long_break_minutes,
                        format!(
                            "Round finished! Enjoy a {}-minute long break.",
                            config.long_break_minutes
                        ),
                    )
                }
            }
            AutomatedPhase::LongBreak => {
                self.state.automated = Some(config);
                self.finish();
                tracing::info!("automated round complete");
                return vec![
                    Event::RoundCompleted { at: now },
                    Event::info("Automated round complete! Start a new one when you are ready."),
                ];
            }
        };

        self.state.automated = Some(config);
        self.enter_phase(next_minutes, now);
        vec![self.phase_changed_event(now), Event::info(message)]
    }

    fn enter_phase(&mut self, minutes: u64, now: DateTime<Utc>) {
        self.state.remaining_secs = minutes.saturating_mul(60);
        self.state.phase_started_at = Some(now);
        self.driver.rearm();
    }

    fn finish(&mut self) {
        self.state.remaining_secs = 0;
        self.state.running = false;
        self.state.paused = false;
        self.state.finished = true;
        self.driver.cancel();
    }

    /// Fire-and-forget ledger write; failures become a warning advisory.
    fn record_session(
        &self,
        kind: SessionKind,
        duration_min: u64,
        now: DateTime<Utc>,
        events: &mut Vec<Event>,
    ) {
        let start_time = self
            .state
            .phase_started_at
            .unwrap_or_else(|| now - Duration::minutes(duration_min as i64));
        let session = NewSession {
            start_time,
            end_time: now,
            duration_min,
            kind,
            task_id: self.state.active_task_id,
        };
        match self.ledger.insert_session(&session) {
            Ok(id) => {
                tracing::debug!(id, %kind, duration_min, "session recorded");
                events.push(Event::SessionRecorded {
                    kind,
                    duration_min,
                    started_at: session.start_time,
                    ended_at: session.end_time,
                    task_id: session.task_id,
                });
            }
            Err(e) => {
                tracing::warn!(%kind, error = %e, "failed to record session");
                events.push(Event::warning(format!(
                    "Could not record the {kind} session: {e}"
                )));
            }
        }
    }

    fn persist(&mut self, events: &mut Vec<Event>) {
        self.ticks_since_checkpoint = 0;
        if let Err(e) = self.store.save_state(&self.state) {
            tracing::warn!(error = %e, "failed to persist timer state");
            events.push(Event::warning(format!("Could not save timer state: {e}")));
        }
    }

    fn checkpoint(&mut self) {
        if self.checkpoint_every == 0 {
            return;
        }
        self.ticks_since_checkpoint += 1;
        if self.ticks_since_checkpoint >= self.checkpoint_every {
            self.ticks_since_checkpoint = 0;
            if let Err(e) = self.store.save_state(&self.state) {
                tracing::warn!(error = %e, "failed to checkpoint timer state");
            }
        }
    }
}

/// Seconds in a phase of `minutes`. Zero and overflowing lengths are rejected.
fn phase_secs(minutes: u64) -> Result<u64> {
    match minutes.checked_mul(60) {
        Some(secs) if secs > 0 => Ok(secs),
        _ => Err(CoreError::InvalidDuration(minutes)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DatabaseError;
    use crate::storage::Task;
    use crate::timer::driver::ManualDriver;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    #[derive(Default)]
    struct FakeLedger {
        sessions: RefCell<Vec<NewSession>>,
        tasks: RefCell<Vec<Task>>,
        fail_writes: Cell<bool>,
        dangling: Cell<usize>,
    }

    impl FakeLedger {
        fn budget(&self, id: TaskId) -> i64 {
            self.tasks
                .borrow()
                .iter()
                .find(|t| t.id == id)
                .map(|t| t.pomodoro_budget)
                .unwrap()
        }

        fn locked() -> CoreError {
            CoreError::Persistence(DatabaseError::Locked)
        }
    }

    impl SessionLedger for FakeLedger {
        fn insert_session(&self, session: &NewSession) -> Result<i64> {
            if self.fail_writes.get() {
                return Err(Self::locked());
            }
            let mut sessions = self.sessions.borrow_mut();
            sessions.push(session.clone());
            Ok(sessions.len() as i64)
        }

        fn decrement_task_budget(&self, task_id: TaskId) -> Result<()> {
            if self.fail_writes.get() {
                return Err(Self::locked());
            }
            let mut tasks = self.tasks.borrow_mut();
            let task = tasks
                .iter_mut()
                .find(|t| t.id == task_id)
                .ok_or(DatabaseError::TaskNotFound(task_id))?;
            task.pomodoro_budget -= 1;
            Ok(())
        }

        fn get_task(&self, id: TaskId) -> Result<Option<Task>> {
            Ok(self.tasks.borrow().iter().find(|t| t.id == id).cloned())
        }

        fn list_tasks(&self) -> Result<Vec<Task>> {
            Ok(self.tasks.borrow().clone())
        }

        fn add_task(&self, name: &str, pomodoro_budget: i64) -> Result<TaskId> {
            let mut tasks = self.tasks.borrow_mut();
            let id = tasks.len() as TaskId + 1;
            tasks.push(Task {
                id,
                name: name.to_string(),
                pomodoro_budget,
            });
            Ok(id)
        }

        fn edit_task(&self, id: TaskId, name: &str, pomodoro_budget: i64) -> Result<()> {
            let mut tasks = self.tasks.borrow_mut();
            let task = tasks
                .iter_mut()
                .find(|t| t.id == id)
                .ok_or(DatabaseError::TaskNotFound(id))?;
            task.name = name.to_string();
            task.pomodoro_budget = pomodoro_budget;
            Ok(())
        }

        fn delete_task(&self, id: TaskId) -> Result<()> {
            self.tasks.borrow_mut().retain(|t| t.id != id);
            Ok(())
        }

        fn close_dangling_sessions(&self, _end: DateTime<Utc>) -> Result<usize> {
            Ok(self.dangling.replace(0))
        }

        fn purge_invalid_tasks(&self) -> Result<usize> {
            let mut tasks = self.tasks.borrow_mut();
            let before = tasks.len();
            tasks.retain(|t| !t.is_exhausted());
            Ok(before - tasks.len())
        }
    }

    #[derive(Default)]
    struct FakeStore {
        saved: RefCell<Option<TimerState>>,
        saves: Cell<usize>,
    }

    impl StateStore for FakeStore {
        fn load_state(&self) -> Result<Option<TimerState>> {
            Ok(self.saved.borrow().clone())
        }

        fn save_state(&self, state: &TimerState) -> Result<()> {
            *self.saved.borrow_mut() = Some(state.clone());
            self.saves.set(self.saves.get() + 1);
            Ok(())
        }
    }

    type TestEngine = TimerEngine<Rc<FakeLedger>, Rc<FakeStore>, ManualDriver>;

    fn engine_with(durations: PomodoroDurations) -> (TestEngine, Rc<FakeLedger>, Rc<FakeStore>) {
        let ledger = Rc::new(FakeLedger::default());
        let store = Rc::new(FakeStore::default());
        let engine = TimerEngine::new(
            Rc::clone(&ledger),
            Rc::clone(&store),
            ManualDriver::new(),
            durations,
        );
        (engine, ledger, store)
    }

    fn engine() -> (TestEngine, Rc<FakeLedger>, Rc<FakeStore>) {
        engine_with(PomodoroDurations::default())
    }

    fn short_durations() -> PomodoroDurations {
        PomodoroDurations {
            work_minutes: 1,
            break_minutes: 1,
            long_break_minutes: 3,
            long_break_every_fourth: false,
        }
    }

    fn run(engine: &mut TestEngine, ticks: u64) -> Vec<Event> {
        (0..ticks).flat_map(|_| engine.tick()).collect()
    }

    fn count(events: &[Event], pred: impl Fn(&Event) -> bool) -> usize {
        events.iter().filter(|e| pred(e)).count()
    }

    fn has_message(events: &[Event], text: &str) -> bool {
        events.iter().any(|e| e.message() == Some(text))
    }

    // ── Manual ───────────────────────────────────────────────────────

    #[test]
    fn manual_finishes_after_m_times_60_ticks() {
        for m in [1u64, 2, 5] {
            let (mut e, ledger, _) = engine();
            e.start_manual(m).unwrap();

            let events = run(&mut e, m * 60 - 1);
            assert!(e.state().running);
            assert_eq!(e.state().remaining_secs, 1);
            assert_eq!(count(&events, |ev| matches!(ev, Event::TimeUp { .. })), 0);

            let events = e.tick();
            assert!(e.state().finished);
            assert!(!e.state().running);
            assert!(!e.driver().is_armed());
            assert_eq!(count(&events, |ev| matches!(ev, Event::TimeUp { .. })), 1);
            assert!(has_message(&events, "Time for a break! Move a bit!"));
            assert!(ledger.sessions.borrow().is_empty());

            assert!(run(&mut e, 10).is_empty());
            assert!(e.state().is_consistent());
        }
    }

    #[test]
    fn manual_rejects_zero_minutes() {
        let (mut e, _, _) = engine();
        assert!(matches!(
            e.start_manual(0),
            Err(CoreError::InvalidDuration(0))
        ));
        assert_eq!(e.state(), &TimerState::default());
    }

    #[test]
    fn manual_rejects_overflowing_minutes() {
        let (mut e, _, store) = engine();
        assert!(matches!(
            e.start_manual(u64::MAX),
            Err(CoreError::InvalidDuration(u64::MAX))
        ));
        assert_eq!(e.state(), &TimerState::default());
        assert!(!e.driver().is_armed());
        assert_eq!(store.saves.get(), 0);

        e.start_manual(3).unwrap();
        let running = e.state().clone();
        assert!(e.start_manual(u64::MAX / 60 + 1).is_err());
        assert_eq!(e.state(), &running);
        assert_eq!(e.driver().rearms(), 1);
    }

    #[test]
    fn manual_start_after_pause_reports_resume() {
        let (mut e, _, _) = engine();
        let first = e.start_manual(5).unwrap();
        assert!(has_message(&first, "Timer started!"));

        e.pause().unwrap();
        let second = e.start_manual(5).unwrap();
        assert!(has_message(&second, "Timer resumed!"));
        assert!(!e.state().paused);
    }

    #[test]
    fn running_manual_can_be_replaced() {
        let (mut e, _, _) = engine();
        e.start_manual(5).unwrap();
        run(&mut e, 10);
        e.start_manual(2).unwrap();
        assert_eq!(e.state().remaining_secs, 120);
        assert_eq!(e.driver().rearms(), 2);
        assert!(e.driver().is_armed());
    }

    #[test]
    fn tick_at_zero_fires_transition_immediately() {
        let store = Rc::new(FakeStore::default());
        *store.saved.borrow_mut() = Some(TimerState {
            remaining_secs: 0,
            running: true,
            ..TimerState::default()
        });
        let mut e = TimerEngine::restore(
            Rc::new(FakeLedger::default()),
            Rc::clone(&store),
            ManualDriver::new(),
            PomodoroDurations::default(),
        );
        assert!(e.driver().is_armed());

        let events = e.tick();
        assert!(e.state().finished);
        assert_eq!(count(&events, |ev| matches!(ev, Event::TimeUp { .. })), 1);
        assert_eq!(count(&events, |ev| matches!(ev, Event::TimeUpdated { .. })), 0);
    }

    // ── Pomodoro ─────────────────────────────────────────────────────

    #[test]
    fn pomodoro_work_expiry_records_session_and_decrements_budget() {
        let (mut e, ledger, _) = engine();
        let task = ledger.add_task("Write docs", 3).unwrap();
        e.start_pomodoro(Some(task)).unwrap();
        assert_eq!(e.state().remaining_secs, 25 * 60);

        let events = run(&mut e, 25 * 60);

        let sessions = ledger.sessions.borrow();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].kind, SessionKind::Work);
        assert_eq!(sessions[0].duration_min, 25);
        assert_eq!(sessions[0].task_id, Some(task));
        assert!(sessions[0].start_time <= sessions[0].end_time);
        assert_eq!(ledger.budget(task), 2);

        assert_eq!(e.state().pomodoro_phase, PomodoroPhase::Break);
        assert_eq!(e.state().remaining_secs, 5 * 60);
        assert!(e.state().running);
        assert_eq!(e.driver().rearms(), 2);
        assert!(has_message(&events, "Work period finished! Time for a short break!"));
    }

    #[test]
    fn pomodoro_break_expiry_records_break_and_returns_to_work() {
        let (mut e, ledger, _) = engine();
        let task = ledger.add_task("Review", 4).unwrap();
        e.start_pomodoro(Some(task)).unwrap();

        let events = run(&mut e, 25 * 60 + 5 * 60);

        let kinds: Vec<_> = ledger.sessions.borrow().iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec![SessionKind::Work, SessionKind::Break]);
        assert_eq!(ledger.sessions.borrow()[1].duration_min, 5);
        assert_eq!(ledger.budget(task), 3);
        assert_eq!(e.state().pomodoro_phase, PomodoroPhase::Work);
        assert_eq!(e.state().remaining_secs, 25 * 60);
        assert!(has_message(&events, "Break finished! Time to get back to work!"));
    }

    #[test]
    fn pomodoro_cycle_counter_wraps_after_four_work_phases() {
        let (mut e, ledger, _) = engine_with(short_durations());
        let task = ledger.add_task("Refactor", 10).unwrap();
        e.start_pomodoro(Some(task)).unwrap();

        let mut seen = Vec::new();
        let mut work_ends = Vec::new();
        for _ in 0..4 {
            work_ends.push(run(&mut e, 60));
            seen.push(e.state().pomodoro_cycle_count);
            run(&mut e, 60);
        }
        assert_eq!(seen, vec![1, 2, 3, 0]);
        assert!(has_message(&work_ends[0], "Work period finished! Time for a short break!"));
        assert!(has_message(&work_ends[3], "Great work! Take a long break!"));
        assert_eq!(ledger.budget(task), 6);
    }

    #[test]
    fn pomodoro_fourth_break_keeps_short_length_by_default() {
        let (mut e, ledger, _) = engine_with(short_durations());
        let task = ledger.add_task("Refactor", 10).unwrap();
        e.start_pomodoro(Some(task)).unwrap();

        run(&mut e, 4 * 60 + 3 * 60);
        assert_eq!(e.state().pomodoro_cycle_count, 0);
        assert_eq!(e.state().pomodoro_phase, PomodoroPhase::Break);
        assert_eq!(e.state().remaining_secs, 60);
    }

    #[test]
    fn pomodoro_fourth_break_is_long_when_enabled() {
        let (mut e, ledger, _) = engine_with(PomodoroDurations {
            long_break_every_fourth: true,
            ..short_durations()
        });
        let task = ledger.add_task("Refactor", 10).unwrap();
        e.start_pomodoro(Some(task)).unwrap();

        run(&mut e, 4 * 60 + 3 * 60);
        assert_eq!(e.state().pomodoro_phase, PomodoroPhase::Break);
        assert_eq!(e.state().remaining_secs, 3 * 60);

        run(&mut e, 3 * 60);
        let last = ledger.sessions.borrow().last().cloned().unwrap();
        assert_eq!(last.kind, SessionKind::Break);
        assert_eq!(last.duration_min, 3);
        assert_eq!(e.state().pomodoro_phase, PomodoroPhase::Work);
    }

    #[test]
    fn pomodoro_budget_may_go_negative() {
        let (mut e, ledger, _) = engine_with(short_durations());
        let task = ledger.add_task("Overrun", 1).unwrap();
        e.start_pomodoro(Some(task)).unwrap();

        run(&mut e, 60 * 4);
        assert_eq!(ledger.budget(task), -1);
    }

    #[test]
    fn pomodoro_without_task_leaves_state_unchanged() {
        let (mut e, ledger, store) = engine();
        e.start_manual(3).unwrap();
        run(&mut e, 180);
        let before = e.state().clone();
        let saves = store.saves.get();
        let rearms = e.driver().rearms();

        assert!(matches!(e.start_pomodoro(None), Err(CoreError::InvalidTask)));
        assert!(matches!(e.start_pomodoro(Some(42)), Err(CoreError::InvalidTask)));

        assert_eq!(e.state(), &before);
        assert_eq!(store.saves.get(), saves);
        assert_eq!(e.driver().rearms(), rearms);
        assert!(ledger.sessions.borrow().is_empty());
    }

    #[test]
    fn pomodoro_rejects_overflowing_configured_durations() {
        let huge = u64::MAX / 60 + 1;
        for durations in [
            PomodoroDurations { work_minutes: huge, ..short_durations() },
            PomodoroDurations { break_minutes: huge, ..short_durations() },
            PomodoroDurations {
                long_break_minutes: huge,
                long_break_every_fourth: true,
                ..short_durations()
            },
        ] {
            let (mut e, ledger, store) = engine_with(durations);
            let task = ledger.add_task("Too long", 1).unwrap();
            assert!(matches!(
                e.start_pomodoro(Some(task)),
                Err(CoreError::InvalidDuration(m)) if m == huge
            ));
            assert_eq!(e.state(), &TimerState::default());
            assert_eq!(store.saves.get(), 0);
        }
    }

    #[test]
    fn running_pomodoro_blocks_other_starts() {
        let (mut e, ledger, _) = engine();
        let task = ledger.add_task("Focus", 2).unwrap();
        e.start_pomodoro(Some(task)).unwrap();
        run(&mut e, 5);
        let before = e.state().clone();

        assert!(matches!(
            e.start_manual(10),
            Err(CoreError::TimerBusy { mode: TimerMode::Pomodoro })
        ));
        assert!(matches!(
            e.start_automated(Level::Easy),
            Err(CoreError::TimerBusy { .. })
        ));
        assert!(matches!(
            e.start_pomodoro(Some(task)),
            Err(CoreError::TimerBusy { .. })
        ));
        assert_eq!(e.state(), &before);
    }

    #[test]
    fn ledger_failure_does_not_disturb_timer() {
        let (mut e, ledger, _) = engine_with(short_durations());
        let task = ledger.add_task("Flaky disk", 2).unwrap();
        e.start_pomodoro(Some(task)).unwrap();
        ledger.fail_writes.set(true);

        let events = run(&mut e, 60);

        assert!(ledger.sessions.borrow().is_empty());
        assert_eq!(ledger.budget(task), 2);
        assert_eq!(e.state().pomodoro_phase, PomodoroPhase::Break);
        assert_eq!(e.state().remaining_secs, 60);
        assert!(e.state().running);
        assert_eq!(
            count(&events, |ev| matches!(
                ev,
                Event::Advisory { level: crate::events::AdvisoryLevel::Warning, .. }
            )),
            2
        );
    }

    #[test]
    fn end_pomodoro_closes_dangling_sessions_and_stops() {
        let (mut e, ledger, _) = engine();
        let task = ledger.add_task("Wrap up", 2).unwrap();
        e.start_pomodoro(Some(task)).unwrap();
        ledger.dangling.set(2);

        let events = e.end_pomodoro();

        assert_eq!(ledger.dangling.get(), 0);
        assert_eq!(e.state(), &TimerState::default());
        assert!(!e.driver().is_armed());
        assert!(has_message(&events, "Pomodoro session ended."));
    }

    // ── Pause / resume / stop ────────────────────────────────────────

    #[test]
    fn pause_freezes_and_resume_continues() {
        let (mut e, _, _) = engine();
        e.start_manual(1).unwrap();
        run(&mut e, 10);
        assert_eq!(e.state().remaining_secs, 50);

        e.pause().unwrap();
        assert!(run(&mut e, 100).is_empty());
        assert_eq!(e.state().remaining_secs, 50);
        assert!(e.driver().is_armed());

        let events = e.resume().unwrap();
        assert!(matches!(
            events[0],
            Event::TimerResumed { remaining_secs: 50, .. }
        ));
        e.tick();
        assert_eq!(e.state().remaining_secs, 49);
    }

    #[test]
    fn pause_and_resume_check_preconditions() {
        let (mut e, _, _) = engine();
        assert!(matches!(e.pause(), Err(CoreError::NotRunning)));
        assert!(matches!(e.resume(), Err(CoreError::NotPaused)));

        e.start_manual(1).unwrap();
        assert!(matches!(e.resume(), Err(CoreError::NotPaused)));
        e.pause().unwrap();
        assert!(e.pause().unwrap().is_empty());
    }

    #[test]
    fn stop_is_idempotent() {
        let (mut e, ledger, _) = engine();
        let task = ledger.add_task("Stop me", 2).unwrap();
        e.start_pomodoro(Some(task)).unwrap();
        run(&mut e, 30);

        let first = e.stop();
        let once = e.state().clone();
        let second = e.stop();

        assert!(matches!(first[0], Event::TimerStopped { .. }));
        assert!(second.is_empty());
        assert_eq!(e.state(), &once);
        assert_eq!(once, TimerState::default());
        assert!(!e.driver().is_armed());
    }

    // ── Automated ────────────────────────────────────────────────────

    #[test]
    fn automated_runs_full_phase_sequence_for_every_level() {
        for (level, work, short, long) in [
            (Level::Easy, 20u64, 5u64, 15u64),
            (Level::Medium, 35, 5, 20),
            (Level::Hard, 50, 10, 30),
        ] {
            let (mut e, ledger, _) = engine();
            let start = e.start_automated(level).unwrap();
            assert!(matches!(
                start[0],
                Event::TimerStarted { mode: TimerMode::Automated, duration_secs, .. }
                    if duration_secs == work * 60
            ));
            assert_eq!(e.state().phase_label(), "work");

            let mut phases = Vec::new();
            let mut rounds = 0;
            let mut ticks = 0u64;
            while !e.state().finished && ticks < 20_000 {
                ticks += 1;
                for event in e.tick() {
                    match event {
                        Event::PhaseChanged { phase, duration_secs, .. } => {
                            phases.push((phase, duration_secs))
                        }
                        Event::RoundCompleted { .. } => rounds += 1,
                        _ => {}
                    }
                }
            }

            let w = ("work".to_string(), work * 60);
            let sb = ("short break".to_string(), short * 60);
            let lb = ("long break".to_string(), long * 60);
            assert_eq!(
                phases,
                vec![sb.clone(), w.clone(), sb.clone(), w.clone(), sb.clone(), w, sb, lb],
                "{level} phase sequence"
            );
            assert_eq!(ticks, 4 * (work + short) * 60 + long * 60, "{level} length");
            assert_eq!(rounds, 1);
            assert!(!e.state().running);
            assert!(!e.driver().is_armed());
            assert_eq!(e.state().automated.as_ref().map(|a| a.current_cycle), Some(4));
            assert!(ledger.sessions.borrow().is_empty());
        }
    }

    #[test]
    fn automated_replaces_manual_but_not_itself() {
        let (mut e, _, _) = engine();
        e.start_manual(10).unwrap();
        e.start_automated(Level::Easy).unwrap();
        assert_eq!(e.state().mode, TimerMode::Automated);
        assert!(matches!(
            e.start_automated(Level::Hard),
            Err(CoreError::TimerBusy { mode: TimerMode::Automated })
        ));
    }

    // ── Persistence ──────────────────────────────────────────────────

    #[test]
    fn every_transition_is_persisted() {
        let (mut e, _, store) = engine();
        e.start_manual(1).unwrap();
        assert_eq!(store.saves.get(), 1);
        e.pause().unwrap();
        e.resume().unwrap();
        e.stop();
        assert_eq!(store.saves.get(), 4);
        assert_eq!(store.saved.borrow().as_ref(), Some(&TimerState::default()));
    }

    #[test]
    fn running_countdown_is_checkpointed() {
        let (e, _, store) = engine();
        let mut e = e.with_checkpoint_every(10);
        e.start_manual(1).unwrap();
        run(&mut e, 25);
        assert_eq!(store.saves.get(), 3);
        assert_eq!(store.saved.borrow().as_ref().unwrap().remaining_secs, 40);
    }

    #[test]
    fn restore_rearms_running_timer() {
        let (mut e, ledger, store) = engine();
        let task = ledger.add_task("Resume me", 3).unwrap();
        e.start_pomodoro(Some(task)).unwrap();
        run(&mut e, 105);
        drop(e);

        let restored = TimerEngine::restore(
            Rc::clone(&ledger),
            Rc::clone(&store),
            ManualDriver::new(),
            PomodoroDurations::default(),
        );
        assert_eq!(restored.state().mode, TimerMode::Pomodoro);
        assert_eq!(restored.state().active_task_id, Some(task));
        // Last checkpoint was taken after 100 ticks.
        assert_eq!(restored.state().remaining_secs, 25 * 60 - 100);
        assert!(restored.driver().is_armed());
    }

    #[test]
    fn restore_discards_inconsistent_state() {
        let store = Rc::new(FakeStore::default());
        *store.saved.borrow_mut() = Some(TimerState {
            paused: true,
            running: false,
            ..TimerState::default()
        });
        let e = TimerEngine::restore(
            Rc::new(FakeLedger::default()),
            Rc::clone(&store),
            ManualDriver::new(),
            PomodoroDurations::default(),
        );
        assert_eq!(e.state(), &TimerState::default());
        assert!(!e.driver().is_armed());
    }

    #[test]
    fn snapshot_carries_state_and_user() {
        let (mut e, _, _) = engine();
        e.start_manual(2).unwrap();
        match e.snapshot(Some("octocat".into())) {
            Event::StateSnapshot { state, github_user, .. } => {
                assert_eq!(state.remaining_secs, 120);
                assert_eq!(github_user.as_deref(), Some("octocat"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
