//! Interactive dashboard: one owner loop for the engine, fed by stdin
//! commands and driver ticks.

use std::rc::Rc;

use devcare_core::integrations::github;
use devcare_core::storage::{Config, Database};
use devcare_core::{
    AdvisoryLevel, CoreError, Event, IntervalDriver, Level, SessionLedger, StateStore, TaskId,
    TickDriver, TimerEngine,
};
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "commands: reminder <minutes> | pomodoro <task-id> | auto <easy|medium|hard> | \
                    pause | resume | stop | end | status | tasks | help | quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Reminder(u64),
    Pomodoro(Option<TaskId>),
    Auto(Level),
    Pause,
    Resume,
    Stop,
    End,
    Status,
    Tasks,
    Help,
    Quit,
}

/// Parse one input line. `Ok(None)` for blank lines.
pub fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let mut parts = line.split_whitespace();
    let Some(verb) = parts.next() else {
        return Ok(None);
    };
    let arg = parts.next();

    let command = match verb.to_ascii_lowercase().as_str() {
        "reminder" | "remind" => {
            let minutes = arg
                .ok_or("usage: reminder <minutes>")?
                .parse::<u64>()
                .map_err(|_| "minutes must be a positive whole number".to_string())?;
            Command::Reminder(minutes)
        }
        "pomodoro" => {
            let task = arg
                .map(|a| a.parse::<TaskId>().map_err(|_| format!("invalid task id '{a}'")))
                .transpose()?;
            Command::Pomodoro(task)
        }
        "auto" => {
            let level = arg.ok_or("usage: auto <easy|medium|hard>")?;
            Command::Auto(level.parse::<Level>().map_err(|e: CoreError| e.to_string())?)
        }
        "pause" => Command::Pause,
        "resume" | "start" => Command::Resume,
        "stop" => Command::Stop,
        "end" => Command::End,
        "status" => Command::Status,
        "tasks" => Command::Tasks,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(format!("unknown command '{other}' ({HELP})")),
    };
    Ok(Some(command))
}

/// Run a command against the engine. Failures become error advisories;
/// the engine state is never touched by a rejected command.
pub fn apply<L, S, D>(
    engine: &mut TimerEngine<L, S, D>,
    command: Command,
    github_user: Option<String>,
) -> Vec<Event>
where
    L: SessionLedger,
    S: StateStore,
    D: TickDriver,
{
    let result = match command {
        Command::Reminder(minutes) => engine.start_manual(minutes),
        Command::Pomodoro(task) => engine.start_pomodoro(task),
        Command::Auto(level) => engine.start_automated(level),
        Command::Pause => engine.pause(),
        Command::Resume => engine.resume(),
        Command::Stop => Ok(engine.stop()),
        Command::End => Ok(engine.end_pomodoro()),
        Command::Status => Ok(vec![engine.snapshot(github_user)]),
        Command::Tasks => engine.ledger().list_tasks().map(|tasks| {
            if tasks.is_empty() {
                return vec![Event::info("No tasks yet. Add one with `devcare task add`.")];
            }
            tasks
                .into_iter()
                .map(|t| Event::info(format!("#{} {} ({} pomodoros left)", t.id, t.name, t.pomodoro_budget)))
                .collect()
        }),
        Command::Help => Ok(vec![Event::info(HELP)]),
        Command::Quit => Ok(Vec::new()),
    };
    result.unwrap_or_else(|e| {
        tracing::debug!(error = %e, "command rejected");
        vec![Event::error(e.to_string())]
    })
}

/// Render an event for the terminal.
pub fn render(event: &Event) -> Option<String> {
    let line = match event {
        Event::TimeUpdated { remaining_secs } => {
            format!("{:02}:{:02}", remaining_secs / 60, remaining_secs % 60)
        }
        Event::Advisory { level, message } => {
            let tag = match level {
                AdvisoryLevel::Info => "info",
                AdvisoryLevel::Warning => "warn",
                AdvisoryLevel::Error => "error",
            };
            format!("[{tag}] {message}")
        }
        Event::TimerStarted { mode, phase, duration_secs, .. } => {
            format!("{mode} timer started: {phase} for {}", minutes(*duration_secs))
        }
        Event::PhaseChanged { phase, duration_secs, .. } => {
            format!("next: {phase} for {}", minutes(*duration_secs))
        }
        Event::SessionRecorded { kind, duration_min, .. } => {
            format!("recorded {kind} session ({duration_min} min)")
        }
        Event::StateSnapshot { state, github_user, .. } => {
            let status = if state.finished {
                "finished"
            } else if state.paused {
                "paused"
            } else if state.running {
                "running"
            } else {
                "idle"
            };
            let user = github_user.as_deref().unwrap_or("not logged in");
            format!(
                "{} {} {} ({:02}:{:02} left) | GitHub: {user}",
                state.mode,
                state.phase_label(),
                status,
                state.remaining_secs / 60,
                state.remaining_secs % 60
            )
        }
        Event::TimerPaused { .. }
        | Event::TimerResumed { .. }
        | Event::TimerStopped { .. }
        | Event::TimeUp { .. }
        | Event::RoundCompleted { .. } => return None,
    };
    Some(line)
}

fn minutes(secs: u64) -> String {
    format!("{} min", secs / 60)
}

fn emit(event: &Event, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string(event)?);
    } else if let Some(line) = render(event) {
        println!("{line}");
    }
    Ok(())
}

fn github_login(db: &Database) -> Option<String> {
    match github::load_user(db) {
        Ok(user) => user.map(|u| u.login),
        Err(e) => {
            tracing::warn!(error = %e, "failed to read stored GitHub user");
            None
        }
    }
}

pub fn run(json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let rt = super::runtime()?;
    rt.block_on(run_loop(json))
}

async fn run_loop(json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_or_default();
    let db = Rc::new(Database::open()?);
    let (driver, mut ticks) = IntervalDriver::every_second();
    let mut engine = TimerEngine::restore(
        Rc::clone(&db),
        Rc::clone(&db),
        driver,
        config.pomodoro.durations(),
    )
    .with_checkpoint_every(config.timer.checkpoint_every_ticks);

    emit(&engine.snapshot(github_login(&db)), json)?;
    if !json {
        println!("{HELP}");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match parse_command(&line) {
                    Ok(Some(Command::Quit)) => break,
                    Ok(Some(command)) => {
                        for event in apply(&mut engine, command, github_login(&db)) {
                            emit(&event, json)?;
                        }
                    }
                    Ok(None) => {}
                    Err(message) => emit(&Event::error(message), json)?,
                }
            }
            Some(tick) = ticks.recv() => {
                if !engine.driver().is_current(&tick) {
                    tracing::trace!(generation = tick.generation, "dropping stale tick");
                    continue;
                }
                for event in engine.tick() {
                    emit(&event, json)?;
                }
            }
        }
    }

    tracing::debug!("dashboard closed");
    Ok(())
}
