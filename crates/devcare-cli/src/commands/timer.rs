use std::rc::Rc;

use clap::Subcommand;
use devcare_core::{Config, Database, ManualDriver, TimerEngine};

use super::dashboard::render;

#[derive(Subcommand)]
pub enum TimerAction {
    /// Show the saved timer state
    Status {
        /// Print JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
    /// Stop the saved timer and clear its countdown
    Reset,
}

pub fn run(action: TimerAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_or_default();
    let db = Rc::new(Database::open()?);
    let mut engine = TimerEngine::restore(
        Rc::clone(&db),
        Rc::clone(&db),
        ManualDriver::new(),
        config.pomodoro.durations(),
    );

    match action {
        TimerAction::Status { json } => {
            let snapshot = engine.snapshot(None);
            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else if let Some(line) = render(&snapshot) {
                println!("{line}");
            }
        }
        TimerAction::Reset => {
            engine.stop();
            println!("timer reset");
        }
    }
    Ok(())
}
