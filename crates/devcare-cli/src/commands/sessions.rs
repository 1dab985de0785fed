use chrono::{NaiveDate, Utc};
use clap::Subcommand;
use devcare_core::{demo, Database, SessionLedger};

#[derive(Subcommand)]
pub enum SessionsAction {
    /// List recorded sessions
    List,
    /// Replace all sessions with generated demo data
    Seed {
        /// First day (YYYY-MM-DD)
        #[arg(long)]
        from: NaiveDate,
        /// Last day, inclusive (YYYY-MM-DD)
        #[arg(long)]
        to: NaiveDate,
        /// Seed for reproducible data
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Give sessions without an end time the current time as end
    CloseDangling,
}

pub fn run(action: SessionsAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;

    match action {
        SessionsAction::List => {
            println!("{}", serde_json::to_string_pretty(&db.list_sessions()?)?);
        }
        SessionsAction::Seed { from, to, seed } => {
            let sessions = demo::generate_sessions(&mut demo::rng(seed), from, to)?;
            let count = db.replace_sessions(&sessions)?;
            println!("Inserted {count} demo sessions from {from} to {to}");
        }
        SessionsAction::CloseDangling => {
            let closed = db.close_dangling_sessions(Utc::now())?;
            println!("Closed {closed} session(s)");
        }
    }
    Ok(())
}
