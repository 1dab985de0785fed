use chrono::Local;
use clap::Subcommand;
use devcare_core::{rate_week, Database};

#[derive(Subcommand)]
pub enum StatsAction {
    /// Work and break minutes per day
    Daily,
    /// Average work and break session length
    Average,
    /// Work and break sessions per day
    Counts,
    /// Totals and counts for the last seven days
    Weekly,
    /// Weekly productivity rating with suggestions
    Rating {
        /// Print JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
}

pub fn run(action: StatsAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;
    let today = Local::now().date_naive();

    match action {
        StatsAction::Daily => {
            println!("{}", serde_json::to_string_pretty(&db.daily_session_times()?)?);
        }
        StatsAction::Average => {
            println!("{}", serde_json::to_string_pretty(&db.average_session_times()?)?);
        }
        StatsAction::Counts => {
            println!("{}", serde_json::to_string_pretty(&db.session_counts_per_day()?)?);
        }
        StatsAction::Weekly => {
            println!("{}", serde_json::to_string_pretty(&db.weekly_session_times(today)?)?);
        }
        StatsAction::Rating { json } => {
            let rating = rate_week(&db.weekly_session_times(today)?);
            if json {
                println!("{}", serde_json::to_string_pretty(&rating)?);
                return Ok(());
            }
            println!("Weekly rating: {:.1} / 10", rating.rating);
            println!("{}", rating.explanation());
            if !rating.suggestions.is_empty() {
                println!();
                println!("Suggestions:");
                for s in &rating.suggestions {
                    println!("  - {s}");
                }
            }
        }
    }
    Ok(())
}
