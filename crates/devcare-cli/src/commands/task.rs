//! Task management commands for CLI.

use clap::Subcommand;
use devcare_core::{Database, SessionLedger};

#[derive(Subcommand)]
pub enum TaskAction {
    /// Create a new task
    Add {
        /// Task name
        name: String,
        /// Pomodoros planned for the task (default: 1)
        #[arg(long, default_value = "1")]
        pomodoros: i64,
    },
    /// List tasks
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Rename a task or change its budget
    Edit {
        /// Task ID
        id: i64,
        /// New name
        #[arg(long)]
        name: Option<String>,
        /// New pomodoro budget
        #[arg(long)]
        pomodoros: Option<i64>,
    },
    /// Delete a task
    Delete {
        /// Task ID
        id: i64,
    },
    /// Delete tasks whose budget is used up
    Purge,
}

pub fn run(action: TaskAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;

    match action {
        TaskAction::Add { name, pomodoros } => {
            let id = db.add_task(&name, pomodoros)?;
            println!("Task created: {id}");
        }
        TaskAction::List { json } => {
            let tasks = db.list_tasks()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&tasks)?);
            } else if tasks.is_empty() {
                println!("No tasks.");
            } else {
                for task in &tasks {
                    println!("{:>4}  {:<40} {}", task.id, task.name, task.pomodoro_budget);
                }
            }
        }
        TaskAction::Edit {
            id,
            name,
            pomodoros,
        } => {
            let task = db.get_task(id)?.ok_or(format!("Task not found: {id}"))?;
            let name = name.unwrap_or(task.name);
            let pomodoros = pomodoros.unwrap_or(task.pomodoro_budget);
            db.edit_task(id, &name, pomodoros)?;
            println!("Task updated: {id}");
        }
        TaskAction::Delete { id } => {
            db.delete_task(id)?;
            println!("Task deleted: {id}");
        }
        TaskAction::Purge => {
            let removed = db.purge_invalid_tasks()?;
            println!("Removed {removed} task(s)");
        }
    }
    Ok(())
}
