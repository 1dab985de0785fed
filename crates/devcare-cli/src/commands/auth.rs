use clap::Subcommand;
use devcare_core::integrations::github;
use devcare_core::{Config, Database};

#[derive(Subcommand)]
pub enum AuthAction {
    /// GitHub: login / logout / status
    Github {
        #[command(subcommand)]
        action: AuthOp,
    },
}

#[derive(Subcommand)]
pub enum AuthOp {
    /// Authorize in the browser and fetch the profile
    Login {
        /// OAuth client ID (instead of the configured one)
        #[arg(long)]
        client_id: Option<String>,
        /// OAuth client secret (instead of the configured one)
        #[arg(long)]
        client_secret: Option<String>,
    },
    /// Remove the stored token and user
    Logout,
    /// Check authentication status
    Status,
}

pub fn run(action: AuthAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        AuthAction::Github { action: op } => handle_github(op),
    }
}

fn handle_github(op: AuthOp) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;
    match op {
        AuthOp::Login {
            client_id,
            client_secret,
        } => {
            let mut config = Config::load()?.github;
            if let Some(id) = client_id {
                config.client_id = id;
            }
            if let Some(secret) = client_secret {
                config.client_secret = secret;
            }

            println!("Opening GitHub in your browser...");
            let http = reqwest::Client::new();
            let profile = super::runtime()?.block_on(github::login(&http, &db, &config))?;
            println!("GitHub authenticated as {}", profile.login);
        }
        AuthOp::Logout => {
            github::clear_credentials(&db)?;
            println!("GitHub disconnected");
        }
        AuthOp::Status => match github::load_user(&db)? {
            Some(user) => println!("authenticated as {}", user.login),
            None if github::load_token(&db)?.is_some() => {
                println!("authenticated (profile not fetched yet)")
            }
            None => println!("not authenticated"),
        },
    }
    Ok(())
}
