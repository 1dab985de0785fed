//! GitHub profile summary for the logged-in user.

use devcare_core::integrations::github::{self, GitHubProfile};
use devcare_core::{Config, Database, GitHubClient, OAuthError};

pub fn run(json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_or_default().github;
    let db = Database::open()?;
    let token = github::load_token(&db)?.ok_or(OAuthError::NotAuthenticated {
        service: "github".into(),
    })?;

    let client = GitHubClient::from_config(reqwest::Client::new(), &config);
    let profile = super::runtime()?.block_on(client.fetch_profile(&token))?;
    github::save_credentials(&db, &token, &profile.user())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&profile)?);
    } else {
        print_summary(&profile);
    }
    Ok(())
}

fn print_summary(p: &GitHubProfile) {
    println!("{} ({})", p.login, p.avatar_url);
    println!(
        "repos: {} public, {} private | stars: {} | followers: {} | following: {}",
        p.public_repos, p.private_repos, p.total_stars, p.followers, p.following
    );

    println!("\nRecent commits:");
    if p.recent_commits.is_empty() {
        println!("  (none)");
    }
    for c in &p.recent_commits {
        let sha: String = c.sha.chars().take(7).collect();
        println!("  {} {sha} {}", c.repository, c.message);
    }

    for (title, items) in [("Recent issues", &p.recent_issues), ("Recent pull requests", &p.recent_prs)] {
        println!("\n{title}:");
        if items.is_empty() {
            println!("  (none)");
        }
        for item in items {
            println!("  {}#{} [{}] {}", item.repository, item.number, item.state, item.title);
        }
    }
}
