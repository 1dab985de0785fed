//! GitHub integration -- profile and recent activity for the dashboard.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::oauth::{self, OAuthConfig};
use crate::error::{OAuthError, Result};
use crate::storage::{Database, GitHubConfig};

const USER_AGENT: &str = "devcare";
/// Items shown per activity list.
const RECENT_LIMIT: usize = 5;

/// kv key holding the access token.
pub const TOKEN_KEY: &str = "devcare.githubAccessToken";
/// kv key holding the [`GitHubUser`] summary.
pub const USER_KEY: &str = "devcare.githubUser";

/// The part of the profile kept between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubUser {
    pub login: String,
    pub avatar_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSummary {
    pub repository: String,
    pub sha: String,
    pub message: String,
}

/// An issue or pull request fetched from GitHub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubItem {
    pub number: i64,
    pub title: String,
    pub state: String,
    pub url: String,
    pub repository: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubProfile {
    pub login: String,
    pub avatar_url: String,
    pub public_repos: u64,
    pub private_repos: u64,
    pub total_stars: u64,
    pub followers: u64,
    pub following: u64,
    pub recent_commits: Vec<CommitSummary>,
    pub recent_issues: Vec<GitHubItem>,
    pub recent_prs: Vec<GitHubItem>,
}

impl GitHubProfile {
    pub fn user(&self) -> GitHubUser {
        GitHubUser {
            login: self.login.clone(),
            avatar_url: self.avatar_url.clone(),
        }
    }
}

fn api_error(message: impl Into<String>) -> OAuthError {
    OAuthError::ApiFailed {
        service: "github".into(),
        message: message.into(),
    }
}

/// REST client for the authenticated user's profile.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: Client,
    api_base: String,
}

impl GitHubClient {
    pub fn new(http: Client, api_base: impl Into<String>) -> Self {
        let api_base = api_base.into().trim_end_matches('/').to_string();
        Self { http, api_base }
    }

    pub fn from_config(http: Client, config: &GitHubConfig) -> Self {
        Self::new(http, config.api_base.clone())
    }

    async fn get_json(&self, token: &str, path: &str) -> Result<Value, OAuthError> {
        let url = format!("{}{path}", self.api_base);
        let resp = self
            .http
            .get(&url)
            .header("Authorization", format!("Bearer {token}"))
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await?;

        match resp.status() {
            s if s.is_success() => Ok(resp.json().await?),
            StatusCode::UNAUTHORIZED => Err(OAuthError::NotAuthenticated {
                service: "github".into(),
            }),
            s => {
                let text = resp.text().await.unwrap_or_default();
                Err(api_error(format!("GET {path} returned HTTP {s}: {text}")))
            }
        }
    }

    /// Fetch the profile, star count and the latest commits, issues and PRs.
    ///
    /// # Errors
    /// Fails on any HTTP error; `NotAuthenticated` when the token is rejected.
    pub async fn fetch_profile(&self, token: &str) -> Result<GitHubProfile, OAuthError> {
        let user = self.get_json(token, "/user").await?;
        let login = user["login"]
            .as_str()
            .ok_or_else(|| api_error("user response has no login"))?
            .to_string();

        let repos = self
            .get_json(token, "/user/repos?per_page=100&affiliation=owner")
            .await?;
        let total_stars = repos
            .as_array()
            .map(|repos| {
                repos
                    .iter()
                    .filter_map(|r| r["stargazers_count"].as_u64())
                    .sum::<u64>()
            })
            .unwrap_or(0);

        let events = self
            .get_json(token, &format!("/users/{login}/events?per_page=100"))
            .await?;
        let issues = self.search(token, &login, "issue").await?;
        let prs = self.search(token, &login, "pr").await?;

        Ok(GitHubProfile {
            avatar_url: user["avatar_url"].as_str().unwrap_or_default().to_string(),
            public_repos: user["public_repos"].as_u64().unwrap_or(0),
            private_repos: user["total_private_repos"].as_u64().unwrap_or(0),
            total_stars,
            followers: user["followers"].as_u64().unwrap_or(0),
            following: user["following"].as_u64().unwrap_or(0),
            recent_commits: parse_push_commits(&events),
            recent_issues: parse_items(&issues),
            recent_prs: parse_items(&prs),
            login,
        })
    }

    async fn search(&self, token: &str, login: &str, kind: &str) -> Result<Value, OAuthError> {
        let query = format!("author:{login} type:{kind}");
        let path = format!(
            "/search/issues?q={}&sort=created&order=desc&per_page={RECENT_LIMIT}",
            urlencoding::encode(&query)
        );
        self.get_json(token, &path).await
    }

    /// [`fetch_profile`](Self::fetch_profile) with a bounded retry loop.
    /// A rejected token is not retried.
    ///
    /// # Errors
    /// The last error once `attempts` are used up.
    pub async fn fetch_profile_with_retry(
        &self,
        token: &str,
        attempts: u32,
        delay: Duration,
    ) -> Result<GitHubProfile, OAuthError> {
        let attempts = attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.fetch_profile(token).await {
                Ok(profile) => return Ok(profile),
                Err(e @ OAuthError::NotAuthenticated { .. }) => return Err(e),
                Err(e) if attempt >= attempts => return Err(e),
                Err(e) => {
                    tracing::warn!(attempt, attempts, error = %e, "profile fetch failed; retrying");
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Commits from the latest push events, newest first.
fn parse_push_commits(events: &Value) -> Vec<CommitSummary> {
    let Some(events) = events.as_array() else {
        return Vec::new();
    };
    events
        .iter()
        .filter(|e| e["type"] == "PushEvent")
        .flat_map(|e| {
            let repository = e["repo"]["name"].as_str().unwrap_or("unknown").to_string();
            e["payload"]["commits"]
                .as_array()
                .into_iter()
                .flatten()
                .rev()
                .map(move |c| CommitSummary {
                    repository: repository.clone(),
                    sha: c["sha"].as_str().unwrap_or_default().to_string(),
                    message: c["message"]
                        .as_str()
                        .unwrap_or_default()
                        .lines()
                        .next()
                        .unwrap_or_default()
                        .to_string(),
                })
        })
        .take(RECENT_LIMIT)
        .collect()
}

fn parse_items(search: &Value) -> Vec<GitHubItem> {
    let Some(items) = search["items"].as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .take(RECENT_LIMIT)
        .map(|item| GitHubItem {
            number: item["number"].as_i64().unwrap_or(0),
            title: item["title"].as_str().unwrap_or("(No title)").to_string(),
            state: item["state"].as_str().unwrap_or("unknown").to_string(),
            url: item["html_url"].as_str().unwrap_or_default().to_string(),
            repository: item["repository_url"]
                .as_str()
                .and_then(|url| url.rsplit('/').next())
                .unwrap_or("unknown")
                .to_string(),
        })
        .collect()
}

/// Authenticate in the browser, store the token, then fetch the profile
/// (with the configured retries) and store the user summary.
///
/// # Errors
/// Any OAuth, HTTP or storage failure. The token stays stored when only the
/// profile fetch fails.
pub async fn login(http: &Client, db: &Database, config: &GitHubConfig) -> Result<GitHubProfile> {
    let oauth_config = OAuthConfig::github(config)?;
    let tokens = oauth::authorize(http, &oauth_config).await?;
    db.kv_set(TOKEN_KEY, &tokens.access_token)?;
    tracing::info!("github access token stored");

    let client = GitHubClient::from_config(http.clone(), config);
    let profile = client
        .fetch_profile_with_retry(
            &tokens.access_token,
            config.profile_retries,
            Duration::from_millis(config.retry_delay_ms),
        )
        .await?;
    save_credentials(db, &tokens.access_token, &profile.user())?;
    Ok(profile)
}

// ── Stored credentials ───────────────────────────────────────────────

pub fn save_credentials(db: &Database, token: &str, user: &GitHubUser) -> Result<()> {
    db.kv_set(TOKEN_KEY, token)?;
    db.kv_set(USER_KEY, &serde_json::to_string(user)?)?;
    Ok(())
}

pub fn load_token(db: &Database) -> Result<Option<String>> {
    Ok(db.kv_get(TOKEN_KEY)?.filter(|t| !t.is_empty()))
}

/// The stored user, only while a token is stored too.
pub fn load_user(db: &Database) -> Result<Option<GitHubUser>> {
    if load_token(db)?.is_none() {
        return Ok(None);
    }
    match db.kv_get(USER_KEY)? {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

pub fn clear_credentials(db: &Database) -> Result<()> {
    db.kv_delete(TOKEN_KEY)?;
    db.kv_delete(USER_KEY)?;
    Ok(())
}
