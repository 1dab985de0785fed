//! External services: the GitHub OAuth flow and profile client.

pub mod github;
pub mod oauth;

pub use github::{GitHubClient, GitHubItem, GitHubProfile, GitHubUser};
pub use oauth::{OAuthConfig, OAuthTokens};
