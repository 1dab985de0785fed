//! OAuth2 Authorization Code flow for the command line.
//!
//! 1. Binds a localhost listener for the callback
//! 2. Opens the browser at the authorization URL
//! 3. Waits (bounded by a timeout) for `/callback?code=...`
//! 4. Exchanges the code for an access token
//!
//! Storing the token is left to the caller.

use std::time::Duration;

use indoc::indoc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::error::OAuthError;
use crate::storage::GitHubConfig;

const SUCCESS_PAGE: &str = indoc! {r#"
    <!DOCTYPE html>
    <html>
      <head><title>DevCare</title></head>
      <body>
        <h2>Authentication successful!</h2>
        <p>You can close this window and return to your terminal.</p>
      </body>
    </html>
"#};

const MISSING_CODE_PAGE: &str = "Error: no code provided";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthTokens {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub scope: Option<String>,
}

fn default_token_type() -> String {
    "bearer".into()
}

#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub service_name: String,
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub token_url: String,
    pub scopes: Vec<String>,
    pub redirect_port: u16,
    /// The callback listener gives up after this long.
    pub callback_timeout: Duration,
}

impl OAuthConfig {
    /// GitHub OAuth app settings, with client credentials resolved from
    /// config or environment.
    ///
    /// # Errors
    /// `CredentialsNotConfigured` when the client id or secret is empty.
    pub fn github(config: &GitHubConfig) -> Result<Self, OAuthError> {
        let client_id = config.resolved_client_id();
        let client_secret = config.resolved_client_secret();
        if client_id.is_empty() || client_secret.is_empty() {
            return Err(OAuthError::CredentialsNotConfigured {
                service: "github".into(),
            });
        }

        let base = config.oauth_base.trim_end_matches('/');
        Ok(Self {
            service_name: "github".into(),
            client_id,
            client_secret,
            auth_url: format!("{base}/login/oauth/authorize"),
            token_url: format!("{base}/login/oauth/access_token"),
            scopes: config.scopes.clone(),
            redirect_port: config.redirect_port,
            callback_timeout: Duration::from_secs(config.callback_timeout_secs),
        })
    }

    pub fn redirect_uri(&self) -> String {
        format!("http://localhost:{}/callback", self.redirect_port)
    }

    pub fn auth_url_full(&self) -> String {
        let scopes = self.scopes.join(" ");
        format!(
            "{}?client_id={}&redirect_uri={}&scope={}",
            self.auth_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_uri()),
            urlencoding::encode(&scopes),
        )
    }
}

/// Run the full flow: listen -> open browser -> wait for callback -> exchange code.
///
/// # Errors
/// Fails if the port is taken, no callback arrives in time, the callback has
/// no code, or the token exchange fails.
pub async fn authorize(http: &Client, config: &OAuthConfig) -> Result<OAuthTokens, OAuthError> {
    let listener = TcpListener::bind(("127.0.0.1", config.redirect_port))
        .await
        .map_err(|e| {
            OAuthError::AuthorizationFailed(format!(
                "cannot listen on port {}: {e}",
                config.redirect_port
            ))
        })?;
    tracing::info!(port = config.redirect_port, "waiting for OAuth callback");

    let auth_url = config.auth_url_full();
    if let Err(e) = open::that(&auth_url) {
        tracing::warn!(error = %e, url = %auth_url, "could not open browser");
    }

    let code = receive_callback(&listener, config.callback_timeout).await?;
    drop(listener);

    exchange_code(http, config, &code).await
}

/// Serve the callback endpoint until a `/callback` request arrives or
/// `timeout` elapses. The listener is not used afterwards.
///
/// # Errors
/// `CallbackTimeout` when nothing arrives, `InvalidCallback` when the
/// callback carries no code.
pub async fn receive_callback(
    listener: &TcpListener,
    timeout: Duration,
) -> Result<String, OAuthError> {
    match tokio::time::timeout(timeout, serve_until_callback(listener)).await {
        Ok(result) => result,
        Err(_) => Err(OAuthError::CallbackTimeout {
            timeout_secs: timeout.as_secs(),
        }),
    }
}

async fn serve_until_callback(listener: &TcpListener) -> Result<String, OAuthError> {
    loop {
        let (mut stream, peer) = listener
            .accept()
            .await
            .map_err(|e| OAuthError::AuthorizationFailed(e.to_string()))?;
        let request = read_request(&mut stream).await?;

        if !is_callback(&request) {
            // Browsers also ask for /favicon.ico and the like.
            tracing::debug!(%peer, "ignoring non-callback request");
            respond(&mut stream, "404 Not Found", "text/plain", "Not found").await;
            continue;
        }

        return match extract_code(&request) {
            Some(code) => {
                respond(&mut stream, "200 OK", "text/html; charset=utf-8", SUCCESS_PAGE).await;
                Ok(code)
            }
            None => {
                respond(&mut stream, "400 Bad Request", "text/plain", MISSING_CODE_PAGE).await;
                Err(OAuthError::InvalidCallback("no code provided".into()))
            }
        };
    }
}

async fn read_request(stream: &mut TcpStream) -> Result<String, OAuthError> {
    let mut buf = [0u8; 4096];
    let n = stream
        .read(&mut buf)
        .await
        .map_err(|e| OAuthError::InvalidCallback(e.to_string()))?;
    Ok(String::from_utf8_lossy(&buf[..n]).into_owned())
}

async fn respond(stream: &mut TcpStream, status: &str, content_type: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        tracing::debug!(error = %e, "failed to answer callback request");
    }
    let _ = stream.shutdown().await;
}

fn request_target(request: &str) -> Option<url::Url> {
    let first_line = request.lines().next()?;
    let path = first_line.split_whitespace().nth(1)?;
    url::Url::parse(&format!("http://localhost{path}")).ok()
}

fn is_callback(request: &str) -> bool {
    request_target(request).is_some_and(|url| url.path() == "/callback")
}

/// Pull the `code` query parameter out of a raw HTTP request.
pub fn extract_code(request: &str) -> Option<String> {
    request_target(request)?
        .query_pairs()
        .find(|(k, v)| k == "code" && !v.is_empty())
        .map(|(_, v)| v.to_string())
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    code: &'a str,
    redirect_uri: String,
}

/// Exchange an authorization code for an access token.
///
/// # Errors
/// `TokenExchangeFailed` when the request fails or the response has no
/// `access_token`.
pub async fn exchange_code(
    http: &Client,
    config: &OAuthConfig,
    code: &str,
) -> Result<OAuthTokens, OAuthError> {
    let body = TokenRequest {
        client_id: &config.client_id,
        client_secret: &config.client_secret,
        code,
        redirect_uri: config.redirect_uri(),
    };

    let resp = http
        .post(&config.token_url)
        .header(reqwest::header::ACCEPT, "application/json")
        .json(&body)
        .send()
        .await
        .map_err(|e| OAuthError::TokenExchangeFailed(e.to_string()))?;

    let status = resp.status();
    let body: serde_json::Value = resp
        .json()
        .await
        .map_err(|e| OAuthError::TokenExchangeFailed(e.to_string()))?;

    if let Some(error) = body.get("error") {
        let error = error.as_str().unwrap_or("unknown error");
        let message = match body.get("error_description").and_then(|v| v.as_str()) {
            Some(description) => format!("{error}: {description}"),
            None => error.to_string(),
        };
        return Err(OAuthError::TokenExchangeFailed(message));
    }

    let access_token = body
        .get("access_token")
        .and_then(|v| v.as_str())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            tracing::warn!(%status, "token response without access_token");
            OAuthError::TokenExchangeFailed("no access token received".into())
        })?;

    Ok(OAuthTokens {
        access_token: access_token.to_string(),
        token_type: body
            .get("token_type")
            .and_then(|v| v.as_str())
            .unwrap_or("bearer")
            .to_string(),
        scope: body.get("scope").and_then(|v| v.as_str()).map(String::from),
    })
}
