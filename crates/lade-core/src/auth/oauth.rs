//! OAuth2 token endpoint client.
//!
//! Implements the password and refresh grants used by login and token
//! refresh, and refresh-token revocation used by logout. Failures are sorted
//! into the three kinds the token manager acts on: connectivity, server
//! fault, and rejected credential.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::Config;

use super::{AuthError, Credential, OAuthErrorKind};

/// Client ID the CLI identifies itself with
pub const DEFAULT_CLIENT_ID: &str = "lade-cli";

const DEFAULT_AUTH_URL: &str = "https://lade.io/oauth2/auth";
const DEFAULT_TOKEN_URL: &str = "https://lade.io/oauth2/token";

/// HTTP request timeout in seconds for token requests
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum length of a server message surfaced to the user
const MAX_MESSAGE_LENGTH: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthEndpoint {
    pub auth_url: String,
    pub token_url: String,
}

impl Default for OAuthEndpoint {
    fn default() -> Self {
        Self {
            auth_url: DEFAULT_AUTH_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
        }
    }
}

impl OAuthEndpoint {
    pub fn from_config(config: &Config) -> Self {
        let mut endpoint = Self::default();
        if let Some(ref url) = config.auth_url {
            endpoint.auth_url = url.clone();
        }
        if let Some(ref url) = config.token_url {
            endpoint.token_url = url.clone();
        }
        endpoint
    }

    /// The revocation endpoint sits next to the token endpoint
    pub fn revoke_url(&self) -> String {
        self.token_url.replacen("token", "revoke", 1)
    }
}

/// Token grants the token manager and login flow depend on
#[async_trait]
pub trait TokenExchange: Send + Sync {
    async fn password_grant(&self, username: &str, password: &str) -> Result<Credential, AuthError>;
    async fn refresh_grant(&self, refresh_token: &str) -> Result<Credential, AuthError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(rename = "type")]
    kind: Option<String>,
    error: Option<String>,
    message: Option<String>,
    error_description: Option<String>,
}

#[derive(Clone)]
pub struct OAuthClient {
    client: Client,
    endpoint: OAuthEndpoint,
    client_id: String,
}

impl OAuthClient {
    pub fn new(endpoint: OAuthEndpoint) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AuthError::Server(e.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            client_id: DEFAULT_CLIENT_ID.to_string(),
        })
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<Credential, AuthError> {
        let response = self
            .client
            .post(&self.endpoint.token_url)
            .form(params)
            .send()
            .await
            .map_err(classify_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Server(format!("Invalid token response: {}", e)))?;

        Ok(Credential {
            access_token: token.access_token,
            refresh_token: token.refresh_token.unwrap_or_default(),
            expiry: token
                .expires_in
                .filter(|secs| *secs > 0)
                .map(|secs| Utc::now() + chrono::Duration::seconds(secs)),
        })
    }

    /// Revoke a refresh token. Anything but 200 is a server error.
    pub async fn revoke(&self, refresh_token: &str) -> Result<(), AuthError> {
        let response = self
            .client
            .post(self.endpoint.revoke_url())
            .basic_auth(&self.client_id, Some(""))
            .form(&[("token", refresh_token), ("token_type_hint", "refresh_token")])
            .send()
            .await
            .map_err(classify_send_error)?;

        if response.status() != StatusCode::OK {
            let status = response.status();
            warn!(%status, "Token revocation failed");
            return Err(AuthError::Server(format!("Token revocation failed: {}", status)));
        }
        Ok(())
    }
}

#[async_trait]
impl TokenExchange for OAuthClient {
    async fn password_grant(&self, username: &str, password: &str) -> Result<Credential, AuthError> {
        debug!(username = username, "Requesting password grant");
        self.token_request(&[
            ("grant_type", "password"),
            ("client_id", &self.client_id),
            ("username", username),
            ("password", password),
        ])
        .await
    }

    async fn refresh_grant(&self, refresh_token: &str) -> Result<Credential, AuthError> {
        if refresh_token.is_empty() {
            return Err(AuthError::missing_refresh_token());
        }
        debug!("Requesting refresh grant");
        let mut credential = self
            .token_request(&[
                ("grant_type", "refresh_token"),
                ("client_id", &self.client_id),
                ("refresh_token", refresh_token),
            ])
            .await?;

        // Servers that don't rotate refresh tokens leave it out of the response.
        if credential.refresh_token.is_empty() {
            credential.refresh_token = refresh_token.to_string();
        }
        Ok(credential)
    }
}

fn classify_send_error(err: reqwest::Error) -> AuthError {
    if err.is_connect() || err.is_timeout() {
        AuthError::Connectivity(err.to_string())
    } else {
        AuthError::Server(err.to_string())
    }
}

/// Sort a non-success token endpoint response. Server faults carry the first
/// line of the body; client errors carry the structured error type.
fn classify_status(status: StatusCode, body: &str) -> AuthError {
    if status.is_server_error() {
        let first_line = body.lines().map(str::trim).find(|line| !line.is_empty());
        let message = match first_line {
            Some(line) => truncate(line),
            None => status.to_string(),
        };
        return AuthError::Server(message);
    }

    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let kind = OAuthErrorKind::parse(parsed.kind.as_deref().or(parsed.error.as_deref()));
    let message = parsed
        .message
        .or(parsed.error_description)
        .unwrap_or_else(|| status.to_string());

    AuthError::InvalidCredential {
        kind,
        message: truncate(&message),
    }
}

fn truncate(message: &str) -> String {
    if message.len() <= MAX_MESSAGE_LENGTH {
        message.to_string()
    } else {
        let cut: String = message.chars().take(MAX_MESSAGE_LENGTH).collect();
        format!("{}...", cut)
    }
}
