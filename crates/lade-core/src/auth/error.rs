use thiserror::Error;

use crate::config::ConfigError;

/// Machine-readable error `type` returned by the token endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OAuthErrorKind {
    InvalidGrant,
    EmailNotVerified,
    Other(String),
    Unknown,
}

impl OAuthErrorKind {
    pub fn parse(kind: Option<&str>) -> Self {
        match kind {
            Some("invalid_grant") => Self::InvalidGrant,
            Some("email_not_verified") => Self::EmailNotVerified,
            Some(other) if !other.is_empty() => Self::Other(other.to_string()),
            _ => Self::Unknown,
        }
    }
}

#[derive(Error, Debug)]
pub enum AuthError {
    /// The auth backend could not be reached. Never answered with a login prompt.
    #[error("Could not connect to the authentication server: {0}")]
    Connectivity(String),

    /// The auth backend reported a fault of its own.
    #[error("{0}")]
    Server(String),

    /// The stored refresh token (or the entered password) was rejected or is missing.
    #[error("Invalid credentials: {message}")]
    InvalidCredential {
        kind: OAuthErrorKind,
        message: String,
    },

    /// The user interrupted a login prompt.
    #[error("Interrupted")]
    Interrupted,

    #[error("Prompt failed: {0}")]
    Prompt(#[from] std::io::Error),

    #[error(transparent)]
    Storage(#[from] ConfigError),
}

impl AuthError {
    pub fn missing_refresh_token() -> Self {
        Self::InvalidCredential {
            kind: OAuthErrorKind::Unknown,
            message: "no refresh token stored".to_string(),
        }
    }

    /// Whether this failure should be answered by asking the user to log in again
    pub fn needs_login(&self) -> bool {
        matches!(self, Self::InvalidCredential { .. })
    }
}
