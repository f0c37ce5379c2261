//! Authentication module for managing the OAuth credential lifecycle.
//!
//! This module provides:
//! - `Credential`: access/refresh token pair with expiry
//! - `CredentialStore`: persistence of the credential in the config file
//! - `OAuthClient`: password, refresh and revocation requests
//! - `InteractiveLogin`: the username/password prompt loop
//! - `TokenManager`: the shared, lazily-refreshed credential every API call goes through

pub mod credential;
pub mod error;
pub mod login;
pub mod manager;
pub mod oauth;
pub mod store;

pub use credential::Credential;
pub use error::{AuthError, OAuthErrorKind};
pub use login::{InteractiveLogin, LoginFlow, Prompter};
pub use manager::TokenManager;
pub use oauth::{OAuthClient, OAuthEndpoint, TokenExchange};
pub use store::{ConfigStore, CredentialStore};
