//! Command implementations.

pub mod addons;
pub mod deploy;
pub mod login;
pub mod logout;
pub mod logs;
pub mod run;

use std::sync::Arc;

use anyhow::{Context as _, Result};
use lade_core::api::ApiClient;
use lade_core::auth::{ConfigStore, InteractiveLogin, OAuthClient, OAuthEndpoint, TokenManager};
use lade_core::config::Config;

use crate::prompt::{LinePrompter, TerminalSource};

/// Shared services every command runs with
pub struct Context {
    pub tokens: Arc<TokenManager>,
    pub oauth: Arc<OAuthClient>,
    pub api: ApiClient,
}

impl Context {
    /// Wire up the credential, OAuth and API clients from the stored config
    /// and install the exit handler guarding credential writes.
    pub fn load() -> Result<Self> {
        let config = Config::load().context("Failed to load config")?;
        let store = Arc::new(ConfigStore::default_location()?);
        let oauth = Arc::new(OAuthClient::new(OAuthEndpoint::from_config(&config))?);
        let login = Arc::new(InteractiveLogin::new(oauth.clone(), Arc::new(LinePrompter::new(TerminalSource))));
        let tokens = Arc::new(TokenManager::new(store, oauth.clone(), login)?);
        tokens.install_exit_handler();

        let api = ApiClient::new(tokens.clone(), &config)?;
        Ok(Self { tokens, oauth, api })
    }
}
