//! The shared credential every API call goes through.
//!
//! `TokenManager` hands out a credential that is valid at return time. When
//! the in-memory credential has expired it reloads the store (another `lade`
//! process may have refreshed it), then refreshes over the network, and only
//! when the refresh token itself is rejected does it fall back to an
//! interactive login.
//!
//! All credential reads and writes happen under one async mutex which is held
//! across the refresh request, so concurrent callers share a single refresh:
//! whoever waits on the lock finds the refreshed credential already in place.
//! The exit handler takes the same lock before terminating the process, so a
//! refresh that is being persisted is never cut short.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::shutdown;
use crate::stream::terminal::{CrosstermTerminal, Terminal};

use super::{AuthError, Credential, CredentialStore, LoginFlow, TokenExchange};

/// Exit status after a termination signal
const SIGNAL_EXIT_STATUS: i32 = 0;

struct TokenState {
    credential: Credential,
    /// Refresh token the server already turned down, so waiting callers don't retry it
    rejected_refresh_token: Option<String>,
}

pub struct TokenManager {
    state: Mutex<TokenState>,
    login_gate: Mutex<()>,
    store: Arc<dyn CredentialStore>,
    exchange: Arc<dyn TokenExchange>,
    login: Arc<dyn LoginFlow>,
}

impl TokenManager {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        exchange: Arc<dyn TokenExchange>,
        login: Arc<dyn LoginFlow>,
    ) -> Result<Self, AuthError> {
        let credential = store.load()?;
        debug!(
            valid = credential.is_valid(),
            minutes_left = ?credential.minutes_until_expiry(),
            "Loaded stored credential"
        );
        Ok(Self {
            state: Mutex::new(TokenState {
                credential,
                rejected_refresh_token: None,
            }),
            login_gate: Mutex::new(()),
            store,
            exchange,
            login,
        })
    }

    /// Return a credential that is valid now, refreshing or logging in as needed.
    ///
    /// Connectivity and server failures are returned as-is; only a rejected or
    /// missing refresh token leads to the login prompt.
    pub async fn get_token(&self) -> Result<Credential, AuthError> {
        match self.refresh_if_needed().await {
            Err(err) if err.needs_login() => {
                info!(error = %err, "Stored credential rejected, logging in");
                self.login_if_needed().await
            }
            result => result,
        }
    }

    async fn refresh_if_needed(&self) -> Result<Credential, AuthError> {
        let mut state = self.state.lock().await;
        if state.credential.is_valid() {
            return Ok(state.credential.clone());
        }

        state.credential = self.store.load()?;
        if state.credential.is_valid() {
            debug!("Using credential refreshed by another process");
            return Ok(state.credential.clone());
        }

        let refresh_token = state.credential.refresh_token.clone();
        if refresh_token.is_empty() {
            return Err(AuthError::missing_refresh_token());
        }
        if state.rejected_refresh_token.as_deref() == Some(refresh_token.as_str()) {
            return Err(AuthError::InvalidCredential {
                kind: super::OAuthErrorKind::InvalidGrant,
                message: "refresh token was rejected".to_string(),
            });
        }

        debug!("Refreshing access token");
        let refreshed = match self.exchange.refresh_grant(&refresh_token).await {
            Ok(refreshed) => refreshed,
            Err(err) => {
                if err.needs_login() {
                    state.rejected_refresh_token = Some(refresh_token);
                }
                warn!(error = %err, "Token refresh failed");
                return Err(err);
            }
        };

        state.credential = refreshed.clone();
        self.store.save(&refreshed)?;
        info!(minutes_left = ?refreshed.minutes_until_expiry(), "Access token refreshed");
        Ok(refreshed)
    }

    /// Prompt for a login and persist the result, whatever the current state.
    pub async fn login(&self) -> Result<Credential, AuthError> {
        let _gate = self.login_gate.lock().await;
        self.login_locked().await
    }

    async fn login_if_needed(&self) -> Result<Credential, AuthError> {
        let _gate = self.login_gate.lock().await;
        {
            let state = self.state.lock().await;
            if state.credential.is_valid() {
                // Another caller logged in while we waited.
                return Ok(state.credential.clone());
            }
        }
        self.login_locked().await
    }

    // The prompt runs without the credential lock so an interrupt can still exit.
    async fn login_locked(&self) -> Result<Credential, AuthError> {
        let fresh = self.login.login().await?;
        let mut state = self.state.lock().await;
        state.credential = fresh.clone();
        state.rejected_refresh_token = None;
        self.store.save(&fresh)?;
        Ok(fresh)
    }

    /// The credential as currently held, valid or not
    pub async fn current(&self) -> Credential {
        self.state.lock().await.credential.clone()
    }

    /// Forget the credential in memory and in the store
    pub async fn clear(&self) -> Result<(), AuthError> {
        let mut state = self.state.lock().await;
        state.credential = Credential::default();
        state.rejected_refresh_token = None;
        self.store.save(&state.credential)
    }

    /// Wait until no credential write is in progress, then put `terminal`
    /// back into its original mode. Returns the status to exit with.
    pub(crate) async fn prepare_exit(&self, terminal: &dyn Terminal) -> i32 {
        let _state = self.state.lock().await;
        if let Err(e) = terminal.restore() {
            warn!(error = %e, "Failed to restore terminal");
        }
        SIGNAL_EXIT_STATUS
    }

    /// Exit the process on Ctrl+C or SIGTERM, but only once no credential write
    /// is in progress. The terminal is restored first if it is in raw mode.
    pub fn install_exit_handler(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            shutdown::wait_for_shutdown_signal().await;
            let status = manager.prepare_exit(&CrosstermTerminal).await;
            std::process::exit(status);
        })
    }
}
