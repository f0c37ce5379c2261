use std::io::Write;

use anyhow::{Context as _, Result};
use lade_core::auth::{OAuthClient, TokenManager};
use tracing::debug;

pub async fn execute(ctx: &super::Context) -> Result<()> {
    logout(&ctx.tokens, &ctx.oauth, &mut std::io::stdout()).await
}

/// Revoke the stored refresh token and forget the credential
pub async fn logout<W: Write>(tokens: &TokenManager, oauth: &OAuthClient, out: &mut W) -> Result<()> {
    let credential = tokens.current().await;
    if !credential.has_refresh_token() {
        writeln!(out, "Already logged out")?;
        return Ok(());
    }

    oauth
        .revoke(&credential.refresh_token)
        .await
        .context("Failed to revoke token")?;
    tokens.clear().await?;
    debug!("Stored credential cleared");
    writeln!(out, "Logout successful")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lade_core::auth::{AuthError, Credential, CredentialStore, LoginFlow, OAuthEndpoint};
    use std::sync::{Arc, Mutex};
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct MemoryStore(Mutex<Credential>);

    impl CredentialStore for MemoryStore {
        fn load(&self) -> Result<Credential, AuthError> {
            Ok(self.0.lock().unwrap().clone())
        }

        fn save(&self, credential: &Credential) -> Result<(), AuthError> {
            *self.0.lock().unwrap() = credential.clone();
            Ok(())
        }
    }

    struct NoLogin;

    #[async_trait]
    impl LoginFlow for NoLogin {
        async fn login(&self) -> Result<Credential, AuthError> {
            Err(AuthError::Interrupted)
        }
    }

    fn setup(server: &MockServer, stored: Credential) -> (Arc<MemoryStore>, TokenManager, Arc<OAuthClient>) {
        let endpoint = OAuthEndpoint {
            auth_url: format!("{}/oauth2/auth", server.uri()),
            token_url: format!("{}/oauth2/token", server.uri()),
        };
        let oauth = Arc::new(OAuthClient::new(endpoint).unwrap());
        let store = Arc::new(MemoryStore(Mutex::new(stored)));
        let tokens = TokenManager::new(store.clone(), oauth.clone(), Arc::new(NoLogin)).unwrap();
        (store, tokens, oauth)
    }

    #[tokio::test]
    async fn test_logout_revokes_and_clears() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/revoke"))
            .and(body_string_contains("token=refresh-1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let stored = Credential {
            access_token: "access-1".to_string(),
            refresh_token: "refresh-1".to_string(),
            expiry: None,
        };
        let (store, tokens, oauth) = setup(&server, stored);

        let mut out = Vec::new();
        logout(&tokens, &oauth, &mut out).await.unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "Logout successful\n");
        assert_eq!(store.load().unwrap(), Credential::default());
    }

    #[tokio::test]
    async fn test_logout_without_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let (_, tokens, oauth) = setup(&server, Credential::default());

        let mut out = Vec::new();
        logout(&tokens, &oauth, &mut out).await.unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "Already logged out\n");
    }

    #[tokio::test]
    async fn test_failed_revoke_keeps_credential() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/revoke"))
            .respond_with(ResponseTemplate::new(500).set_body_string("revocation failed"))
            .mount(&server)
            .await;

        let stored = Credential {
            access_token: "access-1".to_string(),
            refresh_token: "refresh-1".to_string(),
            expiry: None,
        };
        let (store, tokens, oauth) = setup(&server, stored.clone());

        let mut out = Vec::new();
        assert!(logout(&tokens, &oauth, &mut out).await.is_err());
        assert_eq!(store.load().unwrap(), stored);
    }
}
