//! Interactive username/password login.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{AuthError, Credential, OAuthErrorKind, TokenExchange};

/// UI boundary for the login prompt. Implementations block on user input.
pub trait Prompter: Send + Sync {
    fn announce(&self, message: &str);
    fn ask_username(&self) -> io::Result<String>;
    fn ask_password(&self) -> io::Result<String>;
}

/// Produces a fresh credential by asking the user to log in
#[async_trait]
pub trait LoginFlow: Send + Sync {
    async fn login(&self) -> Result<Credential, AuthError>;
}

pub struct InteractiveLogin {
    exchange: Arc<dyn TokenExchange>,
    prompter: Arc<dyn Prompter>,
}

struct Answers {
    username: String,
    password: String,
}

impl InteractiveLogin {
    pub fn new(exchange: Arc<dyn TokenExchange>, prompter: Arc<dyn Prompter>) -> Self {
        Self { exchange, prompter }
    }

    async fn ask(&self) -> Result<Answers, AuthError> {
        let prompter = Arc::clone(&self.prompter);
        tokio::task::spawn_blocking(move || {
            prompter.announce("Enter your Lade credentials:");
            let username = ask_required(|| prompter.ask_username())?.trim().to_string();
            let password = ask_required(|| prompter.ask_password())?;
            Ok(Answers { username, password })
        })
        .await
        .map_err(|e| AuthError::Prompt(io::Error::other(e)))?
    }
}

/// Repeat a prompt until it yields a non-empty answer
fn ask_required(mut ask: impl FnMut() -> io::Result<String>) -> Result<String, AuthError> {
    loop {
        match ask() {
            Ok(answer) if answer.trim().is_empty() => continue,
            Ok(answer) => return Ok(answer),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Err(AuthError::Interrupted),
            Err(e) => return Err(AuthError::Prompt(e)),
        }
    }
}

#[async_trait]
impl LoginFlow for InteractiveLogin {
    async fn login(&self) -> Result<Credential, AuthError> {
        loop {
            let answers = self.ask().await?;
            match self
                .exchange
                .password_grant(&answers.username, &answers.password)
                .await
            {
                Ok(credential) => {
                    info!(username = %answers.username, "Logged in");
                    self.prompter
                        .announce(&format!("Logged in as {}", answers.username));
                    return Ok(credential);
                }
                Err(AuthError::InvalidCredential { kind: OAuthErrorKind::InvalidGrant, .. }) => {
                    self.prompter
                        .announce("Invalid username or password. Please try again.");
                }
                Err(AuthError::InvalidCredential { kind: OAuthErrorKind::EmailNotVerified, .. }) => {
                    self.prompter
                        .announce("Your email is not verified. Please check your inbox.");
                }
                Err(err @ AuthError::Connectivity(_)) => return Err(err),
                Err(err) => {
                    debug!(error = %err, "Login failed");
                    return Err(AuthError::Server(format!("Login failed: {}", err)));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Scripted prompter recording what it announced
    struct ScriptedPrompter {
        answers: Mutex<VecDeque<io::Result<String>>>,
        announced: Mutex<Vec<String>>,
    }

    impl ScriptedPrompter {
        fn new(answers: Vec<io::Result<String>>) -> Self {
            Self {
                answers: Mutex::new(answers.into()),
                announced: Mutex::new(Vec::new()),
            }
        }

        fn next(&self) -> io::Result<String> {
            self.answers
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(io::Error::new(io::ErrorKind::UnexpectedEof, "no more answers")))
        }

        fn announced(&self) -> Vec<String> {
            self.announced.lock().unwrap().clone()
        }
    }

    impl Prompter for ScriptedPrompter {
        fn announce(&self, message: &str) {
            self.announced.lock().unwrap().push(message.to_string());
        }
        fn ask_username(&self) -> io::Result<String> {
            self.next()
        }
        fn ask_password(&self) -> io::Result<String> {
            self.next()
        }
    }

    /// Password grant that answers from a script of results
    struct ScriptedExchange {
        results: Mutex<VecDeque<Result<Credential, AuthError>>>,
        attempts: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedExchange {
        fn new(results: Vec<Result<Credential, AuthError>>) -> Self {
            Self {
                results: Mutex::new(results.into()),
                attempts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TokenExchange for ScriptedExchange {
        async fn password_grant(&self, username: &str, password: &str) -> Result<Credential, AuthError> {
            self.attempts
                .lock()
                .unwrap()
                .push((username.to_string(), password.to_string()));
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected password grant")
        }

        async fn refresh_grant(&self, _refresh_token: &str) -> Result<Credential, AuthError> {
            unreachable!("login never refreshes")
        }
    }

    fn token() -> Credential {
        Credential {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            expiry: None,
        }
    }

    fn rejected(kind: OAuthErrorKind) -> AuthError {
        AuthError::InvalidCredential { kind, message: "rejected".to_string() }
    }

    #[tokio::test]
    async fn test_login_success() {
        let prompter = Arc::new(ScriptedPrompter::new(vec![
            Ok("alice".to_string()),
            Ok("secret".to_string()),
        ]));
        let exchange = Arc::new(ScriptedExchange::new(vec![Ok(token())]));
        let login = InteractiveLogin::new(exchange.clone(), prompter.clone());

        assert_eq!(login.login().await.unwrap(), token());
        assert_eq!(
            exchange.attempts.lock().unwrap().as_slice(),
            &[("alice".to_string(), "secret".to_string())]
        );
        assert!(prompter.announced().contains(&"Logged in as alice".to_string()));
    }

    #[tokio::test]
    async fn test_login_reprompts_on_rejected_password() {
        let prompter = Arc::new(ScriptedPrompter::new(vec![
            Ok("alice".to_string()),
            Ok("wrong".to_string()),
            Ok("alice".to_string()),
            Ok("unverified".to_string()),
            Ok("alice".to_string()),
            Ok("right".to_string()),
        ]));
        let exchange = Arc::new(ScriptedExchange::new(vec![
            Err(rejected(OAuthErrorKind::InvalidGrant)),
            Err(rejected(OAuthErrorKind::EmailNotVerified)),
            Ok(token()),
        ]));
        let login = InteractiveLogin::new(exchange.clone(), prompter.clone());

        login.login().await.unwrap();
        assert_eq!(exchange.attempts.lock().unwrap().len(), 3);
        let announced = prompter.announced();
        assert!(announced.iter().any(|m| m.starts_with("Invalid username or password")));
        assert!(announced.iter().any(|m| m.starts_with("Your email is not verified")));
    }

    #[tokio::test]
    async fn test_login_fails_hard_on_other_errors() {
        let prompter = Arc::new(ScriptedPrompter::new(vec![
            Ok("alice".to_string()),
            Ok("secret".to_string()),
        ]));
        let exchange = Arc::new(ScriptedExchange::new(vec![Err(AuthError::Server(
            "internal error".to_string(),
        ))]));
        let login = InteractiveLogin::new(exchange, prompter);

        assert!(matches!(login.login().await, Err(AuthError::Server(_))));
    }

    #[tokio::test]
    async fn test_login_keeps_connectivity_error() {
        let prompter = Arc::new(ScriptedPrompter::new(vec![
            Ok("alice".to_string()),
            Ok("secret".to_string()),
        ]));
        let exchange = Arc::new(ScriptedExchange::new(vec![Err(AuthError::Connectivity(
            "refused".to_string(),
        ))]));
        let login = InteractiveLogin::new(exchange, prompter);

        assert!(matches!(login.login().await, Err(AuthError::Connectivity(_))));
    }

    #[tokio::test]
    async fn test_interrupted_prompt() {
        let prompter = Arc::new(ScriptedPrompter::new(vec![Err(io::Error::new(
            io::ErrorKind::Interrupted,
            "ctrl-c",
        ))]));
        let exchange = Arc::new(ScriptedExchange::new(vec![]));
        let login = InteractiveLogin::new(exchange.clone(), prompter);

        assert!(matches!(login.login().await, Err(AuthError::Interrupted)));
        assert!(exchange.attempts.lock().unwrap().is_empty());
    }

    #[test]
    fn test_ask_required_skips_blank_answers() {
        let mut answers = vec![Ok("  ".to_string()), Ok(String::new()), Ok(" bob ".to_string())].into_iter();
        let answer = ask_required(|| answers.next().unwrap()).unwrap();
        assert_eq!(answer, " bob ");
    }
}
