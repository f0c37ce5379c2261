use std::path::PathBuf;

use tracing::debug;

use crate::config::{Config, ConfigError};

use super::{AuthError, Credential};

/// Persistence for the credential. Another `lade` process may write the same
/// store, so `load` always goes back to the source.
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Result<Credential, AuthError>;
    fn save(&self, credential: &Credential) -> Result<(), AuthError>;
}

/// Credential store backed by the YAML config file
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn default_location() -> Result<Self, ConfigError> {
        Ok(Self::new(Config::config_path()?))
    }
}

impl CredentialStore for ConfigStore {
    fn load(&self) -> Result<Credential, AuthError> {
        Ok(Config::load_from(&self.path)?.credential())
    }

    fn save(&self, credential: &Credential) -> Result<(), AuthError> {
        // Rewrite what is on disk, not the env-overridden view.
        let mut config = Config::read_file(&self.path)?;
        config.set_credential(credential);
        config.save_to(&self.path)?;
        debug!(path = %self.path.display(), "Credential saved");
        Ok(())
    }
}
