//! Application configuration management.
//!
//! The configuration holds the stored OAuth credential and optional endpoint
//! overrides. It is stored at `~/.lade/config.yaml`, and every field can be
//! overridden by the matching `LADE_*` environment variable.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::Credential;

/// Directory under the home directory holding the config file
const CONFIG_DIR: &str = ".lade";

/// Config file name
const CONFIG_FILE: &str = "config.yaml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not find home directory")]
    NoHomeDir,

    #[error("Config error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Config error: invalid value for {var}: {value}")]
    InvalidEnv { var: &'static str, value: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub access_token: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub refresh_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_url: Option<String>,
}

impl Config {
    /// Load the config from the default location, applying environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load the config from `path`, applying environment overrides
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::read_file(path)?;
        config.apply_env(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    /// Read only what is on disk. A missing or empty file is the default config.
    pub fn read_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(&contents)?)
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(value) = lookup("LADE_ACCESS_TOKEN") {
            self.access_token = value;
        }
        if let Some(value) = lookup("LADE_REFRESH_TOKEN") {
            self.refresh_token = value;
        }
        if let Some(value) = lookup("LADE_EXPIRY") {
            let expiry = DateTime::parse_from_rfc3339(&value).map_err(|_| ConfigError::InvalidEnv {
                var: "LADE_EXPIRY",
                value: value.clone(),
            })?;
            self.expiry = Some(expiry.with_timezone(&Utc));
        }
        if let Some(value) = lookup("LADE_API_URL") {
            self.api_url = Some(value);
        }
        if let Some(value) = lookup("LADE_AUTH_URL") {
            self.auth_url = Some(value);
        }
        if let Some(value) = lookup("LADE_TOKEN_URL") {
            self.token_url = Some(value);
        }
        Ok(())
    }

    /// Save the config to `path`. The file is only readable by the owner.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            create_config_dir(parent)?;
        }
        let contents = serde_yaml::to_string(self)?;

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(path)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(home.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    pub fn credential(&self) -> Credential {
        Credential {
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
            expiry: self.expiry,
        }
    }

    pub fn set_credential(&mut self, credential: &Credential) {
        self.access_token = credential.access_token.clone();
        self.refresh_token = credential.refresh_token.clone();
        self.expiry = credential.expiry;
    }
}

fn create_config_dir(dir: &Path) -> std::io::Result<()> {
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o755);
    }
    builder.create(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::read_file(&dir.path().join("config.yaml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_empty_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "\n").unwrap();
        assert_eq!(Config::read_file(&path).unwrap(), Config::default());
    }

    #[test]
    fn test_save_then_read_keeps_credential() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".lade").join("config.yaml");

        let mut config = Config {
            api_url: Some("http://localhost:8080".to_string()),
            ..Config::default()
        };
        config.set_credential(&Credential {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            expiry: Some(Utc.with_ymd_and_hms(2030, 1, 2, 3, 4, 5).unwrap()),
        });
        config.save_to(&path).unwrap();

        let loaded = Config::read_file(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.credential(), config.credential());
    }

    #[cfg(unix)]
    #[test]
    fn test_saved_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        Config::default().save_to(&path).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_empty_fields_are_not_written() {
        let yaml = serde_yaml::to_string(&Config {
            token_url: Some("http://auth/token".to_string()),
            ..Config::default()
        })
        .unwrap();
        assert!(yaml.contains("token_url"));
        assert!(!yaml.contains("access_token"));
        assert!(!yaml.contains("expiry"));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config {
            access_token: "from-file".to_string(),
            ..Config::default()
        };
        config
            .apply_env(env(&[
                ("LADE_ACCESS_TOKEN", "from-env"),
                ("LADE_EXPIRY", "2030-01-01T00:00:00Z"),
                ("LADE_TOKEN_URL", "http://auth/token"),
            ]))
            .unwrap();

        assert_eq!(config.access_token, "from-env");
        assert_eq!(config.expiry, Some(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()));
        assert_eq!(config.token_url.as_deref(), Some("http://auth/token"));
        assert!(config.api_url.is_none());
    }

    #[test]
    fn test_invalid_env_expiry() {
        let mut config = Config::default();
        let err = config
            .apply_env(env(&[("LADE_EXPIRY", "tomorrow")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { var: "LADE_EXPIRY", .. }));
    }
}
