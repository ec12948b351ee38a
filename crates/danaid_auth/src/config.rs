//! Server configuration: key and data directories, TTLs, token secret.
//!
//! Resolution order: built-in defaults, then an optional JSON file, then
//! `DANAID_*` environment variables.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

pub const APP_QUALIFIER: &str = "com";
pub const APP_ORG: &str = "danaid";
pub const APP_NAME: &str = "chat";

pub const DEFAULT_CHALLENGE_TTL_SECS: u64 = 5 * 60;
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 60 * 60;

pub const ENV_KEYS_DIR: &str = "DANAID_KEYS_DIR";
pub const ENV_DATA_DIR: &str = "DANAID_DATA_DIR";
pub const ENV_TOKEN_SECRET: &str = "DANAID_TOKEN_SECRET";
pub const ENV_CHALLENGE_TTL_SECS: &str = "DANAID_CHALLENGE_TTL_SECS";
pub const ENV_TOKEN_TTL_SECS: &str = "DANAID_TOKEN_TTL_SECS";

const PRIVATE_KEY_FILE: &str = "server_private.pem";
const PUBLIC_KEY_FILE: &str = "server_public.pem";
const TOKEN_SECRET_FILE: &str = "token_secret";

fn default_data_dir() -> PathBuf {
    ProjectDirs::from(APP_QUALIFIER, APP_ORG, APP_NAME)
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("danaid-data"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub keys_dir: PathBuf,
    pub data_dir: PathBuf,
    pub challenge_ttl_secs: u64,
    pub token_ttl_secs: u64,
    /// HMAC secret for session tokens. Falls back to `<keys_dir>/token_secret`.
    pub token_secret: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            keys_dir: data_dir.join("keys"),
            data_dir,
            challenge_ttl_secs: DEFAULT_CHALLENGE_TTL_SECS,
            token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
            token_secret: None,
        }
    }
}

impl AuthConfig {
    /// Defaults for everything under one directory. Used by tests and the
    /// CLI's `--data-dir`.
    pub fn rooted_at(dir: &Path) -> Self {
        Self {
            keys_dir: dir.join("keys"),
            data_dir: dir.to_path_buf(),
            ..Self::default()
        }
    }

    pub fn load(path: Option<&Path>) -> Result<Self, AuthError> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    AuthError::Configuration(format!("read {}: {e}", path.display()))
                })?;
                serde_json::from_str(&text).map_err(|e| {
                    AuthError::Configuration(format!("parse {}: {e}", path.display()))
                })?
            }
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Apply `DANAID_*` overrides from `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), AuthError> {
        if let Some(dir) = lookup(ENV_DATA_DIR) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup(ENV_KEYS_DIR) {
            self.keys_dir = PathBuf::from(dir);
        }
        if let Some(secret) = lookup(ENV_TOKEN_SECRET) {
            self.token_secret = Some(secret);
        }
        if let Some(ttl) = lookup(ENV_CHALLENGE_TTL_SECS) {
            self.challenge_ttl_secs = parse_secs(ENV_CHALLENGE_TTL_SECS, &ttl)?;
        }
        if let Some(ttl) = lookup(ENV_TOKEN_TTL_SECS) {
            self.token_ttl_secs = parse_secs(ENV_TOKEN_TTL_SECS, &ttl)?;
        }
        Ok(())
    }

    pub fn private_key_path(&self) -> PathBuf {
        self.keys_dir.join(PRIVATE_KEY_FILE)
    }

    pub fn public_key_path(&self) -> PathBuf {
        self.keys_dir.join(PUBLIC_KEY_FILE)
    }

    pub fn token_secret_path(&self) -> PathBuf {
        self.keys_dir.join(TOKEN_SECRET_FILE)
    }

    /// Client identity keys kept by the CLI.
    pub fn identities_dir(&self) -> PathBuf {
        self.data_dir.join("identities")
    }

    pub fn challenge_ttl(&self) -> chrono::Duration {
        secs_to_duration(self.challenge_ttl_secs)
    }

    pub fn token_ttl(&self) -> chrono::Duration {
        secs_to_duration(self.token_ttl_secs)
    }
}

fn parse_secs(name: &str, value: &str) -> Result<u64, AuthError> {
    value
        .trim()
        .parse()
        .map_err(|e| AuthError::Configuration(format!("{name}={value:?}: {e}")))
}

/// TTLs are clamped to ten years.
const MAX_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

fn secs_to_duration(secs: u64) -> chrono::Duration {
    chrono::Duration::seconds(secs.min(MAX_TTL_SECS) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults() {
        let config = AuthConfig::default();
        assert_eq!(config.challenge_ttl_secs, 300);
        assert_eq!(config.token_ttl_secs, 3600);
        assert!(config.token_secret.is_none());
        assert_eq!(config.private_key_path().file_name().unwrap(), "server_private.pem");
        assert_eq!(config.public_key_path().file_name().unwrap(), "server_public.pem");
    }

    #[test]
    fn file_then_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");
        std::fs::write(&path, r#"{ "token_ttl_secs": 60, "data_dir": "/srv/danaid" }"#).unwrap();

        let mut config = AuthConfig::load(Some(&path)).unwrap();
        assert_eq!(config.token_ttl_secs, 60);
        assert_eq!(config.data_dir, PathBuf::from("/srv/danaid"));
        assert_eq!(config.challenge_ttl_secs, 300);

        let env: HashMap<&str, &str> = [
            (ENV_CHALLENGE_TTL_SECS, "30"),
            (ENV_TOKEN_SECRET, "s3cret"),
        ]
        .into_iter()
        .collect();
        config
            .apply_env(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.challenge_ttl_secs, 30);
        assert_eq!(config.token_secret.as_deref(), Some("s3cret"));
    }

    #[test]
    fn bad_values_are_configuration_errors() {
        let mut config = AuthConfig::default();
        let err = config
            .apply_env(|name| (name == ENV_TOKEN_TTL_SECS).then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, AuthError::Configuration(_)));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(AuthConfig::load(Some(&path)), Err(AuthError::Configuration(_))));
    }
}
