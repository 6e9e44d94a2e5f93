//! Configuration types.

use std::path::PathBuf;

use crate::error::ConfigError;

const DEFAULT_DB_PATH: &str = "./data/mail-rules.db";
const DEFAULT_RULES_FILE: &str = "rules.json";
const DEFAULT_TOKEN_FILE: &str = "secrets/token.json";
const DEFAULT_CREDENTIALS_FILE: &str = "secrets/credentials.json";
const DEFAULT_FETCH_LIMIT: u32 = 10;
const DEFAULT_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";
const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Runtime configuration, built from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// libSQL database file.
    pub db_path: PathBuf,
    /// JSON rules file.
    pub rules_file: PathBuf,
    /// OAuth authorized-user token file.
    pub token_file: PathBuf,
    /// OAuth client secrets, used only to run the consent flow.
    pub credentials_file: PathBuf,
    /// How many recent messages one fetch lists.
    pub fetch_limit: u32,
    /// Per-user Gmail API root.
    pub api_base: String,
    /// OAuth token endpoint, used when the token file names none.
    pub token_url: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            rules_file: PathBuf::from(DEFAULT_RULES_FILE),
            token_file: PathBuf::from(DEFAULT_TOKEN_FILE),
            credentials_file: PathBuf::from(DEFAULT_CREDENTIALS_FILE),
            fetch_limit: DEFAULT_FETCH_LIMIT,
            api_base: DEFAULT_API_BASE.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
        }
    }
}

impl SyncConfig {
    /// Build config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup; unset keys keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let fetch_limit = match lookup("MAIL_RULES_FETCH_LIMIT") {
            Some(raw) => parse_fetch_limit(&raw)?,
            None => defaults.fetch_limit,
        };

        Ok(Self {
            db_path: lookup("MAIL_RULES_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            rules_file: lookup("MAIL_RULES_RULES_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.rules_file),
            token_file: lookup("MAIL_RULES_TOKEN_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.token_file),
            credentials_file: lookup("MAIL_RULES_CREDENTIALS_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.credentials_file),
            fetch_limit,
            api_base: lookup("MAIL_RULES_API_BASE").unwrap_or(defaults.api_base),
            token_url: lookup("MAIL_RULES_TOKEN_URL").unwrap_or(defaults.token_url),
        })
    }
}

fn parse_fetch_limit(raw: &str) -> Result<u32, ConfigError> {
    match raw.trim().parse::<u32>() {
        Ok(0) => Err(ConfigError::InvalidValue {
            key: "MAIL_RULES_FETCH_LIMIT".into(),
            message: "must be at least 1".into(),
        }),
        Ok(n) => Ok(n),
        Err(e) => Err(ConfigError::InvalidValue {
            key: "MAIL_RULES_FETCH_LIMIT".into(),
            message: e.to_string(),
        }),
    }
}
