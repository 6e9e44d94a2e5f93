//! Error types for mail-rules.

use std::path::PathBuf;

/// Error type for fetches and rules passes.
///
/// Credential problems reach it as `Provider(ProviderError::Auth(_))`.
/// Config, rules-file and consent errors are returned directly by the
/// functions that produce them.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Errors talking to the mail provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// OAuth credential errors. Fatal for a whole pass.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Token file not found: {}", .0.display())]
    MissingTokenFile(PathBuf),

    #[error("Token file is invalid: {0}")]
    InvalidTokenFile(String),

    #[error("Access token expired and no refresh token is available")]
    NoRefreshToken,

    #[error("Token endpoint unreachable: {0}")]
    TokenEndpoint(String),

    #[error("Token endpoint returned {status}: {body}")]
    TokenRejected { status: u16, body: String },

    #[error("Client secrets file not found: {}", .0.display())]
    MissingClientSecrets(PathBuf),

    #[error("Client secrets file is invalid: {0}")]
    InvalidClientSecrets(String),

    #[error("Authorization failed: {0}")]
    Consent(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AuthError {
    /// Whether the stored token is unusable and only a new consent can fix it.
    pub fn needs_consent(&self) -> bool {
        match self {
            Self::MissingTokenFile(_) | Self::InvalidTokenFile(_) | Self::NoRefreshToken => true,
            // invalid_grant: revoked or expired refresh token
            Self::TokenRejected { status, .. } => matches!(status, 400 | 401),
            _ => false,
        }
    }
}

/// Rule file errors.
#[derive(Debug, thiserror::Error)]
pub enum RulesError {
    #[error("Failed to read rules file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse rules file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
