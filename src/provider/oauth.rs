//! OAuth 2.0 access-token handling for the Gmail API.
//!
//! Works from an authorized-user token file (`token`, `refresh_token`,
//! `client_id`, `client_secret`, `expiry`). Expired tokens are refreshed
//! with the `refresh_token` grant and written back to the same file.
//! The first token file comes from the consent flow in
//! [`crate::provider::consent`].

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::AuthError;

/// Refresh this long before the recorded expiry.
const EXPIRY_SKEW_SECS: i64 = 60;

/// On-disk token format. Keys this crate does not know about (for
/// example `universe_domain`) are carried through untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct TokenFile {
    pub(crate) token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) token_uri: Option<String>,
    pub(crate) client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub(crate) scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) expiry: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub(crate) extra: serde_json::Map<String, serde_json::Value>,
}

/// In-memory credentials; secrets never hit logs.
struct Credentials {
    access_token: SecretString,
    refresh_token: Option<SecretString>,
    token_uri: Option<String>,
    client_id: String,
    client_secret: Option<SecretString>,
    scopes: Vec<String>,
    expiry: Option<DateTime<Utc>>,
    extra: serde_json::Map<String, serde_json::Value>,
}

impl From<TokenFile> for Credentials {
    fn from(file: TokenFile) -> Self {
        Self {
            access_token: SecretString::from(file.token),
            refresh_token: file.refresh_token.map(SecretString::from),
            token_uri: file.token_uri,
            client_id: file.client_id,
            client_secret: file.client_secret.map(SecretString::from),
            scopes: file.scopes,
            expiry: file.expiry,
            extra: file.extra,
        }
    }
}

impl Credentials {
    fn to_file(&self) -> TokenFile {
        TokenFile {
            token: self.access_token.expose_secret().to_owned(),
            refresh_token: self
                .refresh_token
                .as_ref()
                .map(|s| s.expose_secret().to_owned()),
            token_uri: self.token_uri.clone(),
            client_id: self.client_id.clone(),
            client_secret: self
                .client_secret
                .as_ref()
                .map(|s| s.expose_secret().to_owned()),
            scopes: self.scopes.clone(),
            expiry: self.expiry,
            extra: self.extra.clone(),
        }
    }
}

/// Token endpoint response, shared by the refresh and code-exchange grants.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub(crate) access_token: String,
    #[serde(default)]
    pub(crate) expires_in: Option<u64>,
    #[serde(default)]
    pub(crate) refresh_token: Option<String>,
    #[serde(default)]
    pub(crate) scope: Option<String>,
}

impl TokenResponse {
    pub(crate) fn expiry(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.expires_in.map(|secs| now + Duration::seconds(secs as i64))
    }
}

/// POST a form to the token endpoint and decode the token response.
pub(crate) async fn request_token(
    http: &reqwest::Client,
    url: &str,
    params: &[(&str, &str)],
) -> Result<TokenResponse, AuthError> {
    let response = http
        .post(url)
        .form(params)
        .send()
        .await
        .map_err(|e| AuthError::TokenEndpoint(e.to_string()))?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        warn!(status, "Token endpoint rejected the request");
        return Err(AuthError::TokenRejected { status, body });
    }

    response
        .json()
        .await
        .map_err(|e| AuthError::TokenEndpoint(e.to_string()))
}

/// Whether a token with `expiry` should be refreshed at `now`.
///
/// Tokens without a recorded expiry are treated as valid.
pub fn needs_refresh(expiry: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    expiry.is_some_and(|exp| exp <= now + Duration::seconds(EXPIRY_SKEW_SECS))
}

/// Loads, caches and refreshes the access token.
pub struct TokenManager {
    path: PathBuf,
    default_token_url: String,
    http: reqwest::Client,
    credentials: Mutex<Option<Credentials>>,
}

impl TokenManager {
    pub fn new(path: impl Into<PathBuf>, default_token_url: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            default_token_url: default_token_url.into(),
            http: reqwest::Client::new(),
            credentials: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A currently valid access token, refreshing it first if needed.
    pub async fn access_token(&self) -> Result<SecretString, AuthError> {
        let mut guard = self.credentials.lock().await;

        if guard.is_none() {
            *guard = Some(load_token_file(&self.path)?.into());
            debug!(path = %self.path.display(), "Token file loaded");
        }

        let Some(creds) = guard.as_mut() else {
            return Err(AuthError::InvalidTokenFile("token not loaded".into()));
        };

        if needs_refresh(creds.expiry, Utc::now()) {
            self.refresh(creds).await?;
            save_token_file(&self.path, &creds.to_file())?;
            info!(path = %self.path.display(), "Access token refreshed");
        }

        Ok(SecretString::from(
            creds.access_token.expose_secret().to_owned(),
        ))
    }

    async fn refresh(&self, creds: &mut Credentials) -> Result<(), AuthError> {
        let url = creds
            .token_uri
            .clone()
            .unwrap_or_else(|| self.default_token_url.clone());

        let token = {
            let Some(refresh_token) = creds.refresh_token.as_ref() else {
                return Err(AuthError::NoRefreshToken);
            };

            let mut params = vec![
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.expose_secret()),
                ("client_id", creds.client_id.as_str()),
            ];
            if let Some(secret) = creds.client_secret.as_ref() {
                params.push(("client_secret", secret.expose_secret()));
            }

            debug!(url = %url, "Refreshing access token");
            request_token(&self.http, &url, &params).await?
        };

        creds.expiry = token.expiry(Utc::now());
        creds.access_token = SecretString::from(token.access_token);
        // Google only returns a new refresh token when it rotates one.
        if let Some(new_refresh) = token.refresh_token {
            creds.refresh_token = Some(SecretString::from(new_refresh));
        }
        Ok(())
    }
}

fn load_token_file(path: &Path) -> Result<TokenFile, AuthError> {
    if !path.exists() {
        return Err(AuthError::MissingTokenFile(path.to_path_buf()));
    }
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw).map_err(|e| AuthError::InvalidTokenFile(e.to_string()))
}

/// Write the token file through a sibling temp file so a crash never
/// leaves a half-written token behind. Owner-only on Unix.
pub(crate) fn save_token_file(path: &Path, file: &TokenFile) -> Result<(), AuthError> {
    let json = serde_json::to_string_pretty(file)
        .map_err(|e| AuthError::InvalidTokenFile(e.to_string()))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    {
        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut tmp_file = options.open(&tmp_path)?;
        tmp_file.write_all(json.as_bytes())?;
        tmp_file.sync_all()?;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))?;
    }

    std::fs::rename(&tmp_path, path)?;
    Ok(())
}
