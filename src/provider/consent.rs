//! Installed-app authorization: produces the first token file.
//!
//! Authorization-code flow with PKCE and a loopback redirect. The user
//! opens the printed URL, Google redirects the browser to a one-shot
//! listener on 127.0.0.1, and the code is exchanged for tokens that are
//! saved in the same format [`crate::provider::oauth::TokenManager`] reads.

use std::path::Path;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use rand::Rng;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::AuthError;
use crate::provider::oauth::{TokenFile, request_token, save_token_file};

/// Read, relabel and mark messages; no delete or send.
pub const GMAIL_MODIFY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.modify";

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";

/// OAuth client registration, as downloaded from the Google Cloud console.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub auth_uri: Option<String>,
    #[serde(default)]
    pub token_uri: Option<String>,
}

#[derive(Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    pub fn load(path: &Path) -> Result<Self, AuthError> {
        if !path.exists() {
            return Err(AuthError::MissingClientSecrets(path.to_path_buf()));
        }
        let raw = std::fs::read_to_string(path)?;
        Self::parse(&raw)
    }

    /// Accepts both the `installed` and `web` client layouts.
    pub fn parse(json: &str) -> Result<Self, AuthError> {
        let file: ClientSecretsFile = serde_json::from_str(json)
            .map_err(|e| AuthError::InvalidClientSecrets(e.to_string()))?;
        file.installed.or(file.web).ok_or_else(|| {
            AuthError::InvalidClientSecrets("expected an \"installed\" or \"web\" client".into())
        })
    }
}

/// PKCE verifier and its S256 challenge.
struct Pkce {
    verifier: String,
    challenge: String,
}

impl Pkce {
    fn generate() -> Self {
        let bytes: [u8; 32] = rand::thread_rng().r#gen();
        Self::from_verifier(URL_SAFE_NO_PAD.encode(bytes))
    }

    fn from_verifier(verifier: String) -> Self {
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Self {
            verifier,
            challenge,
        }
    }
}

fn random_state() -> String {
    let bytes: [u8; 32] = rand::thread_rng().r#gen();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Drives one consent.
pub struct ConsentFlow {
    secrets: ClientSecrets,
    scopes: Vec<String>,
    default_token_url: String,
    http: reqwest::Client,
}

impl ConsentFlow {
    /// `default_token_url` is used when the secrets file names no `token_uri`.
    pub fn new(secrets: ClientSecrets, default_token_url: impl Into<String>) -> Self {
        Self {
            secrets,
            scopes: vec![GMAIL_MODIFY_SCOPE.to_string()],
            default_token_url: default_token_url.into(),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    fn token_url(&self) -> &str {
        self.secrets
            .token_uri
            .as_deref()
            .unwrap_or(&self.default_token_url)
    }

    fn authorization_url(
        &self,
        redirect_uri: &str,
        state: &str,
        pkce: &Pkce,
    ) -> Result<String, AuthError> {
        let base = self.secrets.auth_uri.as_deref().unwrap_or(DEFAULT_AUTH_URI);
        let mut url = Url::parse(base)
            .map_err(|e| AuthError::InvalidClientSecrets(format!("auth_uri: {e}")))?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.secrets.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", &self.scopes.join(" "))
            .append_pair("state", state)
            .append_pair("code_challenge", &pkce.challenge)
            .append_pair("code_challenge_method", "S256")
            // offline + consent so Google always returns a refresh token
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent");
        Ok(url.to_string())
    }

    /// Bind the loopback listener and build the URL the user must open.
    pub async fn start(&self) -> Result<PendingConsent<'_>, AuthError> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        let redirect_uri = format!("http://127.0.0.1:{port}/");
        let state = random_state();
        let pkce = Pkce::generate();
        let url = self.authorization_url(&redirect_uri, &state, &pkce)?;
        debug!(redirect_uri = %redirect_uri, "Waiting for authorization redirect");

        Ok(PendingConsent {
            flow: self,
            listener,
            redirect_uri,
            state,
            pkce,
            url,
        })
    }
}

/// A started consent waiting for the browser redirect.
pub struct PendingConsent<'a> {
    flow: &'a ConsentFlow,
    listener: TcpListener,
    redirect_uri: String,
    state: String,
    pkce: Pkce,
    url: String,
}

impl PendingConsent<'_> {
    /// URL to open in a browser.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Wait for the redirect, exchange the code and write `token_path`.
    pub async fn complete(self, token_path: &Path, timeout: Duration) -> Result<(), AuthError> {
        let code = tokio::time::timeout(timeout, wait_for_code(&self.listener, &self.state))
            .await
            .map_err(|_| {
                AuthError::Consent(format!("no redirect within {}s", timeout.as_secs()))
            })??;

        let flow = self.flow;
        let token = {
            let mut params = vec![
                ("grant_type", "authorization_code"),
                ("code", code.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("client_id", flow.secrets.client_id.as_str()),
                ("code_verifier", self.pkce.verifier.as_str()),
            ];
            if let Some(secret) = flow.secrets.client_secret.as_deref() {
                params.push(("client_secret", secret));
            }
            request_token(&flow.http, flow.token_url(), &params).await?
        };

        if token.refresh_token.is_none() {
            warn!("No refresh token returned; authorization will be needed again on expiry");
        }
        let scopes = match token.scope.as_deref() {
            Some(granted) => granted.split_whitespace().map(String::from).collect(),
            None => flow.scopes.clone(),
        };

        let file = TokenFile {
            expiry: token.expiry(Utc::now()),
            token: token.access_token,
            refresh_token: token.refresh_token,
            token_uri: Some(flow.token_url().to_string()),
            client_id: flow.secrets.client_id.clone(),
            client_secret: flow.secrets.client_secret.clone(),
            scopes,
            extra: serde_json::Map::new(),
        };
        save_token_file(token_path, &file)?;
        info!(path = %token_path.display(), "Authorization complete; token saved");
        Ok(())
    }
}

/// Parameters Google appends to the redirect.
#[derive(Debug, PartialEq, Eq)]
struct Callback {
    code: String,
    state: String,
}

/// `Ok(None)` for requests that are not the redirect (e.g. a favicon).
fn parse_callback(request: &str) -> Result<Option<Callback>, AuthError> {
    let target = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .ok_or_else(|| AuthError::Consent("malformed redirect request".into()))?;
    let url = Url::parse(&format!("http://127.0.0.1{target}"))
        .map_err(|e| AuthError::Consent(format!("malformed redirect: {e}")))?;

    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => {
                return Err(AuthError::Consent(format!("authorization denied: {value}")));
            }
            _ => {}
        }
    }

    match (code, state) {
        (Some(code), Some(state)) => Ok(Some(Callback { code, state })),
        (Some(_), None) => Err(AuthError::Consent("redirect carried no state".into())),
        (None, _) => Ok(None),
    }
}

async fn wait_for_code(listener: &TcpListener, expected_state: &str) -> Result<String, AuthError> {
    loop {
        let (mut stream, _) = listener.accept().await?;
        let mut buf = [0u8; 4096];
        let n = stream.read(&mut buf).await?;
        let request = String::from_utf8_lossy(&buf[..n]);

        match parse_callback(&request) {
            Ok(None) => {
                respond(&mut stream, "404 Not Found", "Not found").await;
            }
            Ok(Some(callback)) if callback.state != expected_state => {
                respond(&mut stream, "400 Bad Request", "Authorization state mismatch.").await;
                return Err(AuthError::Consent("state mismatch on redirect".into()));
            }
            Ok(Some(callback)) => {
                respond(
                    &mut stream,
                    "200 OK",
                    "Authorization complete. You can close this window.",
                )
                .await;
                return Ok(callback.code);
            }
            Err(e) => {
                respond(&mut stream, "400 Bad Request", "Authorization failed.").await;
                return Err(e);
            }
        }
    }
}

async fn respond(stream: &mut TcpStream, status: &str, message: &str) {
    let body = format!("<html><body><p>{message}</p></body></html>");
    let response = format!(
        "HTTP/1.1 {status}\r\ncontent-type: text/html\r\ncontent-length: {}\r\n\
         connection: close\r\n\r\n{body}",
        body.len()
    );
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        debug!(error = %e, "Failed to answer redirect");
    }
    stream.shutdown().await.ok();
}
