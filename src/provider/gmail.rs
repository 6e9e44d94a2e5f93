//! Gmail REST client: lists, fetches and relabels messages.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ProviderError;
use crate::provider::oauth::TokenManager;
use crate::provider::{LabelMutator, MessageSource};
use crate::store::traits::NewMessage;

/// Gmail API client for the authenticated user.
pub struct GmailClient {
    base_url: String,
    http: reqwest::Client,
    tokens: Arc<TokenManager>,
}

impl GmailClient {
    /// `base_url` is the per-user API root, e.g.
    /// `https://gmail.googleapis.com/gmail/v1/users/me`.
    pub fn new(base_url: impl Into<String>, tokens: Arc<TokenManager>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            tokens,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    async fn bearer(&self) -> Result<String, ProviderError> {
        let token = self.tokens.access_token().await?;
        Ok(token.expose_secret().to_owned())
    }

    async fn ensure_token(&self) -> Result<(), ProviderError> {
        self.tokens.access_token().await?;
        Ok(())
    }
}

/// Turn a non-2xx response into `ProviderError::Api`.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Api { status, body })
}

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailMessage {
    id: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    internal_date: Option<String>,
    #[serde(default)]
    payload: Option<Payload>,
}

#[derive(Debug, Deserialize)]
struct Payload {
    #[serde(default)]
    headers: Vec<Header>,
}

#[derive(Debug, Deserialize)]
struct Header {
    name: String,
    value: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ModifyRequest<'a> {
    add_label_ids: &'a [String],
    remove_label_ids: &'a [String],
}

impl GmailMessage {
    fn header(&self, name: &str) -> Option<&str> {
        self.payload
            .as_ref()?
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// `internalDate` is epoch milliseconds as a string. Falls back to
    /// `fetched_at` when absent or unparseable.
    fn received_at(&self, fetched_at: DateTime<Utc>) -> DateTime<Utc> {
        self.internal_date
            .as_deref()
            .and_then(|s| s.parse::<i64>().ok())
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .unwrap_or(fetched_at)
    }

    fn into_new_message(self, fetched_at: DateTime<Utc>) -> NewMessage {
        let sender = self.header("From").unwrap_or_default().to_string();
        let subject = self.header("Subject").unwrap_or_default().to_string();
        let received_at = self.received_at(fetched_at);
        NewMessage {
            msg_id: self.id,
            sender,
            subject,
            snippet: unescape_snippet(&self.snippet),
            received_at,
        }
    }
}

/// Gmail snippets are HTML-escaped.
fn unescape_snippet(s: &str) -> String {
    s.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

// ── Trait implementations ───────────────────────────────────────────

#[async_trait]
impl MessageSource for GmailClient {
    async fn authenticate(&self) -> Result<(), ProviderError> {
        self.ensure_token().await
    }

    async fn list_message_ids(&self, limit: u32) -> Result<Vec<String>, ProviderError> {
        let response = self
            .http
            .get(self.url("messages"))
            .bearer_auth(self.bearer().await?)
            .query(&[("maxResults", limit.to_string())])
            .send()
            .await?;
        let list: ListResponse = check_status(response).await?.json().await?;
        debug!(count = list.messages.len(), "Listed messages");
        Ok(list.messages.into_iter().map(|m| m.id).collect())
    }

    async fn get_message(&self, msg_id: &str) -> Result<NewMessage, ProviderError> {
        let response = self
            .http
            .get(self.url(&format!("messages/{msg_id}")))
            .bearer_auth(self.bearer().await?)
            .query(&[
                ("format", "metadata"),
                ("metadataHeaders", "From"),
                ("metadataHeaders", "Subject"),
            ])
            .send()
            .await?;
        let message: GmailMessage = check_status(response).await?.json().await?;
        if message.id != msg_id {
            return Err(ProviderError::InvalidResponse(format!(
                "asked for message {msg_id}, got {}",
                message.id
            )));
        }
        Ok(message.into_new_message(Utc::now()))
    }
}

#[async_trait]
impl LabelMutator for GmailClient {
    async fn authenticate(&self) -> Result<(), ProviderError> {
        self.ensure_token().await
    }

    async fn mutate_labels(
        &self,
        msg_id: &str,
        add: &[String],
        remove: &[String],
    ) -> Result<(), ProviderError> {
        let body = ModifyRequest {
            add_label_ids: add,
            remove_label_ids: remove,
        };
        let response = self
            .http
            .post(self.url(&format!("messages/{msg_id}/modify")))
            .bearer_auth(self.bearer().await?)
            .json(&body)
            .send()
            .await?;
        check_status(response).await?;
        debug!(msg_id, ?add, ?remove, "Labels modified");
        Ok(())
    }
}
