//! Mail provider integration: pure I/O, no rule logic.
//!
//! The sync layer only sees the two traits below. `GmailClient` is the
//! production implementation; tests substitute in-memory fakes.

pub mod consent;
pub mod gmail;
pub mod oauth;

#[cfg(test)]
pub(crate) mod test_server;

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::store::traits::NewMessage;

pub use consent::{ClientSecrets, ConsentFlow, PendingConsent};
pub use gmail::GmailClient;
pub use oauth::TokenManager;

/// Read side of the provider: where new messages come from.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Make sure credentials are valid. Called once per pass, before any
    /// other call; an error here aborts the pass.
    async fn authenticate(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Ids of the most recent messages, newest first, at most `limit`.
    async fn list_message_ids(&self, limit: u32) -> Result<Vec<String>, ProviderError>;

    /// Fetch one message's metadata.
    async fn get_message(&self, msg_id: &str) -> Result<NewMessage, ProviderError>;
}

/// Write side of the provider: applies a label delta to one message.
#[async_trait]
pub trait LabelMutator: Send + Sync {
    /// Make sure credentials are valid. Called once per pass, before any
    /// mutation; an error here aborts the pass.
    async fn authenticate(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Add and remove labels on `msg_id` in a single call.
    async fn mutate_labels(
        &self,
        msg_id: &str,
        add: &[String],
        remove: &[String],
    ) -> Result<(), ProviderError>;
}
