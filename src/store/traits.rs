//! `MessageStore` trait: async interface for message persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DatabaseError;

/// A message as fetched from the provider, before it is stored.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub msg_id: String,
    pub sender: String,
    pub subject: String,
    pub snippet: String,
    pub received_at: DateTime<Utc>,
}

/// A persisted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    /// Provider message id; unique across the store.
    pub msg_id: String,
    pub sender: String,
    pub subject: String,
    pub snippet: String,
    pub received_at: DateTime<Utc>,
    pub is_processed: bool,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Backend-agnostic message persistence.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    /// Insert a newly fetched message.
    ///
    /// Returns `false` without touching the row if `msg_id` is already stored.
    async fn insert_message(&self, message: &NewMessage) -> Result<bool, DatabaseError>;

    /// Look up a message by provider id.
    async fn get_message(&self, msg_id: &str) -> Result<Option<StoredMessage>, DatabaseError>;

    /// All messages not yet processed, oldest first.
    async fn list_unprocessed(&self) -> Result<Vec<StoredMessage>, DatabaseError>;

    /// Flag a message as processed.
    async fn mark_processed(&self, msg_id: &str) -> Result<(), DatabaseError>;
}
