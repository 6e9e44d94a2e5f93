//! libSQL backend: async `MessageStore` implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{MessageStore, NewMessage, StoredMessage};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Canonical write format. Fixed precision keeps `ORDER BY received_at`
/// chronological.
fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_optional_datetime(s: &Option<String>) -> Option<DateTime<Utc>> {
    s.as_ref().map(|s| parse_datetime(s))
}

const MESSAGE_COLUMNS: &str =
    "msg_id, sender, subject, snippet, received_at, is_processed, processed_at";

/// Map a libsql Row to a StoredMessage.
///
/// Column order matches MESSAGE_COLUMNS.
fn row_to_message(row: &libsql::Row) -> Result<StoredMessage, libsql::Error> {
    let received_str: String = row.get(4)?;
    let processed: i64 = row.get(5)?;
    let processed_at_str: Option<String> = row.get(6).ok();

    Ok(StoredMessage {
        msg_id: row.get(0)?,
        sender: row.get(1)?,
        subject: row.get(2)?,
        snippet: row.get::<String>(3).unwrap_or_default(),
        received_at: parse_datetime(&received_str),
        is_processed: processed != 0,
        processed_at: parse_optional_datetime(&processed_at_str),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl MessageStore for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    async fn insert_message(&self, message: &NewMessage) -> Result<bool, DatabaseError> {
        let now = format_datetime(Utc::now());
        let count = self
            .conn()
            .execute(
                "INSERT OR IGNORE INTO messages (msg_id, sender, subject, snippet,
                    received_at, is_processed, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?6)",
                params![
                    message.msg_id.as_str(),
                    message.sender.as_str(),
                    message.subject.as_str(),
                    message.snippet.as_str(),
                    format_datetime(message.received_at),
                    now,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_message: {e}")))?;

        let inserted = count > 0;
        debug!(msg_id = %message.msg_id, inserted, "Message insert");
        Ok(inserted)
    }

    async fn get_message(&self, msg_id: &str) -> Result<Option<StoredMessage>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE msg_id = ?1"),
                params![msg_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_message: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let msg = row_to_message(&row)
                    .map_err(|e| DatabaseError::Query(format!("row parse: {e}")))?;
                Ok(Some(msg))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_message: {e}"))),
        }
    }

    async fn list_unprocessed(&self) -> Result<Vec<StoredMessage>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages WHERE is_processed = 0
                     ORDER BY received_at ASC, msg_id ASC"
                ),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_unprocessed: {e}")))?;

        let mut messages = Vec::new();
        loop {
            match rows.next().await {
                Ok(Some(row)) => match row_to_message(&row) {
                    Ok(msg) => messages.push(msg),
                    Err(e) => {
                        tracing::warn!("Skipping message row: {e}");
                    }
                },
                Ok(None) => break,
                Err(e) => return Err(DatabaseError::Query(format!("list_unprocessed: {e}"))),
            }
        }
        Ok(messages)
    }

    async fn mark_processed(&self, msg_id: &str) -> Result<(), DatabaseError> {
        let now = format_datetime(Utc::now());
        let count = self
            .conn()
            .execute(
                "UPDATE messages SET is_processed = 1, processed_at = ?1, updated_at = ?1
                 WHERE msg_id = ?2",
                params![now, msg_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("mark_processed: {e}")))?;

        if count == 0 {
            return Err(DatabaseError::NotFound {
                entity: "message".into(),
                id: msg_id.to_string(),
            });
        }
        debug!(msg_id, "Message marked processed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn make_message(msg_id: &str, received_at: DateTime<Utc>) -> NewMessage {
        NewMessage {
            msg_id: msg_id.into(),
            sender: "alice@example.com".into(),
            subject: "Hello".into(),
            snippet: "Quick question".into(),
            received_at,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap()
    }

    #[tokio::test]
    async fn insert_and_get() {
        let db = test_db().await;
        assert!(db.insert_message(&make_message("m1", t0())).await.unwrap());

        let fetched = db.get_message("m1").await.unwrap().unwrap();
        assert_eq!(fetched.sender, "alice@example.com");
        assert_eq!(fetched.subject, "Hello");
        assert_eq!(fetched.snippet, "Quick question");
        assert_eq!(fetched.received_at, t0());
        assert!(!fetched.is_processed);
        assert!(fetched.processed_at.is_none());
    }

    #[tokio::test]
    async fn get_missing_returns_none() {
        let db = test_db().await;
        assert!(db.get_message("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_insert_is_ignored() {
        let db = test_db().await;
        assert!(db.insert_message(&make_message("m1", t0())).await.unwrap());

        let mut again = make_message("m1", t0());
        again.subject = "Changed".into();
        assert!(!db.insert_message(&again).await.unwrap());

        let fetched = db.get_message("m1").await.unwrap().unwrap();
        assert_eq!(fetched.subject, "Hello");
        assert_eq!(db.list_unprocessed().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_unprocessed_oldest_first() {
        let db = test_db().await;
        db.insert_message(&make_message("late", t0() + Duration::hours(3)))
            .await
            .unwrap();
        db.insert_message(&make_message("early", t0())).await.unwrap();
        db.insert_message(&make_message("mid", t0() + Duration::milliseconds(1500)))
            .await
            .unwrap();

        let ids: Vec<String> = db
            .list_unprocessed()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.msg_id)
            .collect();
        assert_eq!(ids, vec!["early", "mid", "late"]);
    }

    #[tokio::test]
    async fn mark_processed_hides_from_unprocessed() {
        let db = test_db().await;
        db.insert_message(&make_message("m1", t0())).await.unwrap();
        db.insert_message(&make_message("m2", t0())).await.unwrap();

        db.mark_processed("m1").await.unwrap();

        let pending = db.list_unprocessed().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].msg_id, "m2");

        let done = db.get_message("m1").await.unwrap().unwrap();
        assert!(done.is_processed);
        assert!(done.processed_at.is_some());
    }

    #[tokio::test]
    async fn mark_processed_unknown_id_is_not_found() {
        let db = test_db().await;
        let err = db.mark_processed("ghost").await.unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[tokio::test]
    async fn local_database_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("mail.db");
        {
            let db = LibSqlBackend::new_local(&path).await.unwrap();
            db.insert_message(&make_message("m1", t0())).await.unwrap();
            db.mark_processed("m1").await.unwrap();
        }
        let db = LibSqlBackend::new_local(&path).await.unwrap();
        assert!(db.get_message("m1").await.unwrap().unwrap().is_processed);
    }
}
