//! Fetch path: pulls recent messages from the provider into the store.
//!
//! Already-stored ids are skipped before any per-message API call, so
//! re-running a fetch never duplicates rows or resets `is_processed`.

use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::provider::MessageSource;
use crate::store::traits::MessageStore;

/// Counters for one fetch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchReport {
    pub listed: usize,
    pub inserted: usize,
    pub already_stored: usize,
    pub failed: usize,
}

/// Fetch up to `limit` recent messages and persist the new ones.
///
/// Authentication, listing and store failures abort the fetch. A failure
/// to fetch one message from the provider is logged and skipped.
pub async fn fetch_messages(
    source: &dyn MessageSource,
    store: &dyn MessageStore,
    limit: u32,
) -> Result<FetchReport> {
    if let Err(e) = source.authenticate().await {
        error!(error = %e, "Authentication failed; aborting fetch");
        return Err(e.into());
    }

    let ids = source.list_message_ids(limit).await?;
    let mut report = FetchReport {
        listed: ids.len(),
        ..Default::default()
    };

    for msg_id in &ids {
        if store.get_message(msg_id).await?.is_some() {
            debug!(msg_id = %msg_id, "Already stored");
            report.already_stored += 1;
            continue;
        }

        let message = match source.get_message(msg_id).await {
            Ok(message) => message,
            Err(e) => {
                warn!(msg_id = %msg_id, error = %e, "Failed to fetch message");
                report.failed += 1;
                continue;
            }
        };

        if store.insert_message(&message).await? {
            report.inserted += 1;
        } else {
            report.already_stored += 1;
        }
    }

    info!(
        listed = report.listed,
        inserted = report.inserted,
        already_stored = report.already_stored,
        failed = report.failed,
        "Fetch complete"
    );
    Ok(report)
}
