//! Rule application pass over every unprocessed message.
//!
//! Per message: `Idle → Matching → Mutating → Committed`.
//!
//! - Matching runs every rule against fields resolved once for the message.
//! - Mutating happens only if something matched, and issues exactly one
//!   remote call carrying the fully aggregated label delta.
//! - Committed flips `is_processed` only after that call succeeded.
//!
//! A message that matches nothing stays unprocessed so later rule changes
//! can still pick it up. A failed remote call or store write is logged
//! and the pass moves on; the message is retried on the next pass.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::Result;
use crate::provider::LabelMutator;
use crate::rules::{LabelMutation, Rule, aggregate, matching_rules};
use crate::store::traits::{MessageStore, StoredMessage};

/// Where a message is in its per-pass lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStage {
    Idle,
    Matching,
    Mutating,
    Committed,
}

impl fmt::Display for MessageStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Matching => "matching",
            Self::Mutating => "mutating",
            Self::Committed => "committed",
        };
        f.write_str(s)
    }
}

/// What happened to one message during a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// No rule matched; left unprocessed, no remote call.
    Unmatched,
    /// Labels were changed and the message is now processed.
    Committed {
        matched_rules: Vec<usize>,
        mutation: LabelMutation,
    },
    /// Something failed at `stage`; the message stays unprocessed.
    Failed { stage: MessageStage, reason: String },
}

/// Summary of a pass.
#[derive(Debug, Clone)]
pub struct PassReport {
    pub pass_id: Uuid,
    /// `(msg_id, outcome)` in processing order.
    pub outcomes: Vec<(String, MessageOutcome)>,
}

impl PassReport {
    pub fn evaluated(&self) -> usize {
        self.outcomes.len()
    }

    pub fn committed(&self) -> usize {
        self.count(|o| matches!(o, MessageOutcome::Committed { .. }))
    }

    pub fn unmatched(&self) -> usize {
        self.count(|o| matches!(o, MessageOutcome::Unmatched))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, MessageOutcome::Failed { .. }))
    }

    pub fn outcome(&self, msg_id: &str) -> Option<&MessageOutcome> {
        self.outcomes
            .iter()
            .find(|(id, _)| id == msg_id)
            .map(|(_, outcome)| outcome)
    }

    fn count(&self, pred: impl Fn(&MessageOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| pred(o)).count()
    }
}

/// Applies a rule list to stored messages and pushes the result upstream.
pub struct SyncOrchestrator {
    store: Arc<dyn MessageStore>,
    mutator: Arc<dyn LabelMutator>,
    clock: Arc<dyn Clock>,
}

impl SyncOrchestrator {
    pub fn new(
        store: Arc<dyn MessageStore>,
        mutator: Arc<dyn LabelMutator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            mutator,
            clock,
        }
    }

    /// Run one pass of `rules` over every unprocessed message.
    ///
    /// Fails only when authentication or listing messages fails; in that
    /// case nothing was mutated or marked.
    pub async fn run_pass(&self, rules: &[Rule]) -> Result<PassReport> {
        let pass_id = Uuid::new_v4();
        let span = info_span!("rules_pass", %pass_id);
        self.run_pass_inner(pass_id, rules).instrument(span).await
    }

    async fn run_pass_inner(&self, pass_id: Uuid, rules: &[Rule]) -> Result<PassReport> {
        if let Err(e) = self.mutator.authenticate().await {
            error!(error = %e, "Authentication failed; aborting pass");
            return Err(e.into());
        }

        let messages = self.store.list_unprocessed().await?;
        let now = self.clock.now();
        info!(
            stage = %MessageStage::Idle,
            messages = messages.len(),
            rules = rules.len(),
            "Selected unprocessed messages"
        );

        let mut outcomes = Vec::with_capacity(messages.len());
        for message in &messages {
            let outcome = self.process_message(message, rules, now).await;
            outcomes.push((message.msg_id.clone(), outcome));
        }

        let report = PassReport { pass_id, outcomes };
        info!(
            evaluated = report.evaluated(),
            committed = report.committed(),
            unmatched = report.unmatched(),
            failed = report.failed(),
            "Rules pass complete"
        );
        Ok(report)
    }

    async fn process_message(
        &self,
        message: &StoredMessage,
        rules: &[Rule],
        now: DateTime<Utc>,
    ) -> MessageOutcome {
        let msg_id = message.msg_id.as_str();

        debug!(msg_id, stage = %MessageStage::Matching, "Evaluating rules");
        let matched = matching_rules(rules, message, now);
        if matched.is_empty() {
            debug!(msg_id, "No rule matched");
            return MessageOutcome::Unmatched;
        }

        // Mutating: aggregate first, then exactly one call.
        let mutation = aggregate(matched.iter().map(|&i| rules[i].actions.as_slice()));
        info!(
            msg_id,
            subject = %message.subject,
            matched = matched.len(),
            add = ?mutation.add_labels(),
            remove = ?mutation.remove_labels(),
            "Applying actions"
        );
        if let Err(e) = self
            .mutator
            .mutate_labels(msg_id, mutation.add_labels(), mutation.remove_labels())
            .await
        {
            warn!(msg_id, error = %e, "Label mutation failed; message left unprocessed");
            return MessageOutcome::Failed {
                stage: MessageStage::Mutating,
                reason: e.to_string(),
            };
        }

        debug!(msg_id, stage = %MessageStage::Committed, "Marking processed");
        if let Err(e) = self.store.mark_processed(msg_id).await {
            error!(msg_id, error = %e, "Labels applied but failed to mark message processed");
            return MessageOutcome::Failed {
                stage: MessageStage::Committed,
                reason: e.to_string(),
            };
        }

        MessageOutcome::Committed {
            matched_rules: matched,
            mutation,
        }
    }
}
