//! End-to-end rule passes against an in-memory store.
//!
//! Rules are parsed from JSON the way a rules file would be, the clock is
//! frozen, and the remote mutator is a recording fake.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use mail_rules::clock::FixedClock;
use mail_rules::error::ProviderError;
use mail_rules::provider::LabelMutator;
use mail_rules::rules::loader::parse_rules;
use mail_rules::store::{LibSqlBackend, MessageStore, NewMessage};
use mail_rules::sync::{MessageOutcome, MessageStage, SyncOrchestrator};

type Call = (String, Vec<String>, Vec<String>);

/// Fake label mutator that records calls and fails for chosen ids.
#[derive(Default)]
struct FakeMutator {
    calls: Mutex<Vec<Call>>,
    failing: Vec<String>,
}

impl FakeMutator {
    fn failing(ids: &[&str]) -> Self {
        Self {
            failing: ids.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LabelMutator for FakeMutator {
    async fn mutate_labels(
        &self,
        msg_id: &str,
        add: &[String],
        remove: &[String],
    ) -> Result<(), ProviderError> {
        self.calls
            .lock()
            .unwrap()
            .push((msg_id.to_string(), add.to_vec(), remove.to_vec()));
        if self.failing.iter().any(|id| id == msg_id) {
            return Err(ProviderError::Api {
                status: 500,
                body: "internal error".into(),
            });
        }
        Ok(())
    }
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 2, 14, 10, 0, 0).unwrap()
}

async fn store_with_interview(ids: &[&str]) -> Arc<LibSqlBackend> {
    let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    for (i, id) in ids.iter().enumerate() {
        store
            .insert_message(&NewMessage {
                msg_id: id.to_string(),
                sender: "a@x.com".into(),
                subject: "Interview".into(),
                snippet: "Are you free on Thursday?".into(),
                received_at: now() - Duration::days(2) - Duration::minutes(i as i64),
            })
            .await
            .unwrap();
    }
    store
}

const RULE_A: &str = r#"{
    "predicate": "All",
    "conditions": [
        {"field": "From", "predicate": "Contains", "value": "x.com"},
        {"field": "Subject", "predicate": "Contains", "value": "Interview"}
    ],
    "actions": [
        {"action": "Mark as Read"},
        {"action": "Move Message", "to_mailbox": "Important"}
    ]
}"#;

const RULE_B: &str = r#"{
    "predicate": "All",
    "conditions": [
        {"field": "From", "predicate": "Contains", "value": "x.com"},
        {"field": "Subject", "predicate": "Contains", "value": "Interview"}
    ],
    "actions": [
        {"action": "Mark as Unread"},
        {"action": "Move Message", "to_mailbox": "Important"}
    ]
}"#;

fn orchestrator(store: Arc<LibSqlBackend>, mutator: Arc<FakeMutator>) -> SyncOrchestrator {
    SyncOrchestrator::new(store, mutator, Arc::new(FixedClock(now())))
}

#[tokio::test]
async fn scenario_a_mark_read_and_move() {
    let store = store_with_interview(&["m1"]).await;
    let mutator = Arc::new(FakeMutator::default());
    let rules = parse_rules(&format!("[{RULE_A}]")).unwrap();

    let report = orchestrator(store.clone(), mutator.clone())
        .run_pass(&rules)
        .await
        .unwrap();

    assert_eq!(
        mutator.calls(),
        vec![(
            "m1".to_string(),
            vec!["Important".to_string()],
            vec!["UNREAD".to_string()]
        )]
    );
    assert_eq!(report.committed(), 1);
    assert!(store.get_message("m1").await.unwrap().unwrap().is_processed);
}

#[tokio::test]
async fn scenario_b_later_mark_unread_wins() {
    let store = store_with_interview(&["m1"]).await;
    let mutator = Arc::new(FakeMutator::default());
    let rules = parse_rules(&format!("[{RULE_A}, {RULE_B}]")).unwrap();

    orchestrator(store.clone(), mutator.clone())
        .run_pass(&rules)
        .await
        .unwrap();

    let calls = mutator.calls();
    assert_eq!(calls.len(), 1);
    let (_, add, remove) = &calls[0];
    assert!(add.contains(&"UNREAD".to_string()));
    assert!(add.contains(&"Important".to_string()));
    assert!(!remove.contains(&"UNREAD".to_string()));
    assert!(store.get_message("m1").await.unwrap().unwrap().is_processed);
}

#[tokio::test]
async fn scenario_c_age_condition_does_not_match() {
    let store = store_with_interview(&["m1"]).await;
    let mutator = Arc::new(FakeMutator::default());
    let rules = parse_rules(
        r#"[{
            "predicate": "All",
            "conditions": [{"field": "ReceivedAge", "predicate": "GreaterThan", "value": "5"}],
            "actions": [{"action": "MarkRead"}]
        }]"#,
    )
    .unwrap();

    let report = orchestrator(store.clone(), mutator.clone())
        .run_pass(&rules)
        .await
        .unwrap();

    assert_eq!(report.outcome("m1"), Some(&MessageOutcome::Unmatched));
    assert!(mutator.calls().is_empty());
    assert!(!store.get_message("m1").await.unwrap().unwrap().is_processed);
}

#[tokio::test]
async fn any_rule_with_one_true_condition_matches() {
    let store = store_with_interview(&["m1"]).await;
    let mutator = Arc::new(FakeMutator::default());
    let rules = parse_rules(
        r#"[{
            "predicate": "Any",
            "conditions": [
                {"field": "Subject", "predicate": "Equals", "value": "Invoice"},
                {"field": "Date Received", "predicate": "Less than", "value": 3}
            ],
            "actions": [{"action": "Move Message", "to_mailbox": "Recent"}]
        }]"#,
    )
    .unwrap();

    let report = orchestrator(store, mutator.clone()).run_pass(&rules).await.unwrap();
    assert_eq!(report.committed(), 1);
    assert_eq!(mutator.calls()[0].1, vec!["Recent".to_string()]);
}

#[tokio::test]
async fn ordering_predicate_on_text_field_never_matches() {
    let store = store_with_interview(&["m1"]).await;
    let mutator = Arc::new(FakeMutator::default());
    let rules = parse_rules(
        r#"[{
            "predicate": "Any",
            "conditions": [{"field": "Subject", "predicate": "Less than", "value": "9"}],
            "actions": [{"action": "Mark as Read"}]
        }]"#,
    )
    .unwrap();

    let report = orchestrator(store, mutator.clone()).run_pass(&rules).await.unwrap();
    assert_eq!(report.unmatched(), 1);
    assert!(mutator.calls().is_empty());
}

#[tokio::test]
async fn remote_failure_is_isolated_and_retried_next_pass() {
    let store = store_with_interview(&["m1", "m2", "m3"]).await;
    let rules = parse_rules(&format!("[{RULE_A}]")).unwrap();

    let flaky = Arc::new(FakeMutator::failing(&["m2"]));
    let report = orchestrator(store.clone(), flaky.clone())
        .run_pass(&rules)
        .await
        .unwrap();

    assert_eq!(flaky.calls().len(), 3);
    assert_eq!(report.committed(), 2);
    assert!(matches!(
        report.outcome("m2"),
        Some(MessageOutcome::Failed {
            stage: MessageStage::Mutating,
            ..
        })
    ));
    let pending: Vec<String> = store
        .list_unprocessed()
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.msg_id)
        .collect();
    assert_eq!(pending, vec!["m2"]);

    let healthy = Arc::new(FakeMutator::default());
    let retry = orchestrator(store.clone(), healthy.clone())
        .run_pass(&rules)
        .await
        .unwrap();
    assert_eq!(retry.evaluated(), 1);
    assert_eq!(healthy.calls()[0].0, "m2");
    assert!(store.list_unprocessed().await.unwrap().is_empty());
}

#[tokio::test]
async fn rerunning_a_pass_leaves_processed_messages_alone() {
    let store = store_with_interview(&["m1", "m2"]).await;
    let mutator = Arc::new(FakeMutator::default());
    let rules = parse_rules(&format!("[{RULE_A}, {RULE_B}]")).unwrap();
    let orch = orchestrator(store, mutator.clone());

    let first = orch.run_pass(&rules).await.unwrap();
    let second = orch.run_pass(&rules).await.unwrap();

    assert_eq!(first.committed(), 2);
    assert_eq!(second.evaluated(), 0);
    assert_eq!(mutator.calls().len(), 2);
}

#[tokio::test]
async fn messages_are_processed_oldest_first() {
    // store_with_interview makes later ids older.
    let store = store_with_interview(&["newest", "middle", "oldest"]).await;
    let mutator = Arc::new(FakeMutator::default());
    let rules = parse_rules(&format!("[{RULE_A}]")).unwrap();

    orchestrator(store, mutator.clone()).run_pass(&rules).await.unwrap();

    let order: Vec<String> = mutator.calls().into_iter().map(|c| c.0).collect();
    assert_eq!(order, vec!["oldest", "middle", "newest"]);
}
