//! Rule, condition and action types as they appear in a rules file.
//!
//! Names accept both the human-readable spelling used in rule files
//! (`"Does not Contain"`, `"Move Message"`) and the enum spelling
//! (`"NotContains"`, `"MoveToLabel"`). Anything else deserializes to an
//! `Unknown` variant, which the evaluator treats as a non-match.

use serde::{Deserialize, Deserializer, Serialize};

// ── Conditions ──────────────────────────────────────────────────────

/// Message field a condition reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    #[serde(rename = "From", alias = "Sender")]
    Sender,
    #[serde(rename = "Subject")]
    Subject,
    #[serde(rename = "Message", alias = "Body")]
    Body,
    /// Whole days since the message was received.
    #[serde(rename = "Date Received", alias = "ReceivedAge")]
    ReceivedAge,
    #[serde(other)]
    Unknown,
}

/// Comparison operator of a single condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Predicate {
    #[serde(rename = "Contains")]
    Contains,
    #[serde(rename = "Does not Contain", alias = "NotContains")]
    NotContains,
    #[serde(rename = "Equals")]
    Equals,
    #[serde(rename = "Does not Equal", alias = "NotEquals")]
    NotEquals,
    #[serde(rename = "Less than", alias = "LessThan")]
    LessThan,
    #[serde(rename = "Greater than", alias = "GreaterThan")]
    GreaterThan,
    #[serde(other)]
    Unknown,
}

/// One `(field, predicate, value)` test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub field: Field,
    pub predicate: Predicate,
    #[serde(deserialize_with = "string_or_number")]
    pub value: String,
}

impl Condition {
    pub fn new(field: Field, predicate: Predicate, value: impl Into<String>) -> Self {
        Self {
            field,
            predicate,
            value: value.into(),
        }
    }

    /// Whether this condition names a field or predicate the evaluator
    /// does not recognise.
    pub fn is_malformed(&self) -> bool {
        self.field == Field::Unknown || self.predicate == Predicate::Unknown
    }
}

/// Accept `"5"` as well as `5` for the comparison value.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Int(n) => n.to_string(),
        Raw::Float(f) => f.to_string(),
    })
}

// ── Rules ───────────────────────────────────────────────────────────

/// How a rule combines its conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RulePredicate {
    /// Every condition must hold.
    All,
    /// At least one condition must hold.
    Any,
    #[serde(other)]
    Unknown,
}

/// What to do with a message once a rule matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum Action {
    #[serde(rename = "Mark as Read", alias = "MarkRead")]
    MarkRead,
    #[serde(rename = "Mark as Unread", alias = "MarkUnread")]
    MarkUnread,
    #[serde(rename = "Move Message", alias = "MoveToLabel")]
    MoveToLabel { to_mailbox: String },
    #[serde(other)]
    Unknown,
}

impl Action {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::MarkRead => "mark_read",
            Self::MarkUnread => "mark_unread",
            Self::MoveToLabel { .. } => "move_to_label",
            Self::Unknown => "unknown",
        }
    }
}

/// A boolean test over message fields plus the actions to take when it holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub predicate: RulePredicate,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl Rule {
    pub fn new(predicate: RulePredicate, conditions: Vec<Condition>, actions: Vec<Action>) -> Self {
        Self {
            name: None,
            predicate,
            conditions,
            actions,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Name for log lines; falls back to the rule's position.
    pub fn display_name(&self, index: usize) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("rule #{}", index + 1))
    }
}
