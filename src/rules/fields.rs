//! Field resolution: turns a stored message into the values conditions see.

use std::borrow::Cow;

use chrono::{DateTime, Utc};

use crate::rules::model::Field;
use crate::store::traits::StoredMessage;

/// A resolved field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValue<'a> {
    Text(&'a str),
    /// Whole days; only `ReceivedAge` produces this.
    Number(i64),
}

impl<'a> FieldValue<'a> {
    /// String form used by the substring and equality predicates.
    pub fn as_text(&self) -> Cow<'a, str> {
        match self {
            Self::Text(s) => Cow::Borrowed(s),
            Self::Number(n) => Cow::Owned(n.to_string()),
        }
    }

    pub fn as_number(&self) -> Option<i64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }
}

/// Every field of one message, resolved once per evaluation pass.
#[derive(Debug, Clone)]
pub struct ResolvedFields<'a> {
    sender: &'a str,
    subject: &'a str,
    body: &'a str,
    received_age_days: i64,
}

impl<'a> ResolvedFields<'a> {
    /// Resolve `message` as of `now`.
    pub fn resolve(message: &'a StoredMessage, now: DateTime<Utc>) -> Self {
        Self {
            sender: &message.sender,
            subject: &message.subject,
            body: &message.snippet,
            received_age_days: age_in_days(message.received_at, now),
        }
    }

    pub fn get(&self, field: Field) -> FieldValue<'a> {
        match field {
            Field::Sender => FieldValue::Text(self.sender),
            Field::Subject => FieldValue::Text(self.subject),
            Field::Body => FieldValue::Text(self.body),
            Field::ReceivedAge => FieldValue::Number(self.received_age_days),
            Field::Unknown => FieldValue::Text(""),
        }
    }
}

/// Whole days between `received_at` and `now`, floored, never negative.
pub fn age_in_days(received_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    now.signed_duration_since(received_at).num_days().max(0)
}
