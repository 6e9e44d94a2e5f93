//! Rule matching: combines a rule's conditions into one verdict.

use chrono::{DateTime, Utc};
use tracing::trace;

use crate::rules::condition::evaluate;
use crate::rules::fields::ResolvedFields;
use crate::rules::model::{Rule, RulePredicate};
use crate::store::traits::StoredMessage;

/// Match `rule` against fields that were resolved once for the message.
///
/// An `All` rule with no conditions matches; an `Any` rule with no
/// conditions does not. Unknown rule predicates never match.
pub fn matches_resolved(rule: &Rule, fields: &ResolvedFields<'_>) -> bool {
    let mut results = rule
        .conditions
        .iter()
        .map(|c| evaluate(c, fields.get(c.field)));

    match rule.predicate {
        RulePredicate::All => results.all(|ok| ok),
        RulePredicate::Any => results.any(|ok| ok),
        RulePredicate::Unknown => false,
    }
}

/// Convenience wrapper that resolves the message's fields first.
pub fn matches(rule: &Rule, message: &StoredMessage, now: DateTime<Utc>) -> bool {
    matches_resolved(rule, &ResolvedFields::resolve(message, now))
}

/// Indices of every rule in `rules` that matches `message`, in list order.
pub fn matching_rules(rules: &[Rule], message: &StoredMessage, now: DateTime<Utc>) -> Vec<usize> {
    let fields = ResolvedFields::resolve(message, now);
    rules
        .iter()
        .enumerate()
        .filter(|(index, rule)| {
            let hit = matches_resolved(rule, &fields);
            trace!(
                msg_id = %message.msg_id,
                rule = %rule.display_name(*index),
                hit,
                "Rule evaluated"
            );
            hit
        })
        .map(|(index, _)| index)
        .collect()
}
