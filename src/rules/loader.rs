//! Loads the flat rule list from a JSON file.

use std::path::Path;

use tracing::{info, warn};

use crate::error::RulesError;
use crate::rules::model::{Action, Rule, RulePredicate};

/// Read and parse a JSON array of rules.
///
/// Rules that reference unknown fields, predicates or actions are kept
/// (they simply never contribute), but each one is logged.
pub fn load_rules(path: &Path) -> Result<Vec<Rule>, RulesError> {
    let raw = std::fs::read_to_string(path).map_err(|source| RulesError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let rules = parse_rules(&raw).map_err(|source| RulesError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), count = rules.len(), "Rules loaded");
    Ok(rules)
}

/// Parse rules from a JSON string.
pub fn parse_rules(json: &str) -> Result<Vec<Rule>, serde_json::Error> {
    let rules: Vec<Rule> = serde_json::from_str(json)?;
    for (index, rule) in rules.iter().enumerate() {
        warn_if_malformed(index, rule);
    }
    Ok(rules)
}

fn warn_if_malformed(index: usize, rule: &Rule) {
    let name = rule.display_name(index);
    if rule.predicate == RulePredicate::Unknown {
        warn!(rule = %name, "Unrecognised rule predicate; rule will never match");
    }
    let bad_conditions = rule.conditions.iter().filter(|c| c.is_malformed()).count();
    if bad_conditions > 0 {
        warn!(
            rule = %name,
            bad_conditions,
            "Rule has conditions with unrecognised fields or predicates; they evaluate false"
        );
    }
    if rule.actions.iter().any(|a| *a == Action::Unknown) {
        warn!(rule = %name, "Rule has unrecognised actions; they are skipped");
    }
}
