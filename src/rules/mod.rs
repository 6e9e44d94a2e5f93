//! Rule engine: field resolution, condition evaluation, rule matching
//! and label-mutation aggregation.
//!
//! Everything here is pure. The sync orchestrator feeds it stored
//! messages and turns the resulting `LabelMutation` into one remote call.

pub mod actions;
pub mod condition;
pub mod fields;
pub mod loader;
pub mod matcher;
pub mod model;

pub use actions::{LabelMutation, UNREAD_LABEL, aggregate};
pub use loader::load_rules;
pub use matcher::{matches, matching_rules};
pub use model::{Action, Condition, Field, Predicate, Rule, RulePredicate};
