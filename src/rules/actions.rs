//! Action aggregation: folds matched rules' actions into one label delta.

use serde::Serialize;
use tracing::debug;

use crate::rules::model::Action;

/// Gmail's system label for unread messages.
pub const UNREAD_LABEL: &str = "UNREAD";

/// Labels to add and remove for one message.
///
/// A label is never in both lists: the most recent action touching a
/// label decides which side it ends up on. Insertion order is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LabelMutation {
    add: Vec<String>,
    remove: Vec<String>,
}

impl LabelMutation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_labels(&self) -> &[String] {
        &self.add
    }

    pub fn remove_labels(&self) -> &[String] {
        &self.remove
    }

    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }

    /// Queue `label` for addition, cancelling any pending removal.
    pub fn add(&mut self, label: &str) {
        self.remove.retain(|l| l != label);
        if !self.add.iter().any(|l| l == label) {
            self.add.push(label.to_string());
        }
    }

    /// Queue `label` for removal, cancelling any pending addition.
    pub fn remove(&mut self, label: &str) {
        self.add.retain(|l| l != label);
        if !self.remove.iter().any(|l| l == label) {
            self.remove.push(label.to_string());
        }
    }

    /// Apply `actions` in order on top of what is already queued.
    pub fn apply(&mut self, actions: &[Action]) {
        for action in actions {
            match action {
                Action::MarkRead => self.remove(UNREAD_LABEL),
                Action::MarkUnread => self.add(UNREAD_LABEL),
                Action::MoveToLabel { to_mailbox } => self.add(to_mailbox),
                Action::Unknown => {
                    debug!("Skipping unrecognised action");
                }
            }
        }
    }
}

/// Build the merged mutation for a sequence of matched rules' action lists.
pub fn aggregate<'a, I>(action_lists: I) -> LabelMutation
where
    I: IntoIterator<Item = &'a [Action]>,
{
    let mut mutation = LabelMutation::new();
    for actions in action_lists {
        mutation.apply(actions);
    }
    mutation
}
