//! mail-rules: syncs a Gmail mailbox into local storage and relabels
//! messages according to a JSON rule list.

pub mod clock;
pub mod config;
pub mod error;
pub mod provider;
pub mod rules;
pub mod store;
pub mod sync;
