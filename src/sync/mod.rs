//! Sync layer: pull messages into the store, then apply rules to them.

pub mod fetch;
pub mod orchestrator;

pub use fetch::{FetchReport, fetch_messages};
pub use orchestrator::{MessageOutcome, MessageStage, PassReport, SyncOrchestrator};
