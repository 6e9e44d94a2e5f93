//! Persistence layer: libSQL-backed storage for fetched messages.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{MessageStore, NewMessage, StoredMessage};
