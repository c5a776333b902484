//! Session management for conversation history
//!
//! Sessions and their messages are persisted in SQLite by [`SessionStore`].
//! [`SessionCache`] keeps the materialized history of sessions that are
//! active in this process so repeated turns do not re-read the database.

pub mod cache;
pub mod store;
pub mod types;

pub use cache::{SessionCache, SharedHistory};
pub use store::SessionStore;
pub use types::{ChatHistory, HistoryEntry, Role, Session, SessionSummary, StoredMessage};
