//! Session data structures

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Value stored in the `role` column
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            // "human" is what older databases wrote for user turns
            "user" | "human" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(crate::Error::Session(format!(
                "unknown message role: {}",
                other
            ))),
        }
    }
}

/// One `(role, content)` pair of a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
}

impl HistoryEntry {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// A persisted message row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Autoincrement id; defines the order of messages within a session
    pub id: i64,
    pub session_id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl From<StoredMessage> for HistoryEntry {
    fn from(msg: StoredMessage) -> Self {
        Self {
            role: msg.role,
            content: msg.content,
        }
    }
}

/// A persisted session row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    /// `None` means the process default prompt applies
    pub system_prompt: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Never decreases; bumped by prompt changes and message appends
    pub last_updated: DateTime<Utc>,
}

/// Listing view of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub system_prompt: Option<String>,
    pub last_updated: DateTime<Utc>,
}

/// In-memory, ordered conversation history of one session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatHistory {
    messages: Vec<HistoryEntry>,
}

impl ChatHistory {
    /// Create an empty history
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a history from entries already in chronological order
    pub fn from_entries(messages: Vec<HistoryEntry>) -> Self {
        Self { messages }
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        self.messages.push(entry);
    }

    pub fn add_user_message(&mut self, content: impl Into<String>) {
        self.push(HistoryEntry::user(content));
    }

    pub fn add_assistant_message(&mut self, content: impl Into<String>) {
        self.push(HistoryEntry::assistant(content));
    }

    /// Messages oldest first
    pub fn messages(&self) -> &[HistoryEntry] {
        &self.messages
    }

    pub fn last(&self) -> Option<&HistoryEntry> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Current time as stored in timestamp columns
pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Convert a stored unix-millisecond timestamp
pub(crate) fn from_millis(ms: i64) -> crate::Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| crate::Error::Session(format!("invalid timestamp: {}", ms)))
}
