//! SQLite-backed session storage
//!
//! Two tables: `sessions` (one row per session id, holding its system prompt
//! and timestamps) and `messages` (append-only, referencing `sessions`).
//! Every operation checks a connection out of the pool for its own duration,
//! so operations are individually atomic but nothing spans several calls.

use std::path::Path;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::debug;

use super::types::{
    from_millis, now_millis, HistoryEntry, Role, Session, SessionSummary, StoredMessage,
};
use crate::Result;

/// Default upper bound on pooled connections
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

const CREATE_SESSIONS: &str = "CREATE TABLE IF NOT EXISTS sessions (
    session_id    TEXT PRIMARY KEY,
    system_prompt TEXT,
    created_at    INTEGER NOT NULL,
    last_updated  INTEGER NOT NULL
)";

const CREATE_MESSAGES: &str = "CREATE TABLE IF NOT EXISTS messages (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL REFERENCES sessions (session_id),
    role       TEXT NOT NULL,
    content    TEXT NOT NULL,
    timestamp  INTEGER NOT NULL
)";

const CREATE_MESSAGES_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_messages_session ON messages (session_id, id)";

/// Durable store for sessions and their message history.
///
/// Cloning is cheap; clones share the same connection pool.
#[derive(Debug, Clone)]
pub struct SessionStore {
    pool: SqlitePool,
}

impl SessionStore {
    /// Open (creating if needed) the database at `path`
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, DEFAULT_MAX_CONNECTIONS).await
    }

    /// Open the database at `path` with an explicit pool size
    pub async fn open_with<P: AsRef<Path>>(path: P, max_connections: u32) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;

        debug!("Opened session database at {}", path.display());
        Self::from_pool(pool).await
    }

    /// A private in-memory database, mostly useful for tests
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        // Every in-memory connection is its own database, so pin exactly one
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    /// Wrap an existing pool, creating the schema if it is missing
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        for statement in [CREATE_SESSIONS, CREATE_MESSAGES, CREATE_MESSAGES_INDEX] {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Insert a session, or overwrite its prompt and bump `last_updated`.
    ///
    /// Idempotent: repeating the call with the same prompt changes nothing
    /// but the timestamp.
    pub async fn create_or_update_session(
        &self,
        session_id: &str,
        system_prompt: &str,
    ) -> Result<()> {
        let now = now_millis();
        sqlx::query(
            "INSERT INTO sessions (session_id, system_prompt, created_at, last_updated)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(session_id) DO UPDATE SET
                 system_prompt = excluded.system_prompt,
                 last_updated = MAX(sessions.last_updated, excluded.last_updated)",
        )
        .bind(session_id)
        .bind(system_prompt)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        debug!(session_id, "Session upserted");
        Ok(())
    }

    /// Append one message to an existing session and return its id.
    ///
    /// Fails with a foreign key violation when the session does not exist;
    /// callers create the session first.
    pub async fn append_message(&self, session_id: &str, role: Role, content: &str) -> Result<i64> {
        let now = now_millis();
        let mut tx = self.pool.begin().await?;

        let id = sqlx::query(
            "INSERT INTO messages (session_id, role, content, timestamp) VALUES (?, ?, ?, ?)",
        )
        .bind(session_id)
        .bind(role.as_str())
        .bind(content)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        sqlx::query(
            "UPDATE sessions SET last_updated = MAX(last_updated, ?) WHERE session_id = ?",
        )
        .bind(now)
        .bind(session_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(session_id, message_id = id, role = %role, "Message appended");
        Ok(id)
    }

    /// Ordered `(role, content)` pairs, oldest first. Empty for unknown sessions.
    pub async fn get_history(&self, session_id: &str) -> Result<Vec<HistoryEntry>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT role, content FROM messages WHERE session_id = ? ORDER BY id ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(role, content)| -> Result<HistoryEntry> {
                Ok(HistoryEntry::new(role.parse()?, content))
            })
            .collect()
    }

    /// Full message records in the same order as [`get_history`](Self::get_history)
    pub async fn get_messages(&self, session_id: &str) -> Result<Vec<StoredMessage>> {
        let rows: Vec<(i64, String, String, i64)> = sqlx::query_as(
            "SELECT id, role, content, timestamp FROM messages
             WHERE session_id = ? ORDER BY id ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, role, content, timestamp)| -> Result<StoredMessage> {
                Ok(StoredMessage {
                    id,
                    session_id: session_id.to_string(),
                    role: role.parse()?,
                    content,
                    timestamp: from_millis(timestamp)?,
                })
            })
            .collect()
    }

    /// The stored prompt, or `None` when the session is unknown or has none
    pub async fn get_system_prompt(&self, session_id: &str) -> Result<Option<String>> {
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT system_prompt FROM sessions WHERE session_id = ?")
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.and_then(|(prompt,)| prompt))
    }

    /// Fetch a session row
    pub async fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        let row: Option<(String, Option<String>, i64, i64)> = sqlx::query_as(
            "SELECT session_id, system_prompt, created_at, last_updated
             FROM sessions WHERE session_id = ?",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(session_id, system_prompt, created_at, last_updated)| -> Result<Session> {
            Ok(Session {
                session_id,
                system_prompt,
                created_at: from_millis(created_at)?,
                last_updated: from_millis(last_updated)?,
            })
        })
        .transpose()
    }

    /// Remove a session and all of its messages.
    ///
    /// Messages go first so the foreign key is never violated. Returns whether
    /// a session row existed; deleting an unknown session is not an error.
    pub async fn delete_session(&self, session_id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let messages = sqlx::query("DELETE FROM messages WHERE session_id = ?")
            .bind(session_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let sessions = sqlx::query("DELETE FROM sessions WHERE session_id = ?")
            .bind(session_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        debug!(session_id, messages, "Session deleted");
        Ok(sessions > 0)
    }

    /// All sessions, most recently updated first
    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        let rows: Vec<(String, Option<String>, i64)> = sqlx::query_as(
            "SELECT session_id, system_prompt, last_updated FROM sessions
             ORDER BY last_updated DESC, session_id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(session_id, system_prompt, last_updated)| -> Result<SessionSummary> {
                Ok(SessionSummary {
                    session_id,
                    system_prompt,
                    last_updated: from_millis(last_updated)?,
                })
            })
            .collect()
    }

    /// Number of stored messages for a session
    pub async fn count_messages(&self, session_id: &str) -> Result<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM messages WHERE session_id = ?")
                .bind(session_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    /// Close the pool, waiting for checked-out connections to be returned
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn temp_store() -> (TempDir, SessionStore) {
        let temp_dir = TempDir::new().unwrap();
        let store = SessionStore::open(temp_dir.path().join("conversations.db"))
            .await
            .unwrap();
        (temp_dir, store)
    }

    #[tokio::test]
    async fn test_prompt_round_trip() {
        let (_dir, store) = temp_store().await;
        store
            .create_or_update_session("u1", "You are helpful")
            .await
            .unwrap();

        assert_eq!(
            store.get_system_prompt("u1").await.unwrap().as_deref(),
            Some("You are helpful")
        );
        assert_eq!(store.get_system_prompt("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let (_dir, store) = temp_store().await;
        store.create_or_update_session("u1", "p").await.unwrap();
        store.create_or_update_session("u1", "p").await.unwrap();

        let sessions = store.list_sessions().await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(store.get_system_prompt("u1").await.unwrap().as_deref(), Some("p"));
    }

    #[tokio::test]
    async fn test_upsert_overwrites_prompt_and_keeps_created_at() {
        let (_dir, store) = temp_store().await;
        store.create_or_update_session("u1", "old").await.unwrap();
        let before = store.get_session("u1").await.unwrap().unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        store.create_or_update_session("u1", "new").await.unwrap();
        let after = store.get_session("u1").await.unwrap().unwrap();

        assert_eq!(after.system_prompt.as_deref(), Some("new"));
        assert_eq!(after.created_at, before.created_at);
        assert!(after.last_updated > before.last_updated);
    }

    #[tokio::test]
    async fn test_history_scenario() {
        let (_dir, store) = temp_store().await;
        store
            .create_or_update_session("u1", "You are helpful")
            .await
            .unwrap();
        store.append_message("u1", Role::User, "hi").await.unwrap();
        store
            .append_message("u1", Role::Assistant, "hello")
            .await
            .unwrap();

        assert_eq!(
            store.get_history("u1").await.unwrap(),
            vec![HistoryEntry::user("hi"), HistoryEntry::assistant("hello")]
        );
    }

    #[tokio::test]
    async fn test_history_keeps_insertion_order_and_duplicates() {
        let (_dir, store) = temp_store().await;
        store.create_or_update_session("s", "p").await.unwrap();

        let contents = ["b", "a", "a", "c", "b"];
        for (i, content) in contents.iter().enumerate() {
            let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
            store.append_message("s", role, content).await.unwrap();
        }

        let history = store.get_history("s").await.unwrap();
        let got: Vec<&str> = history.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(got, contents);

        let messages = store.get_messages("s").await.unwrap();
        assert!(messages.windows(2).all(|w| w[0].id < w[1].id));
        assert_eq!(store.count_messages("s").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_history_of_unknown_session_is_empty() {
        let (_dir, store) = temp_store().await;
        assert!(store.get_history("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_requires_existing_session() {
        let (_dir, store) = temp_store().await;
        let err = store
            .append_message("ghost", Role::User, "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Database(_)));
    }

    #[tokio::test]
    async fn test_append_bumps_last_updated() {
        let (_dir, store) = temp_store().await;
        store.create_or_update_session("u1", "p").await.unwrap();
        let before = store.get_session("u1").await.unwrap().unwrap().last_updated;

        tokio::time::sleep(Duration::from_millis(5)).await;
        store.append_message("u1", Role::User, "hi").await.unwrap();
        let after = store.get_session("u1").await.unwrap().unwrap().last_updated;

        assert!(after > before);
    }

    #[tokio::test]
    async fn test_delete_removes_messages_and_session() {
        let (_dir, store) = temp_store().await;
        store.create_or_update_session("u1", "p").await.unwrap();
        store.append_message("u1", Role::User, "hi").await.unwrap();
        store
            .append_message("u1", Role::Assistant, "hello")
            .await
            .unwrap();

        assert!(store.delete_session("u1").await.unwrap());

        assert!(store.get_history("u1").await.unwrap().is_empty());
        assert_eq!(store.count_messages("u1").await.unwrap(), 0);
        assert!(store
            .list_sessions()
            .await
            .unwrap()
            .iter()
            .all(|s| s.session_id != "u1"));
        assert!(store
            .append_message("u1", Role::User, "again")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_delete_unknown_session_is_noop() {
        let (_dir, store) = temp_store().await;
        assert!(!store.delete_session("nobody").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_leaves_other_sessions_alone() {
        let (_dir, store) = temp_store().await;
        store.create_or_update_session("a", "p").await.unwrap();
        store.create_or_update_session("b", "p").await.unwrap();
        store.append_message("b", Role::User, "keep me").await.unwrap();

        store.delete_session("a").await.unwrap();

        assert_eq!(
            store.get_history("b").await.unwrap(),
            vec![HistoryEntry::user("keep me")]
        );
    }

    #[tokio::test]
    async fn test_list_sessions_most_recent_first() {
        let (_dir, store) = temp_store().await;
        store.create_or_update_session("first", "p1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        store.create_or_update_session("second", "p2").await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        store.append_message("first", Role::User, "bump").await.unwrap();

        let ids: Vec<String> = store
            .list_sessions()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.session_id)
            .collect();
        assert_eq!(ids, vec!["first".to_string(), "second".to_string()]);
    }

    #[tokio::test]
    async fn test_data_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("conversations.db");

        let store = SessionStore::open(&path).await.unwrap();
        store.create_or_update_session("u1", "p").await.unwrap();
        store.append_message("u1", Role::User, "hi").await.unwrap();
        store.close().await;

        let reopened = SessionStore::open(&path).await.unwrap();
        assert_eq!(
            reopened.get_history("u1").await.unwrap(),
            vec![HistoryEntry::user("hi")]
        );
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = SessionStore::in_memory().await.unwrap();
        store.create_or_update_session("m", "p").await.unwrap();
        store.append_message("m", Role::User, "hi").await.unwrap();
        assert_eq!(store.get_history("m").await.unwrap().len(), 1);
    }
}
