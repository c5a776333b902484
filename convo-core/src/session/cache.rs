//! In-memory cache of per-session chat histories

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::store::SessionStore;
use super::types::{ChatHistory, HistoryEntry};
use crate::Result;

/// A cached history shared between the cache and whoever is running a turn
pub type SharedHistory = Arc<Mutex<ChatHistory>>;

/// Lazily populated map from session id to its live history.
///
/// The first lookup of a session reads the store; later lookups return the
/// same object until [`invalidate`](Self::invalidate) drops it. The cache
/// never writes to the store.
#[derive(Debug)]
pub struct SessionCache {
    store: SessionStore,
    entries: Mutex<HashMap<String, SharedHistory>>,
}

impl SessionCache {
    pub fn new(store: SessionStore) -> Self {
        Self {
            store,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// The backing store
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Return the cached history, loading it from the store on a miss
    pub async fn get_or_load(&self, session_id: &str) -> Result<SharedHistory> {
        if let Some(history) = self.get(session_id) {
            return Ok(history);
        }

        let entries = self.store.get_history(session_id).await?;
        debug!(session_id, messages = entries.len(), "Loaded history into cache");
        let loaded = Arc::new(Mutex::new(ChatHistory::from_entries(entries)));

        // A concurrent load may have won the race; keep whichever got in first
        let mut map = self.entries.lock();
        Ok(map
            .entry(session_id.to_string())
            .or_insert(loaded)
            .clone())
    }

    /// The cached history without touching the store
    pub fn get(&self, session_id: &str) -> Option<SharedHistory> {
        self.entries.lock().get(session_id).cloned()
    }

    /// Append to the cached history if the session is loaded.
    ///
    /// Returns whether an entry was updated. A session that is not cached
    /// will pick the message up from the store on its next load.
    pub fn record(&self, session_id: &str, entry: HistoryEntry) -> bool {
        match self.get(session_id) {
            Some(history) => {
                history.lock().push(entry);
                true
            }
            None => false,
        }
    }

    /// Drop the cached history; a no-op for unknown sessions
    pub fn invalidate(&self, session_id: &str) -> bool {
        let removed = self.entries.lock().remove(session_id).is_some();
        if removed {
            debug!(session_id, "Invalidated cached history");
        }
        removed
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.entries.lock().contains_key(session_id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drop every cached history
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
