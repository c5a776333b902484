//! The conversation agent: runs chat turns against persisted sessions

use std::sync::Arc;

use convo_core::config::{AgentConfig, Config};
use convo_core::session::{
    HistoryEntry, Role, SessionCache, SessionStore, SessionSummary,
};
use convo_core::utils::expand_tilde;
use convo_core::{prompts, Error};
use convo_providers::LLMProvider;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::context::ContextBuilder;
use crate::error::AgentResult;
use crate::locks::TurnLocks;

/// A session's prompt together with its full history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    pub session_id: String,
    pub system_prompt: String,
    pub messages: Vec<HistoryEntry>,
}

/// Mediates between callers and the completion provider, keeping every
/// session's transcript in the store and its live history in the cache.
pub struct ConversationAgent {
    provider: Arc<dyn LLMProvider>,
    cache: SessionCache,
    context: ContextBuilder,
    locks: TurnLocks,
    config: AgentConfig,
    default_prompt: String,
}

impl ConversationAgent {
    pub fn new(provider: Arc<dyn LLMProvider>, store: SessionStore, config: AgentConfig) -> Self {
        let default_prompt = config.default_system_prompt();
        Self {
            provider,
            cache: SessionCache::new(store),
            context: ContextBuilder::new(),
            locks: TurnLocks::new(),
            config,
            default_prompt,
        }
    }

    /// Open the configured database and build an agent on top of it
    pub async fn from_config(config: &Config, provider: Arc<dyn LLMProvider>) -> AgentResult<Self> {
        let path = expand_tilde(&config.database.path);
        let store = SessionStore::open_with(&path, config.database.max_connections).await?;
        info!("Session store ready at {}", path.display());
        Ok(Self::new(provider, store, config.agent.clone()))
    }

    pub fn store(&self) -> &SessionStore {
        self.cache.store()
    }

    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Prompt used for sessions without a stored one
    pub fn default_system_prompt(&self) -> &str {
        &self.default_prompt
    }

    /// The session's stored prompt, or the process default
    pub async fn resolve_system_prompt(&self, session_id: &str) -> AgentResult<String> {
        Ok(self
            .store()
            .get_system_prompt(session_id)
            .await?
            .unwrap_or_else(|| self.default_prompt.clone()))
    }

    /// Run one chat turn and return the assistant's reply.
    ///
    /// The user message is persisted before the provider is called and is
    /// not rolled back if the call fails.
    pub async fn chat(&self, session_id: &str, content: &str) -> AgentResult<String> {
        let result = self.run_turn(session_id, content).await;
        self.locks.prune_idle();
        result
    }

    async fn run_turn(&self, session_id: &str, content: &str) -> AgentResult<String> {
        let _turn = self.locks.acquire(session_id).await;
        let store = self.store();

        let system_prompt = self.resolve_system_prompt(session_id).await?;
        store
            .create_or_update_session(session_id, &system_prompt)
            .await?;

        // Armed across every store write whose cache update could be skipped
        let sync = CacheSync::new(&self.cache, session_id);
        store.append_message(session_id, Role::User, content).await?;
        self.cache.record(session_id, HistoryEntry::user(content));

        let history = self.cache.get_or_load(session_id).await?;
        let messages = {
            let history = history.lock();
            self.context.build_messages(&system_prompt, history.messages())
        };

        debug!(session_id, messages = messages.len(), "Invoking completion");
        let response = match self
            .provider
            .chat(
                messages,
                Some(self.config.model.clone()),
                self.config.max_tokens,
                self.config.temperature,
            )
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(session_id, "Completion failed: {}", e);
                sync.disarm();
                return Err(e.into());
            }
        };

        let reply = response.content.unwrap_or_default();
        store
            .append_message(session_id, Role::Assistant, &reply)
            .await?;
        history.lock().add_assistant_message(reply.as_str());
        sync.disarm();

        info!(session_id, reply_chars = reply.chars().count(), "Turn completed");
        Ok(reply)
    }

    /// Store a new prompt for the session. Cached history is kept.
    ///
    /// Waits for a running turn on the session, which would otherwise write
    /// its own prompt back over this one.
    pub async fn set_system_prompt(&self, session_id: &str, prompt: &str) -> AgentResult<()> {
        {
            let _turn = self.locks.acquire(session_id).await;
            self.store()
                .create_or_update_session(session_id, prompt)
                .await?;
            info!(session_id, "System prompt updated");
        }
        self.locks.prune_idle();
        Ok(())
    }

    /// Switch the session to a predefined prompt and return its text
    pub async fn use_predefined_prompt(
        &self,
        session_id: &str,
        key: &str,
    ) -> AgentResult<&'static str> {
        let prompt = prompts::get(key)
            .ok_or_else(|| Error::NotFound(format!("Prompt type not found: {}", key)))?;
        self.set_system_prompt(session_id, prompt).await?;
        Ok(prompt)
    }

    /// Ordered `(role, content)` history read from the store
    pub async fn history(&self, session_id: &str) -> AgentResult<Vec<HistoryEntry>> {
        Ok(self.store().get_history(session_id).await?)
    }

    /// Resolved prompt and full history of a session
    pub async fn transcript(&self, session_id: &str) -> AgentResult<Transcript> {
        Ok(Transcript {
            session_id: session_id.to_string(),
            system_prompt: self.resolve_system_prompt(session_id).await?,
            messages: self.history(session_id).await?,
        })
    }

    /// Forget a session: drop its cached history and delete it from the store
    pub async fn reset(&self, session_id: &str) -> AgentResult<()> {
        {
            let _turn = self.locks.acquire(session_id).await;
            self.cache.invalidate(session_id);
            let existed = self.store().delete_session(session_id).await?;
            info!(session_id, existed, "Session reset");
        }
        self.locks.prune_idle();
        Ok(())
    }

    pub async fn list_sessions(&self) -> AgentResult<Vec<SessionSummary>> {
        Ok(self.store().list_sessions().await?)
    }
}

/// Drops a session's cached history unless disarmed.
///
/// A turn future dropped between a store write and the matching cache update
/// would otherwise leave the cache behind the store.
struct CacheSync<'a> {
    cache: &'a SessionCache,
    session_id: &'a str,
    armed: bool,
}

impl<'a> CacheSync<'a> {
    fn new(cache: &'a SessionCache, session_id: &'a str) -> Self {
        Self {
            cache,
            session_id,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CacheSync<'_> {
    fn drop(&mut self) {
        if self.armed && self.cache.invalidate(self.session_id) {
            debug!(session_id = self.session_id, "Dropped cached history of interrupted turn");
        }
    }
}
