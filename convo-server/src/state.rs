use std::sync::Arc;

use convo_agent::ConversationAgent;

/// Shared handler state.
///
/// Handlers call the agent directly; each request runs as its own task and
/// the agent serializes turns per session.
#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<ConversationAgent>,
}

impl AppState {
    pub fn new(agent: Arc<ConversationAgent>) -> Self {
        Self { agent }
    }
}
