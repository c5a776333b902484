//! Context builder for assembling completion requests

use convo_core::session::{HistoryEntry, Role};
use convo_providers::Message;

/// Builds the message list sent to the completion provider
#[derive(Debug, Clone, Default)]
pub struct ContextBuilder;

impl ContextBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Build the complete message list for a completion call.
    ///
    /// `history` is the session's full history, already ending with the
    /// user message of the current turn.
    pub fn build_messages(&self, system_prompt: &str, history: &[HistoryEntry]) -> Vec<Message> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(Message::system(system_prompt));

        for entry in history {
            let message = match entry.role {
                Role::User => Message::user(entry.content.as_str()),
                Role::Assistant => Message::assistant(entry.content.as_str()),
            };
            messages.push(message);
        }

        messages
    }
}
