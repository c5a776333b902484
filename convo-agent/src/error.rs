//! Errors raised while running a conversation

use convo_providers::ProviderError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    /// Store, cache or lookup failure
    #[error(transparent)]
    Core(#[from] convo_core::Error),

    /// The completion call failed
    #[error("Completion failed: {0}")]
    Provider(#[from] ProviderError),
}

pub type AgentResult<T> = Result<T, AgentError>;

impl AgentError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, AgentError::Core(e) if e.is_not_found())
    }
}
