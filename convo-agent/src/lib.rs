//! Conversation orchestration for convo
//!
//! This crate runs chat turns: it ties the session store and cache from
//! `convo-core` to a completion provider from `convo-providers`.

pub mod agent;
pub mod context;
pub mod error;
pub mod locks;

pub use agent::{ConversationAgent, Transcript};
pub use context::ContextBuilder;
pub use error::{AgentError, AgentResult};
pub use locks::TurnLocks;
