//! Chat completion providers for convo
//!
//! This crate defines the [`LLMProvider`] abstraction the conversation agent
//! talks to, and an HTTP implementation for OpenAI-compatible endpoints.

pub mod base;
pub mod chat_completions;
pub mod registry;

pub use base::{LLMProvider, LLMResponse, Message, ProviderError, ProviderResult};
pub use chat_completions::ChatCompletionsClient;
pub use registry::{ProviderRegistry, ProviderSpec};
