//! Configuration schema definitions

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Root configuration for convo
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Conversation agent settings
    #[serde(default)]
    pub agent: AgentConfig,
    /// Session database settings
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Provider credentials and endpoints
    #[serde(default)]
    pub providers: ProvidersConfig,
    /// HTTP/WebSocket server settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
    /// Directory for log files
    #[serde(default = "default_log_dir")]
    pub dir: String,
    /// Days to keep rolled log files
    #[serde(default = "default_log_retention")]
    pub retention_days: u64,
    /// Module-specific overrides
    #[serde(default)]
    pub overrides: HashMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_log_retention() -> u64 {
    7
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            dir: default_log_dir(),
            retention_days: default_log_retention(),
            overrides: HashMap::new(),
        }
    }
}

/// Conversation agent settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Model used for completions
    #[serde(default = "default_model")]
    pub model: String,
    /// Maximum tokens per completion
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Sampling temperature
    #[serde(default)]
    pub temperature: f32,
    /// Process-wide system prompt for sessions without a stored one.
    /// Falls back to [`DEFAULT_SYSTEM_PROMPT`] when unset.
    #[serde(default)]
    pub system_prompt: Option<String>,
}

/// System prompt used when neither the session nor the config provides one
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant.";

fn default_model() -> String {
    "gpt-4".to_string()
}

fn default_max_tokens() -> u32 {
    1000
}

impl AgentConfig {
    /// The process default prompt after applying the built-in fallback
    pub fn default_system_prompt(&self) -> String {
        self.system_prompt
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_SYSTEM_PROMPT)
            .to_string()
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: 0.0,
            system_prompt: None,
        }
    }
}

/// Session database settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database file; `~/` is expanded
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Upper bound on pooled connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> String {
    "conversations.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Provider configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub openai: ProviderConfig,
    #[serde(default)]
    pub anthropic: ProviderConfig,
    #[serde(default)]
    pub deepseek: ProviderConfig,
    #[serde(default)]
    pub openrouter: ProviderConfig,
    #[serde(default)]
    pub ollama: ProviderConfig,
    #[serde(default)]
    pub custom: ProviderConfig,
}

impl ProvidersConfig {
    /// Look up a provider section by its registry name
    pub fn by_name(&self, name: &str) -> Option<&ProviderConfig> {
        match name {
            "openai" => Some(&self.openai),
            "anthropic" => Some(&self.anthropic),
            "deepseek" => Some(&self.deepseek),
            "openrouter" => Some(&self.openrouter),
            "ollama" => Some(&self.ollama),
            "custom" => Some(&self.custom),
            _ => None,
        }
    }

    /// Provider sections paired with their names, in display order
    pub fn entries(&self) -> [(&'static str, &ProviderConfig); 6] {
        [
            ("openai", &self.openai),
            ("anthropic", &self.anthropic),
            ("deepseek", &self.deepseek),
            ("openrouter", &self.openrouter),
            ("ollama", &self.ollama),
            ("custom", &self.custom),
        ]
    }
}

/// Individual provider configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default)]
    pub extra_headers: Option<HashMap<String, String>>,
}

/// HTTP/WebSocket server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory served for requests that match no API route
    #[serde(default)]
    pub static_dir: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_dir: None,
        }
    }
}
