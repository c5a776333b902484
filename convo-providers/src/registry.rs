//! Provider registry - single source of truth for provider endpoint metadata

use serde::{Deserialize, Serialize};
use tracing::error;

/// One provider's metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSpec {
    // Identity
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub env_key: String,

    // Endpoint
    #[serde(default)]
    pub default_api_base: String,

    // Gateway / local detection
    #[serde(default)]
    pub is_gateway: bool,
    #[serde(default)]
    pub is_local: bool,
    #[serde(default)]
    pub detect_by_key_prefix: String,
    #[serde(default)]
    pub detect_by_base_keyword: String,
}

impl ProviderSpec {
    pub fn label(&self) -> String {
        if !self.display_name.is_empty() {
            self.display_name.clone()
        } else {
            let mut name = self.name.clone();
            if let Some(first_char) = name.chars().next() {
                name = first_char.to_uppercase().to_string() + &name[first_char.len_utf8()..];
            }
            name
        }
    }
}

/// Registry of known completion providers
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    providers: Vec<ProviderSpec>,
}

impl ProviderRegistry {
    /// Create a registry with the built-in providers
    pub fn new() -> Self {
        Self {
            providers: Self::default_providers(),
        }
    }

    /// Get all provider specs
    pub fn all(&self) -> &[ProviderSpec] {
        &self.providers
    }

    /// Find a provider by model name (case-insensitive keyword matching).
    /// Gateways never match by keyword.
    pub fn find_by_model(&self, model: &str) -> Option<&ProviderSpec> {
        let model_lower = model.to_lowercase();
        self.providers
            .iter()
            .filter(|spec| !spec.is_gateway)
            .find(|spec| spec.keywords.iter().any(|kw| model_lower.contains(kw)))
    }

    /// Find a gateway/local provider from the configured key or base URL
    pub fn find_gateway(&self, api_key: Option<&str>, api_base: Option<&str>) -> Option<&ProviderSpec> {
        self.providers
            .iter()
            .filter(|spec| spec.is_gateway || spec.is_local)
            .find(|spec| {
                let key_match = !spec.detect_by_key_prefix.is_empty()
                    && api_key.is_some_and(|key| key.starts_with(&spec.detect_by_key_prefix));
                let base_match = !spec.detect_by_base_keyword.is_empty()
                    && api_base.is_some_and(|base| base.contains(&spec.detect_by_base_keyword));
                key_match || base_match
            })
    }

    /// Find a provider by config field name
    pub fn find_by_name(&self, name: &str) -> Option<&ProviderSpec> {
        self.providers.iter().find(|spec| spec.name == name)
    }

    /// Pick the provider for a model: an explicit `name/` prefix wins, then
    /// keyword matching.
    pub fn find_for_model(&self, model: &str) -> Option<&ProviderSpec> {
        model
            .split_once('/')
            .and_then(|(prefix, _)| self.find_by_name(prefix))
            .or_else(|| self.find_by_model(model))
    }

    fn default_providers() -> Vec<ProviderSpec> {
        let yaml = include_str!("providers.yaml");
        match serde_yaml::from_str(yaml) {
            Ok(providers) => providers,
            Err(e) => {
                error!("Failed to parse built-in provider registry: {}", e);
                Vec::new()
            }
        }
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
