//! HTTP client for OpenAI-compatible `/chat/completions` endpoints

use async_trait::async_trait;
use convo_core::config::ProvidersConfig;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::base::{LLMProvider, LLMResponse, Message, ProviderError, ProviderResult};
use crate::registry::{ProviderRegistry, ProviderSpec};

/// Chat completion request body
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    max_tokens: u32,
    temperature: f32,
}

/// Chat completion response body
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct Usage {
    #[serde(default)]
    prompt_tokens: i64,
    #[serde(default)]
    completion_tokens: i64,
    #[serde(default)]
    total_tokens: i64,
}

/// Client for one OpenAI-compatible endpoint
pub struct ChatCompletionsClient {
    client: Client,
    api_base: String,
    api_key: Option<String>,
    default_model: String,
    extra_headers: HashMap<String, String>,
    registry: ProviderRegistry,
    gateway: Option<ProviderSpec>,
}

impl ChatCompletionsClient {
    /// Create a new client.
    ///
    /// Without an explicit `api_base`, the registry default of `provider_name`
    /// is used, then `http://localhost:4000`.
    pub fn new(
        api_key: Option<String>,
        api_base: Option<String>,
        default_model: String,
        extra_headers: Option<HashMap<String, String>>,
        provider_name: Option<String>,
    ) -> Self {
        let registry = ProviderRegistry::new();
        let api_base = api_base.filter(|base| !base.trim().is_empty());

        let gateway = provider_name
            .as_deref()
            .and_then(|name| registry.find_by_name(name))
            .filter(|spec| spec.is_gateway)
            .or_else(|| {
                registry
                    .find_gateway(api_key.as_deref(), api_base.as_deref())
                    .filter(|spec| spec.is_gateway)
            })
            .cloned();

        let api_base = api_base
            .or_else(|| {
                provider_name
                    .as_deref()
                    .and_then(|name| registry.find_by_name(name))
                    .or(gateway.as_ref())
                    .map(|spec| spec.default_api_base.clone())
                    .filter(|base| !base.is_empty())
            })
            .unwrap_or_else(|| "http://localhost:4000".to_string());

        Self {
            client: Client::builder()
                .http1_only() // Force HTTP/1.1 to avoid issues with some local servers
                .build()
                .unwrap_or_else(|_| Client::new()),
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|key| !key.is_empty()),
            default_model,
            extra_headers: extra_headers.unwrap_or_default(),
            registry,
            gateway,
        }
    }

    /// Build a client for `model` from the provider section that serves it
    pub fn from_config(providers: &ProvidersConfig, model: &str) -> ProviderResult<Self> {
        let registry = ProviderRegistry::new();
        let spec = registry
            .find_for_model(model)
            .or_else(|| {
                // A custom endpoint serves anything no known provider claims
                providers
                    .custom
                    .api_base
                    .as_ref()
                    .and_then(|_| registry.find_by_name("custom"))
            })
            .ok_or_else(|| {
                ProviderError::ConfigError(format!("No provider found for model: {}", model))
            })?;

        let config = providers.by_name(&spec.name);
        let api_key = config
            .map(|cfg| cfg.api_key.clone())
            .filter(|key| !key.is_empty());
        let api_base = config.and_then(|cfg| cfg.api_base.clone());
        let extra_headers = config
            .and_then(|cfg| cfg.extra_headers.clone())
            .filter(|headers| !headers.is_empty());

        if api_key.is_none() && !spec.is_local && spec.name != "custom" {
            return Err(ProviderError::ConfigError(format!(
                "No API key configured for provider '{}' (set {} or providers.{}.api_key)",
                spec.name, spec.env_key, spec.name
            )));
        }

        debug!("Using provider {} for model {}", spec.name, model);
        Ok(Self::new(
            api_key,
            api_base,
            model.to_string(),
            extra_headers,
            Some(spec.name.clone()),
        ))
    }

    /// Base URL requests are sent to
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Resolve the model name sent on the wire.
    ///
    /// Gateways expect `vendor/model`, so a bare name gets the vendor found by
    /// keyword. Direct endpoints expect the bare name, so a leading
    /// `provider/` routing prefix is stripped.
    fn resolve_model(&self, model: &str) -> String {
        if let Some(gateway) = &self.gateway {
            let bare = model
                .strip_prefix(&format!("{}/", gateway.name))
                .unwrap_or(model);
            if bare.contains('/') {
                return bare.to_string();
            }
            let resolved = match self.registry.find_by_model(bare) {
                Some(vendor) => format!("{}/{}", vendor.name, bare),
                None => bare.to_string(),
            };
            debug!("Resolved model (gateway): {} -> {}", model, resolved);
            return resolved;
        }

        if let Some((prefix, rest)) = model.split_once('/') {
            if self.registry.find_by_name(prefix).is_some() {
                debug!("Resolved model: {} -> {}", model, rest);
                return rest.to_string();
            }
        }

        model.to_string()
    }

    fn apply_headers(&self, mut req_builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(api_key) = &self.api_key {
            req_builder = req_builder.header("Authorization", format!("Bearer {}", api_key));
        }

        for (key, value) in &self.extra_headers {
            req_builder = req_builder.header(key, value);
        }

        req_builder
    }

    /// Convert the wire response into an [`LLMResponse`]
    fn parse_response(&self, response: ChatCompletionResponse) -> ProviderResult<LLMResponse> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("No choices in response".to_string()))?;

        let mut usage = HashMap::new();
        usage.insert("prompt_tokens".to_string(), response.usage.prompt_tokens);
        usage.insert(
            "completion_tokens".to_string(),
            response.usage.completion_tokens,
        );
        usage.insert("total_tokens".to_string(), response.usage.total_tokens);

        Ok(LLMResponse {
            content: choice.message.content,
            finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
            usage,
        })
    }
}

#[async_trait]
impl LLMProvider for ChatCompletionsClient {
    async fn chat(
        &self,
        messages: Vec<Message>,
        model: Option<String>,
        max_tokens: u32,
        temperature: f32,
    ) -> ProviderResult<LLMResponse> {
        let model = model.unwrap_or_else(|| self.default_model.clone());
        let resolved_model = self.resolve_model(&model);

        let request = ChatCompletionRequest {
            model: &resolved_model,
            messages: &messages,
            max_tokens,
            temperature,
        };

        debug!(
            "Sending chat request to {} with model {} ({} messages)",
            self.api_base,
            resolved_model,
            messages.len()
        );

        let url = format!("{}/chat/completions", self.api_base);
        let req_builder = self.apply_headers(self.client.post(&url).json(&request));
        let response = req_builder.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ProviderError::ApiError(format!(
                "HTTP {}: {}",
                status, error_text
            )));
        }

        let response_data: ChatCompletionResponse = response.json().await?;
        self.parse_response(response_data)
    }

    fn get_default_model(&self) -> String {
        self.default_model.clone()
    }
}
