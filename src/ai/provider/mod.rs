//! LLM Provider Abstraction
//!
//! Defines the LlmProvider trait for plain-text chat completion.
//! All providers return `LlmResponse` with token usage and cost so the
//! dispatcher can account for every call.

mod ollama;
mod openai;

pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

// Re-export error types from centralized location
pub use crate::types::{ErrorCategory, ErrorClassifier, LlmError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::constants::{MODEL_PRICING, network};
use crate::types::{BuddyError, Result};

// =============================================================================
// Completion Request / Response
// =============================================================================

/// One chat-completion call
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    /// System instructions
    pub system: String,
    /// User message
    pub prompt: String,
    /// Generation cap; falls back to the provider's configured limit
    pub max_tokens: Option<usize>,
}

/// Complete LLM response including content, usage metrics, and cost
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// Generated text
    pub content: String,
    pub usage: TokenUsage,
    /// Cost in USD, computed from the model price table
    pub cost_usd: f64,
    pub timing: ResponseTiming,
    pub metadata: ResponseMetadata,
}

/// Token usage metrics for cost tracking
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Input tokens (prompt)
    pub input_tokens: u32,
    /// Output tokens (response)
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    /// Total tokens used (input + output)
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// Response timing metrics
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseTiming {
    /// Total response time in milliseconds (wall clock)
    pub total_ms: u64,
}

impl ResponseTiming {
    pub fn from_duration(duration: std::time::Duration) -> Self {
        Self {
            total_ms: duration.as_millis() as u64,
        }
    }
}

/// Response metadata
#[derive(Debug, Clone, Default)]
pub struct ResponseMetadata {
    /// Model used
    pub model: String,
    /// Provider name
    pub provider: String,
}

/// Price a call against [`MODEL_PRICING`]; the longest matching model prefix wins
pub fn estimate_cost(model: &str, usage: &TokenUsage) -> f64 {
    MODEL_PRICING
        .iter()
        .filter(|(prefix, _, _)| model.starts_with(prefix))
        .max_by_key(|(prefix, _, _)| prefix.len())
        .map(|(_, input, output)| {
            f64::from(usage.input_tokens) / 1000.0 * input
                + f64::from(usage.output_tokens) / 1000.0 * output
        })
        .unwrap_or(0.0)
}

/// Shared LLM provider type
pub type SharedProvider = Arc<dyn LlmProvider + Send + Sync>;

// =============================================================================
// Provider Configuration
// =============================================================================

/// Configuration for LLM providers
///
/// Note: API keys are never serialized to output and are redacted in debug
/// output. Each provider converts the key to SecretString internally.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Provider type: "openai", "ollama"
    pub provider: String,
    /// Model name (provider-specific)
    pub model: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Temperature for generation (0.0 = deterministic, 1.0 = creative)
    pub temperature: f32,
    /// API key; never serialized to output
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,
    /// Maximum tokens to generate
    pub max_tokens: usize,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .field("temperature", &self.temperature)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_base", &self.api_base)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: None,
            timeout_secs: network::DEFAULT_TIMEOUT_SECS,
            temperature: 0.3,
            api_key: None,
            api_base: None,
            max_tokens: 1500,
        }
    }
}

/// Validate a provider base URL: http(s) only, trailing slash removed
pub fn validate_endpoint(endpoint: &str, provider: &str) -> Result<String> {
    let url = url::Url::parse(endpoint).map_err(|e| {
        BuddyError::Config(format!(
            "Invalid {} endpoint URL '{}': {}",
            provider, endpoint, e
        ))
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(BuddyError::Config(format!(
            "{} endpoint must use http or https scheme, got: {}",
            provider,
            url.scheme()
        )));
    }

    let mut result = url.to_string();
    if result.ends_with('/') {
        result.pop();
    }
    Ok(result)
}

// =============================================================================
// LLM Provider Trait
// =============================================================================

/// Text-completion backend
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Run one chat completion
    async fn complete(&self, request: &CompletionRequest) -> Result<LlmResponse>;

    /// Provider name for logging
    fn name(&self) -> &str;

    /// Model name currently in use
    fn model(&self) -> &str;

    /// Check if the provider is available
    async fn health_check(&self) -> Result<bool>;
}

/// Create a shared provider from configuration
pub fn create_provider(config: &ProviderConfig) -> Result<SharedProvider> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiProvider::new(config.clone())?)),
        "ollama" => Ok(Arc::new(OllamaProvider::new(config.clone())?)),
        _ => Err(BuddyError::Config(format!(
            "Unknown provider: {}. Supported: openai, ollama",
            config.provider
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_cost_longest_prefix() {
        let usage = TokenUsage::new(1000, 1000);
        // gpt-4o-mini, not gpt-4o or gpt-4
        let mini = estimate_cost("gpt-4o-mini-2024-07-18", &usage);
        assert!((mini - 0.00075).abs() < 1e-12);

        let gpt4 = estimate_cost("gpt-4-0613", &usage);
        assert!((gpt4 - 0.09).abs() < 1e-12);

        assert_eq!(estimate_cost("llama3:latest", &usage), 0.0);
    }

    #[test]
    fn test_provider_config_debug_redacts_key() {
        let config = ProviderConfig {
            api_key: Some("sk-secret".to_string()),
            ..Default::default()
        };
        let debug = format!("{:?}", config);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("sk-secret"));
    }

    #[test]
    fn test_provider_config_never_serializes_key() {
        let config = ProviderConfig {
            api_key: Some("sk-secret".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("sk-secret"));
    }

    #[test]
    fn test_validate_endpoint() {
        assert_eq!(
            validate_endpoint("http://localhost:11434/", "ollama").unwrap(),
            "http://localhost:11434"
        );
        assert!(validate_endpoint("file:///etc/passwd", "ollama").is_err());
        assert!(validate_endpoint("not a url", "openai").is_err());
    }

    #[test]
    fn test_unknown_provider() {
        let config = ProviderConfig {
            provider: "mystery".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            create_provider(&config),
            Err(BuddyError::Config(_))
        ));
    }
}
