//! LLM Provider Abstraction
//!
//! Defines the LlmProvider trait for plain-text generation.
//! All providers return `LlmResponse` with token usage and timing.
//!
//! ## Modules
//!
//! - `gemini`: Google Generative Language API (default backend)
//! - `openai`: OpenAI-compatible chat completions
//! - `ollama`: Locally-running Ollama models
//! - `retry`: Exponential backoff wrapper for transient failures

mod gemini;
mod ollama;
mod openai;
mod retry;

pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;
pub use retry::{RetryConfig, RetryingProvider};

pub use crate::types::{ErrorCategory, ErrorClassifier, LlmError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::constants::generation;
use crate::types::{ForgeError, Result};

// =============================================================================
// Sampling Parameters
// =============================================================================

/// Sampling parameters forwarded to the provider on every call
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: generation::TEMPERATURE,
            top_p: generation::TOP_P,
            top_k: generation::TOP_K,
            max_output_tokens: generation::MAX_OUTPUT_TOKENS,
        }
    }
}

impl From<&LlmConfig> for SamplingParams {
    fn from(config: &LlmConfig) -> Self {
        Self {
            temperature: config.temperature,
            top_p: config.top_p,
            top_k: config.top_k,
            max_output_tokens: config.max_output_tokens,
        }
    }
}

// =============================================================================
// LLM Response with Usage Metrics
// =============================================================================

/// Generated text with usage, timing and provider info
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub text: String,
    pub usage: TokenUsage,
    pub timing: ResponseTiming,
    pub metadata: ResponseMetadata,
}

impl LlmResponse {
    /// Create response with text only (usage/timing unknown)
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: TokenUsage::default(),
            timing: ResponseTiming::default(),
            metadata: ResponseMetadata::default(),
        }
    }
}

/// Token usage as reported by the provider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// Response timing metrics
#[derive(Debug, Clone, Default)]
pub struct ResponseTiming {
    /// Total response time in milliseconds (wall clock)
    pub total_ms: u64,
}

impl ResponseTiming {
    pub fn from_duration(duration: Duration) -> Self {
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

/// Shared LLM provider type for concurrent access across tasks.
pub type SharedProvider = Arc<dyn LlmProvider + Send + Sync>;

// =============================================================================
// Provider Configuration
// =============================================================================

/// Configuration for LLM providers
///
/// API keys are never serialized and are redacted in debug output. Each
/// provider converts the key to SecretString internally.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider type: "gemini", "openai", "ollama"
    pub provider: String,
    /// Model name (provider-specific)
    pub model: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// API base URL (for custom endpoints)
    #[serde(default)]
    pub api_base: Option<String>,
    /// Transport retries for retryable failures; 0 disables the retry wrapper
    #[serde(default)]
    pub max_retries: usize,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_base", &self.api_base)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: None,
            timeout_secs: crate::constants::network::DEFAULT_TIMEOUT_SECS,
            api_key: None,
            api_base: None,
            max_retries: generation::MAX_RETRIES,
        }
    }
}

impl From<&LlmConfig> for ProviderConfig {
    fn from(config: &LlmConfig) -> Self {
        Self {
            provider: config.provider.clone(),
            model: Some(config.model.clone()).filter(|m| !m.trim().is_empty()),
            timeout_secs: config.timeout_secs,
            api_key: config.api_key.clone(),
            api_base: config.api_base.clone(),
            max_retries: config.max_retries,
        }
    }
}

// =============================================================================
// LLM Provider Trait
// =============================================================================

/// Text generation provider
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate text for a fully formatted prompt.
    ///
    /// Failures are reported as `ForgeError::Generation` carrying an
    /// [`ErrorCategory`] so callers can decide whether to retry.
    async fn generate(&self, prompt: &str, params: &SamplingParams) -> Result<LlmResponse>;

    /// Provider name for logging
    fn name(&self) -> &str;

    /// Model name currently in use
    fn model(&self) -> &str;

    /// Check if the provider is reachable
    async fn health_check(&self) -> Result<bool>;
}

/// Create a shared provider from configuration
pub fn create_provider(config: &ProviderConfig) -> Result<SharedProvider> {
    let base: SharedProvider = match config.provider.as_str() {
        "gemini" => Arc::new(GeminiProvider::new(config.clone())?),
        "openai" => Arc::new(OpenAiProvider::new(config.clone())?),
        "ollama" => Arc::new(OllamaProvider::new(config.clone())?),
        _ => {
            return Err(ForgeError::Config(format!(
                "Unknown provider: {}. Supported: gemini, openai, ollama",
                config.provider
            )));
        }
    };

    if config.max_retries == 0 {
        return Ok(base);
    }

    Ok(Arc::new(RetryingProvider::new(
        base,
        RetryConfig::with_max_retries(config.max_retries),
    )))
}

/// Map a non-success HTTP response onto a categorized generation error
pub(crate) async fn error_from_response(response: reqwest::Response, provider: &str) -> ForgeError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    ErrorClassifier::classify_http_status(
        status.as_u16(),
        &format!("API error ({}): {}", status, body),
        provider,
    )
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_provider_rejected() {
        let config = ProviderConfig {
            provider: "claude".into(),
            ..ProviderConfig::default()
        };
        assert!(matches!(
            create_provider(&config),
            Err(ForgeError::Config(_))
        ));
    }

    #[test]
    fn test_provider_config_redacts_key() {
        let config = ProviderConfig {
            api_key: Some("secret-key".into()),
            ..ProviderConfig::default()
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("secret-key"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_sampling_params_from_config() {
        let mut llm = LlmConfig::default();
        llm.top_k = 12;
        let params = SamplingParams::from(&llm);
        assert_eq!(params.top_k, 12);
        assert_eq!(params.max_output_tokens, 1024);
        assert_eq!(SamplingParams::default().temperature, 0.7);
    }

    #[tokio::test]
    async fn test_ollama_provider_builds_without_key() {
        let config = ProviderConfig {
            provider: "ollama".into(),
            max_retries: 0,
            ..ProviderConfig::default()
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.name(), "ollama");
    }
}
