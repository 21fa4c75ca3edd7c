//! Google Gemini Provider
//!
//! LLM provider using the Generative Language `generateContent` endpoint.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{
    LlmProvider, LlmResponse, ProviderConfig, ResponseMetadata, ResponseTiming, SamplingParams,
    TokenUsage, error_from_response,
};
use crate::types::{ErrorCategory, ErrorClassifier, ForgeError, LlmError, Result};

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-1.5-flash";
const PROVIDER: &str = "gemini";

/// Gemini provider with secure API key handling
pub struct GeminiProvider {
    api_key: SecretString,
    api_base: String,
    model: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .finish()
    }
}

impl GeminiProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let api_key_str = config
            .api_key
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .ok_or_else(|| {
                ForgeError::Config(
                    "Gemini API key not found. Set GEMINI_API_KEY env var or provide in config"
                        .to_string(),
                )
            })?;

        let api_base = config
            .api_base
            .map(|base| base.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());

        let model = config.model.unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ForgeError::LlmApi(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_key: SecretString::from(api_key_str),
            api_base,
            model,
            client,
        })
    }

    fn build_request(prompt: &str, params: &SamplingParams) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: params.temperature,
                top_p: params.top_p,
                top_k: params.top_k,
                max_output_tokens: params.max_output_tokens,
            },
        }
    }

    /// Concatenated text of the first candidate, or a `Blocked` error
    fn extract_text(body: GenerateContentResponse) -> std::result::Result<String, LlmError> {
        let Some(candidate) = body.candidates.into_iter().next() else {
            let reason = body
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .unwrap_or_else(|| "no candidates returned".to_string());
            return Err(LlmError::with_provider(
                ErrorCategory::Blocked,
                format!("Prompt blocked: {}", reason),
                PROVIDER,
            ));
        };

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        if text.is_empty() {
            let reason = candidate
                .finish_reason
                .unwrap_or_else(|| "UNKNOWN".to_string());
            return Err(LlmError::with_provider(
                ErrorCategory::Blocked,
                format!("Empty candidate (finish reason: {})", reason),
                PROVIDER,
            ));
        }

        Ok(text)
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    async fn generate(&self, prompt: &str, params: &SamplingParams) -> Result<LlmResponse> {
        info!(
            "Generating with Gemini (model: {}, temperature: {})",
            self.model, params.temperature
        );

        let start_time = Instant::now();
        let request = Self::build_request(prompt, params);
        let url = format!("{}/models/{}:generateContent", self.api_base, self.model);

        debug!("Sending request to Gemini API");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| ErrorClassifier::classify_transport(&e, PROVIDER))?;

        let elapsed = start_time.elapsed();

        if !response.status().is_success() {
            return Err(error_from_response(response, PROVIDER).await);
        }

        let body: GenerateContentResponse = response.json().await.map_err(|e| {
            LlmError::with_provider(
                ErrorCategory::Transient,
                format!("Failed to parse Gemini response: {}", e),
                PROVIDER,
            )
        })?;

        let usage = body
            .usage_metadata
            .as_ref()
            .map(|u| TokenUsage::new(u.prompt_token_count, u.candidates_token_count))
            .unwrap_or_default();

        let text = Self::extract_text(body)?;

        Ok(LlmResponse {
            text,
            usage,
            timing: ResponseTiming::from_duration(elapsed),
            metadata: ResponseMetadata {
                model: self.model.clone(),
                provider: PROVIDER.to_string(),
            },
        })
    }

    fn name(&self) -> &str {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/models/{}", self.api_base, self.model);

        let response = self
            .client
            .get(&url)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                info!("Gemini API is available");
                Ok(true)
            }
            Ok(resp) => {
                warn!("Gemini API check failed: {}", resp.status());
                Ok(false)
            }
            Err(e) => {
                warn!("Gemini API check failed: {}", e);
                Ok(false)
            }
        }
    }
}

// Request/Response types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}
