//! AI Integration Layer
//!
//! Provides text generation for product analysis and master recipes.

pub mod client;
pub mod provider;
pub mod timeout;

pub use client::{GenerationClient, GenerationContext, GenerationOutcome};
pub use provider::{
    ErrorCategory, ErrorClassifier, GeminiProvider, LlmError, LlmProvider, LlmResponse,
    OllamaProvider, OpenAiProvider, ProviderConfig, RetryConfig, RetryingProvider,
    SamplingParams, SharedProvider, TokenUsage, create_provider,
};
pub use timeout::with_timeout;
