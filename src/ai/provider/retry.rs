//! Retrying Provider
//!
//! Wraps any provider with exponential backoff (via `backon`). Only
//! generation errors whose category is retryable (rate limit, network,
//! transient) are retried; auth, bad request and blocked prompts fail fast.

use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use tracing::warn;

use super::{LlmProvider, LlmResponse, SamplingParams, SharedProvider};
use crate::constants::generation;
use crate::types::{ForgeError, Result};

/// Backoff settings for transport retries
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: generation::MAX_RETRIES,
            base_delay: Duration::from_millis(generation::BASE_DELAY_MS),
            max_delay: Duration::from_secs(generation::MAX_DELAY_SECS),
        }
    }
}

impl RetryConfig {
    pub fn with_max_retries(max_retries: usize) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries)
            .with_jitter()
    }
}

fn is_retryable(err: &ForgeError) -> bool {
    matches!(err, ForgeError::Generation(e) if e.is_retryable())
}

pub struct RetryingProvider {
    inner: SharedProvider,
    config: RetryConfig,
}

impl RetryingProvider {
    pub fn new(inner: SharedProvider, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl LlmProvider for RetryingProvider {
    async fn generate(&self, prompt: &str, params: &SamplingParams) -> Result<LlmResponse> {
        (|| self.inner.generate(prompt, params))
            .retry(self.config.backoff())
            .when(is_retryable)
            .notify(|err: &ForgeError, delay: Duration| {
                warn!(
                    provider = self.inner.name(),
                    "Retrying generation in {:?}: {}", delay, err
                );
            })
            .await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    async fn health_check(&self) -> Result<bool> {
        self.inner.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ErrorCategory, LlmError};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyProvider {
        calls: AtomicUsize,
        failures: usize,
        category: ErrorCategory,
    }

    #[async_trait]
    impl LlmProvider for FlakyProvider {
        async fn generate(&self, _prompt: &str, _params: &SamplingParams) -> Result<LlmResponse> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(LlmError::new(self.category, "simulated").into())
            } else {
                Ok(LlmResponse::text_only("done"))
            }
        }

        fn name(&self) -> &str {
            "flaky"
        }

        fn model(&self) -> &str {
            "flaky-1"
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }
    }

    fn fast_config(max_retries: usize) -> RetryConfig {
        RetryConfig {
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn test_retries_transient_errors() {
        let inner = Arc::new(FlakyProvider {
            calls: AtomicUsize::new(0),
            failures: 2,
            category: ErrorCategory::RateLimit,
        });
        let provider = RetryingProvider::new(inner.clone(), fast_config(3));

        let response = provider
            .generate("prompt", &SamplingParams::default())
            .await
            .unwrap();
        assert_eq!(response.text, "done");
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_auth_errors_fail_fast() {
        let inner = Arc::new(FlakyProvider {
            calls: AtomicUsize::new(0),
            failures: 5,
            category: ErrorCategory::Auth,
        });
        let provider = RetryingProvider::new(inner.clone(), fast_config(3));

        let result = provider.generate("prompt", &SamplingParams::default()).await;
        assert!(result.is_err());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let inner = Arc::new(FlakyProvider {
            calls: AtomicUsize::new(0),
            failures: 10,
            category: ErrorCategory::Network,
        });
        let provider = RetryingProvider::new(inner.clone(), fast_config(2));

        assert!(provider.generate("prompt", &SamplingParams::default()).await.is_err());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
        assert_eq!(provider.name(), "flaky");
    }
}
