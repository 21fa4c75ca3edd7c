//! Configuration Types
//!
//! All configuration structures with sensible defaults.
//! Supports global (~/.config/recipeforge/) and project (.recipeforge/) level configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{analysis, completion, generation, network, prompt_category, scheduler};
use crate::types::{ForgeError, Result};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// Generation provider settings
    pub llm: LlmConfig,

    /// Task queue settings
    pub scheduler: SchedulerConfig,

    /// Per-product analysis settings
    pub analysis: AnalysisConfig,

    /// Category completion settings
    pub completion: CompletionConfig,

    /// Document store settings
    pub storage: StorageConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            llm: LlmConfig::default(),
            scheduler: SchedulerConfig::default(),
            analysis: AnalysisConfig::default(),
            completion: CompletionConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    /// Returns `ForgeError::Config` on validation failure.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ForgeError::Config(format!(
                "LLM temperature must be between 0.0 and 2.0, got {}",
                self.llm.temperature
            )));
        }

        if !(0.0..=1.0).contains(&self.llm.top_p) {
            return Err(ForgeError::Config(format!(
                "LLM top_p must be between 0.0 and 1.0, got {}",
                self.llm.top_p
            )));
        }

        if self.llm.timeout_secs == 0 {
            return Err(ForgeError::Config(
                "LLM timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.llm.max_output_tokens == 0 {
            return Err(ForgeError::Config(
                "LLM max_output_tokens must be greater than 0".to_string(),
            ));
        }

        if self.scheduler.task_timeout_secs == 0 {
            return Err(ForgeError::Config(
                "Scheduler task_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.analysis.batch_size == 0 {
            return Err(ForgeError::Config(
                "Analysis batch_size must be greater than 0".to_string(),
            ));
        }

        if self.analysis.prompt_category.trim().is_empty() {
            return Err(ForgeError::Config(
                "Analysis prompt_category must not be empty".to_string(),
            ));
        }

        if self.completion.poll_interval_ms == 0 {
            return Err(ForgeError::Config(
                "Completion poll_interval_ms must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

// =============================================================================
// LLM Configuration
// =============================================================================

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name: gemini, openai, ollama
    pub provider: String,

    /// Model name
    pub model: String,

    /// API key; falls back to the provider's conventional env var when unset
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Override for the provider's base URL
    pub api_base: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,

    /// Transport retries for rate limits and transient failures
    pub max_retries: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: "gemini-1.5-flash".to_string(),
            api_key: None,
            api_base: None,
            timeout_secs: network::DEFAULT_TIMEOUT_SECS,
            temperature: generation::TEMPERATURE,
            top_p: generation::TOP_P,
            top_k: generation::TOP_K,
            max_output_tokens: generation::MAX_OUTPUT_TOKENS,
            max_retries: generation::MAX_RETRIES,
        }
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_base", &self.api_base)
            .field("timeout_secs", &self.timeout_secs)
            .field("temperature", &self.temperature)
            .field("top_p", &self.top_p)
            .field("top_k", &self.top_k)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

// =============================================================================
// Scheduler Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Execution bound for one task
    pub task_timeout_secs: u64,

    /// Worker exits after this long with an empty queue
    pub idle_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            task_timeout_secs: scheduler::TASK_TIMEOUT_SECS,
            idle_timeout_secs: scheduler::IDLE_TIMEOUT_SECS,
        }
    }
}

impl SchedulerConfig {
    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

// =============================================================================
// Analysis Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Prompt category whose active blocks run against each product
    pub prompt_category: String,

    /// Blocks processed concurrently per batch
    pub batch_size: usize,

    /// Pause between batches in milliseconds
    pub batch_interval_ms: u64,

    /// Outputs shorter than this are regenerated once
    pub min_output_chars: usize,

    /// Cap on active blocks fetched per product
    pub max_prompt_blocks: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            prompt_category: prompt_category::COMPETITOR_ANALYSIS.to_string(),
            batch_size: analysis::BATCH_SIZE,
            batch_interval_ms: analysis::BATCH_INTERVAL_SECS * 1000,
            min_output_chars: analysis::MIN_OUTPUT_CHARS,
            max_prompt_blocks: analysis::MAX_PROMPT_BLOCKS,
        }
    }
}

impl AnalysisConfig {
    pub fn batch_interval(&self) -> Duration {
        Duration::from_millis(self.batch_interval_ms)
    }
}

// =============================================================================
// Completion Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    /// Interval between analyzed-product counts in milliseconds
    pub poll_interval_ms: u64,

    /// Upper bound on waiting for the category to finish in milliseconds
    pub max_wait_ms: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: completion::POLL_INTERVAL_SECS * 1000,
            max_wait_ms: completion::MAX_WAIT_SECS * 1000,
        }
    }
}

impl CompletionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}

// =============================================================================
// Storage Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file, relative paths resolve against the working directory
    pub database: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from(".recipeforge/recipeforge.db"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.llm.provider, "gemini");
        assert_eq!(config.analysis.batch_size, 2);
        assert_eq!(config.analysis.batch_interval(), Duration::from_secs(30));
        assert_eq!(config.scheduler.task_timeout(), Duration::from_secs(300));
        assert_eq!(config.completion.max_wait(), Duration::from_secs(20));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let mut config = Config::default();
        config.llm.temperature = 3.5;
        assert!(matches!(config.validate(), Err(ForgeError::Config(_))));

        let mut config = Config::default();
        config.analysis.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.completion.poll_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_api_key_not_serialized() {
        let config = Config {
            llm: LlmConfig {
                api_key: Some("sk-secret".to_string()),
                ..LlmConfig::default()
            },
            ..Config::default()
        };
        let rendered = toml::to_string_pretty(&config).unwrap();
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("[llm]"));
        assert!(!format!("{:?}", config.llm).contains("sk-secret"));
    }
}
