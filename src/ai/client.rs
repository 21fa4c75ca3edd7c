//! Generation Client
//!
//! Formats a prompt template with structured input, runs one provider call
//! and reports the outcome as data. Callers never see a raised error from
//! generation; failures come back as `GenerationOutcome { error: Some(..) }`.

use std::time::Instant;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::provider::{SamplingParams, SharedProvider};
use crate::storage::{GenerationLog, LogStore, SharedDatabase};

const SECTION_DIVIDER: &str = "\n\n---\n\n";

/// Sections appended after the template, in order: (input key, heading)
const INPUT_SECTIONS: &[(&str, &str)] = &[
    ("product_data", "Product Data"),
    ("analysis", "Analysis"),
    ("analyses", "Analyses"),
    ("product_success_recipes", "Product Success Recipes"),
];

/// Caller identity recorded with each generation log entry
#[derive(Debug, Clone, Default)]
pub struct GenerationContext {
    pub prompt_id: Option<String>,
    pub user_id: Option<String>,
    pub project_id: Option<String>,
}

impl GenerationContext {
    pub fn new(prompt_id: &str, user_id: &str, project_id: Option<&str>) -> Self {
        Self {
            prompt_id: Some(prompt_id.to_string()),
            user_id: Some(user_id.to_string()),
            project_id: project_id.map(String::from),
        }
    }
}

/// Result of one (possibly re-run) generation
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOutcome {
    /// Generated text on success
    pub text: Option<String>,
    /// Failure description on error
    pub error: Option<String>,
    pub duration_ms: u64,
    pub model: String,
    /// Provider calls made, including the re-run
    pub calls: usize,
}

impl GenerationOutcome {
    pub fn is_success(&self) -> bool {
        self.text.is_some()
    }

    pub fn rerun(&self) -> bool {
        self.calls > 1
    }
}

pub struct GenerationClient {
    provider: SharedProvider,
    params: SamplingParams,
    log_db: Option<SharedDatabase>,
}

impl GenerationClient {
    pub fn new(provider: SharedProvider, params: SamplingParams) -> Self {
        Self {
            provider,
            params,
            log_db: None,
        }
    }

    /// Record every call in the `generation_logs` collection
    pub fn with_logging(mut self, db: SharedDatabase) -> Self {
        self.log_db = Some(db);
        self
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }

    /// Template followed by a divider and the labelled sections present in `input`
    pub fn format_prompt(template: &str, input: &Value) -> String {
        let mut prompt = format!("{}{}", template.trim(), SECTION_DIVIDER);

        for (key, heading) in INPUT_SECTIONS {
            if let Some(section) = input.get(*key) {
                let body = serde_json::to_string_pretty(section)
                    .unwrap_or_else(|_| section.to_string());
                prompt.push_str(&format!("**{}:**\n{}\n\n", heading, body));
            }
        }

        let category = input.get("category").and_then(Value::as_str);
        let subcategory = input.get("subcategory").and_then(Value::as_str);
        if category.is_some() || subcategory.is_some() {
            prompt.push_str("**Category Context:**\n");
            prompt.push_str(&format!("Category: {}\n", category.unwrap_or_default()));
            prompt.push_str(&format!("Subcategory: {}\n", subcategory.unwrap_or_default()));
        }

        prompt
    }

    /// Run a single provider call
    pub async fn generate(
        &self,
        template: &str,
        input: &Value,
        ctx: &GenerationContext,
    ) -> GenerationOutcome {
        let prompt = Self::format_prompt(template, input);
        let started = Instant::now();
        let result = self.provider.generate(&prompt, &self.params).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let outcome = match result {
            Ok(response) => {
                debug!(
                    prompt_id = ctx.prompt_id.as_deref(),
                    tokens = response.usage.total(),
                    "Generation succeeded in {}ms",
                    duration_ms
                );
                GenerationOutcome {
                    text: Some(response.text),
                    error: None,
                    duration_ms,
                    model: self.provider.model().to_string(),
                    calls: 1,
                }
            }
            Err(e) => {
                warn!(
                    prompt_id = ctx.prompt_id.as_deref(),
                    "Generation failed: {}", e
                );
                GenerationOutcome {
                    text: None,
                    error: Some(e.to_string()),
                    duration_ms,
                    model: self.provider.model().to_string(),
                    calls: 1,
                }
            }
        };

        self.log(&prompt, &outcome, ctx);
        outcome
    }

    /// Like [`generate`](Self::generate), but a successful text shorter than
    /// `min_chars` characters is replaced by exactly one re-run.
    ///
    /// The re-run's outcome is final: if it fails, the short first text is
    /// discarded and the failure is reported.
    pub async fn generate_with_rerun(
        &self,
        template: &str,
        input: &Value,
        ctx: &GenerationContext,
        min_chars: usize,
    ) -> GenerationOutcome {
        let first = self.generate(template, input, ctx).await;

        let too_short = first
            .text
            .as_ref()
            .is_some_and(|text| text.chars().count() < min_chars);
        if !too_short {
            return first;
        }

        info!(
            prompt_id = ctx.prompt_id.as_deref(),
            "Result is shorter than {} chars, re-running once", min_chars
        );
        let mut second = self.generate(template, input, ctx).await;
        second.calls += first.calls;
        second.duration_ms += first.duration_ms;
        second
    }

    /// Best-effort; only calls made on behalf of a user are recorded
    fn log(&self, prompt: &str, outcome: &GenerationOutcome, ctx: &GenerationContext) {
        let Some(db) = &self.log_db else {
            return;
        };
        if ctx.user_id.is_none() {
            return;
        }

        let entry = GenerationLog {
            id: uuid::Uuid::new_v4().to_string(),
            prompt_id: ctx.prompt_id.clone(),
            user_id: ctx.user_id.clone(),
            project_id: ctx.project_id.clone(),
            prompt: prompt.to_string(),
            output: outcome.text.clone(),
            error: outcome.error.clone(),
            model: outcome.model.clone(),
            duration_ms: outcome.duration_ms,
            created_at: Utc::now(),
        };

        if let Err(e) = LogStore::new(db).insert(&entry) {
            warn!("Failed to record generation log: {}", e);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ai::provider::{LlmProvider, LlmResponse};
    use crate::storage::Database;
    use crate::types::{ErrorCategory, LlmError, Result};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Provider that replays scripted results, then repeats `fallback`
    pub(crate) struct ScriptedProvider {
        script: Mutex<VecDeque<std::result::Result<String, ErrorCategory>>>,
        fallback: String,
        pub prompts: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        pub(crate) fn new(
            script: Vec<std::result::Result<String, ErrorCategory>>,
            fallback: impl Into<String>,
        ) -> Self {
            Self {
                script: Mutex::new(script.into()),
                fallback: fallback.into(),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn always(text: impl Into<String>) -> Self {
            Self::new(Vec::new(), text)
        }

        pub(crate) fn call_count(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn generate(&self, prompt: &str, _params: &SamplingParams) -> Result<LlmResponse> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Ok(text)) => Ok(LlmResponse::text_only(text)),
                Some(Err(category)) => Err(LlmError::new(category, "scripted failure").into()),
                None => Ok(LlmResponse::text_only(self.fallback.clone())),
            }
        }

        fn name(&self) -> &str {
            "scripted"
        }

        fn model(&self) -> &str {
            "scripted-1"
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }
    }

    fn client(provider: Arc<ScriptedProvider>) -> GenerationClient {
        GenerationClient::new(provider, SamplingParams::default())
    }

    #[test]
    fn test_format_prompt_sections() {
        let input = json!({
            "product_data": {"title": "Mug"},
            "category": "Home",
            "subcategory": "Kitchen"
        });
        let prompt = GenerationClient::format_prompt("  Analyze this product.  \n", &input);

        assert!(prompt.starts_with("Analyze this product.\n\n---\n\n"));
        assert!(prompt.contains("**Product Data:**\n{\n  \"title\": \"Mug\"\n}"));
        assert!(!prompt.contains("**Analyses:**"));
        assert!(!prompt.contains("**Analysis:**"));
        assert!(prompt.ends_with("**Category Context:**\nCategory: Home\nSubcategory: Kitchen\n"));
    }

    #[tokio::test]
    async fn test_short_output_reruns_once() {
        let provider = Arc::new(ScriptedProvider::new(
            vec![Ok("x".repeat(50)), Ok("y".repeat(300))],
            "unused",
        ));
        let outcome = client(provider.clone())
            .generate_with_rerun("T", &json!({}), &GenerationContext::default(), 200)
            .await;

        assert_eq!(provider.call_count(), 2);
        assert_eq!(outcome.text, Some("y".repeat(300)));
        assert!(outcome.rerun());
    }

    #[tokio::test]
    async fn test_rerun_result_is_accepted_even_if_short() {
        let provider = Arc::new(ScriptedProvider::new(
            vec![Ok("short".into()), Ok("still short".into())],
            "unused",
        ));
        let outcome = client(provider.clone())
            .generate_with_rerun("T", &json!({}), &GenerationContext::default(), 200)
            .await;

        assert_eq!(provider.call_count(), 2);
        assert_eq!(outcome.text.as_deref(), Some("still short"));
    }

    #[tokio::test]
    async fn test_failed_rerun_replaces_short_text() {
        let provider = Arc::new(ScriptedProvider::new(
            vec![Ok("short".into()), Err(ErrorCategory::Network)],
            "unused",
        ));
        let outcome = client(provider.clone())
            .generate_with_rerun("T", &json!({}), &GenerationContext::default(), 200)
            .await;

        assert_eq!(provider.call_count(), 2);
        assert!(outcome.text.is_none());
        assert!(outcome.error.as_ref().unwrap().contains("scripted failure"));
        assert!(outcome.rerun());
    }

    #[tokio::test]
    async fn test_failure_is_not_rerun() {
        let provider = Arc::new(ScriptedProvider::new(
            vec![Err(ErrorCategory::Auth)],
            "z".repeat(300),
        ));
        let outcome = client(provider.clone())
            .generate_with_rerun("T", &json!({}), &GenerationContext::default(), 200)
            .await;

        assert_eq!(provider.call_count(), 1);
        assert!(!outcome.is_success());
        assert!(outcome.error.unwrap().contains("scripted failure"));
    }

    #[tokio::test]
    async fn test_logs_only_with_user() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.initialize().unwrap();
        let provider = Arc::new(ScriptedProvider::always("ok"));
        let client = client(provider).with_logging(db.clone());

        client
            .generate("T", &json!({}), &GenerationContext::new("b1", "u1", None))
            .await;
        client
            .generate(
                "T",
                &json!({}),
                &GenerationContext {
                    prompt_id: Some("b1".into()),
                    ..GenerationContext::default()
                },
            )
            .await;

        assert_eq!(LogStore::new(&db).count_for_prompt("b1").unwrap(), 1);
    }
}
