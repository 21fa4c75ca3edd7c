//! Completion Checker / Master Recipe Generator
//!
//! When a category's pending set drains, waits (bounded) until every product
//! stored under the category has a row for every active block, then
//! synthesizes one master recipe per active prompt block. A block's product
//! recipes are the preferred input; its successful analyses are the fallback.
//!
//! A timed-out wait generates nothing; the next drain of the same category
//! gets another chance. Creation goes through `INSERT OR IGNORE` against the
//! unique `(prompt_block_id, category, subcategory)` index, so concurrent
//! checks for one category produce at most one recipe per block.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::tracker::CompletionHandler;
use crate::ai::{GenerationClient, GenerationContext};
use crate::config::{AnalysisConfig, CompletionConfig};
use crate::constants::completion::MAX_ANALYSES_PER_RECIPE;
use crate::storage::{
    AnalysisStore, ProductRecipeStore, ProductStore, PromptStore, RecipeStore, SharedDatabase,
};
use crate::types::{AnalysisResult, CategoryKey, MasterRecipe, ProductRecipe, PromptBlock, Result};

/// What a master recipe is distilled from
enum RecipeSource {
    ProductRecipes(Vec<ProductRecipe>),
    Analyses(Vec<AnalysisResult>),
}

impl RecipeSource {
    fn len(&self) -> usize {
        match self {
            Self::ProductRecipes(recipes) => recipes.len(),
            Self::Analyses(rows) => rows.len(),
        }
    }

    /// Distinct contributing products in first-seen order
    fn product_ids(&self) -> Vec<String> {
        let ids: Vec<&str> = match self {
            Self::ProductRecipes(recipes) => recipes.iter().map(|r| r.product_id.as_str()).collect(),
            Self::Analyses(rows) => rows.iter().map(|r| r.product_id.as_str()).collect(),
        };
        let mut seen = HashSet::new();
        ids.into_iter()
            .filter(|id| seen.insert(*id))
            .map(String::from)
            .collect()
    }
}

/// Tally of one completion check or regeneration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionReport {
    /// Products stored under the category
    pub expected: usize,
    /// Products with a row for every active block
    pub analyzed: usize,
    /// The wait bound expired before `analyzed` reached `expected`
    pub timed_out: bool,
    pub created: usize,
    pub updated: usize,
    /// Recipe already present
    pub existing: usize,
    /// No master template, or neither product recipes nor successful analyses
    pub skipped: usize,
    /// Generation failed
    pub failed: usize,
}

pub struct MasterRecipeGenerator {
    db: SharedDatabase,
    client: Arc<GenerationClient>,
    completion: CompletionConfig,
    analysis: AnalysisConfig,
}

impl MasterRecipeGenerator {
    pub fn new(
        db: SharedDatabase,
        client: Arc<GenerationClient>,
        completion: CompletionConfig,
        analysis: AnalysisConfig,
    ) -> Self {
        Self {
            db,
            client,
            completion,
            analysis,
        }
    }

    /// Wait for the category to be fully analyzed, then create missing recipes
    #[instrument(skip(self), fields(category = %key))]
    pub async fn check_and_generate(
        &self,
        key: &CategoryKey,
        user_id: &str,
    ) -> Result<CompletionReport> {
        let mut report = self.wait_for_analyses(key).await?;
        if report.timed_out {
            warn!(
                category = %key,
                "Timed out waiting for analyses ({}/{} products), skipping master recipes",
                report.analyzed,
                report.expected
            );
            return Ok(report);
        }
        if report.expected == 0 {
            debug!(category = %key, "No products stored for category");
            return Ok(report);
        }

        info!(
            category = %key,
            products = report.expected,
            "All products analyzed, generating master recipes"
        );
        self.generate_all(key, user_id, false, &mut report).await?;
        Ok(report)
    }

    /// Regenerate every block's recipe for the category in place, without waiting
    #[instrument(skip(self), fields(category = %key))]
    pub async fn regenerate(&self, key: &CategoryKey, user_id: &str) -> Result<CompletionReport> {
        let mut report = CompletionReport {
            expected: ProductStore::new(&self.db).count_in_category(key)?,
            analyzed: self.analyzed_count(key)?,
            ..CompletionReport::default()
        };
        self.generate_all(key, user_id, true, &mut report).await?;
        Ok(report)
    }

    fn analyzed_count(&self, key: &CategoryKey) -> Result<usize> {
        AnalysisStore::new(&self.db).count_analyzed_products(key, &self.analysis.prompt_category)
    }

    /// Poll the analyzed-product count until it reaches the stored product count
    async fn wait_for_analyses(&self, key: &CategoryKey) -> Result<CompletionReport> {
        let expected = ProductStore::new(&self.db).count_in_category(key)?;
        let deadline = Instant::now() + self.completion.max_wait();

        loop {
            let analyzed = self.analyzed_count(key)?;
            debug!(category = %key, analyzed, expected, "Polled category progress");

            if analyzed >= expected {
                return Ok(CompletionReport {
                    expected,
                    analyzed,
                    ..CompletionReport::default()
                });
            }
            if Instant::now() >= deadline {
                return Ok(CompletionReport {
                    expected,
                    analyzed,
                    timed_out: true,
                    ..CompletionReport::default()
                });
            }

            tokio::time::sleep(self.completion.poll_interval()).await;
        }
    }

    async fn generate_all(
        &self,
        key: &CategoryKey,
        user_id: &str,
        replace: bool,
        report: &mut CompletionReport,
    ) -> Result<()> {
        let blocks = PromptStore::new(&self.db)
            .active_blocks(&self.analysis.prompt_category, self.analysis.max_prompt_blocks)?;

        for block in &blocks {
            let Some(template) = block.master_recipe_template() else {
                debug!(block = %block.block_title, "No master recipe prompt, skipping");
                report.skipped += 1;
                continue;
            };

            if !replace && RecipeStore::new(&self.db).exists(&block.id, key)? {
                report.existing += 1;
                continue;
            }

            let Some(source) = self.recipe_source(&block.id, key)? else {
                debug!(block = %block.block_title, "No product recipes or successful analyses, skipping");
                report.skipped += 1;
                continue;
            };

            let Some(recipe) = self
                .synthesize(block, template, key, user_id, &source)
                .await
            else {
                report.failed += 1;
                continue;
            };

            let recipes = RecipeStore::new(&self.db);
            if replace {
                recipes.upsert(&recipe)?;
                report.updated += 1;
            } else if recipes.insert_if_absent(&recipe)? {
                info!(block = %block.block_title, category = %key, "Master recipe created");
                report.created += 1;
            } else {
                report.existing += 1;
            }
        }

        Ok(())
    }

    /// Product recipes for the block if any exist, else its successful analyses
    fn recipe_source(&self, block_id: &str, key: &CategoryKey) -> Result<Option<RecipeSource>> {
        let recipes =
            ProductRecipeStore::new(&self.db).for_block(block_id, key, MAX_ANALYSES_PER_RECIPE)?;
        if !recipes.is_empty() {
            return Ok(Some(RecipeSource::ProductRecipes(recipes)));
        }

        let analyses = AnalysisStore::new(&self.db).successful_for_block(
            block_id,
            key,
            MAX_ANALYSES_PER_RECIPE,
        )?;
        Ok((!analyses.is_empty()).then_some(RecipeSource::Analyses(analyses)))
    }

    async fn synthesize(
        &self,
        block: &PromptBlock,
        template: &str,
        key: &CategoryKey,
        user_id: &str,
        source: &RecipeSource,
    ) -> Option<MasterRecipe> {
        let input = Self::recipe_input(key, block, source);
        let ctx = GenerationContext::new(&block.id, user_id, None);
        let outcome = self
            .client
            .generate_with_rerun(template, &input, &ctx, self.analysis.min_output_chars)
            .await;

        let Some(content) = outcome.text else {
            warn!(
                block = %block.block_title,
                category = %key,
                "Master recipe generation failed: {}",
                outcome.error.unwrap_or_default()
            );
            return None;
        };

        let product_ids = source.product_ids();
        let now = Utc::now();
        Some(MasterRecipe {
            id: uuid::Uuid::new_v4().to_string(),
            prompt_block_id: block.id.clone(),
            prompt_block_title: block.block_title.clone(),
            category: key.category.clone(),
            subcategory: key.subcategory.clone(),
            content,
            product_count: product_ids.len(),
            product_ids,
            user_id: user_id.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    fn recipe_input(key: &CategoryKey, block: &PromptBlock, source: &RecipeSource) -> Value {
        let mut input = json!({
            "category": key.category,
            "subcategory": key.subcategory,
            "prompt_block_title": block.block_title,
            "products_count": source.len(),
        });

        let (section, entries): (&str, Vec<Value>) = match source {
            RecipeSource::ProductRecipes(recipes) => (
                "product_success_recipes",
                recipes
                    .iter()
                    .map(|r| {
                        json!({
                            "product_id": r.product_id,
                            "product_title": r.product_title,
                            "content": r.content,
                        })
                    })
                    .collect(),
            ),
            RecipeSource::Analyses(rows) => (
                "analyses",
                rows.iter()
                    .map(|a| {
                        json!({
                            "product_id": a.product_id,
                            "output": a.output,
                        })
                    })
                    .collect(),
            ),
        };
        if let Value::Object(map) = &mut input {
            map.insert(section.to_string(), Value::Array(entries));
        }
        input
    }
}

#[async_trait]
impl CompletionHandler for MasterRecipeGenerator {
    async fn category_drained(&self, key: &CategoryKey, user_id: &str) {
        match self.check_and_generate(key, user_id).await {
            Ok(report) => debug!(category = %key, ?report, "Completion check finished"),
            Err(e) => warn!(category = %key, "Completion check failed: {}", e),
        }
    }
}
