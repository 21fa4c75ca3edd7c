//! Analysis Executor
//!
//! Runs a product through the active prompt blocks of its prompt category.
//!
//! ## Pipeline
//!
//! ```text
//! load product ─► category key ─► active blocks ─► batches of N ─► merge results ─► tracker
//!                                                   │   (concurrent within a batch,
//!                                                   │    sleep between batches)
//!                                                   ├─► one AnalysisResult row per block
//!                                                   └─► competitor: product recipe per success
//! ```
//!
//! Generation failures stay inside their block: the row records the error
//! and the remaining blocks still run. Lookup failures (missing product,
//! incomplete category, no active blocks) fail the whole task.
//!
//! The executor only registers the product as pending for its category. The
//! scheduler releases it once the task's outcome is recorded, which is where
//! category completion runs.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use serde_json::{Map, Value, json};
use tracing::{debug, info, instrument, warn};

use super::tracker::CategoryTracker;
use crate::ai::{GenerationClient, GenerationContext};
use crate::config::AnalysisConfig;
use crate::constants::completion::DEFAULT_PRODUCT_RECIPE_PROMPT;
use crate::constants::prompt_category;
use crate::storage::{
    AnalysisStore, ProductRecipeStore, ProductStore, PromptStore, SharedDatabase,
};
use crate::types::{
    AnalysisResult, AnalysisStatus, CategoryKey, EntityKind, ForgeError, Product, ProductRecipe,
    PromptBlock, Result, Task, TaskType,
};

const DEFAULT_PRODUCT_RECIPE_ID: &str = "default-product-recipe";

/// What one executed task produced
#[derive(Debug, Clone)]
pub struct AnalysisSummary {
    pub product_id: String,
    pub category: CategoryKey,
    /// Blocks attempted
    pub blocks: usize,
    /// Blocks whose generation failed
    pub failed: usize,
    /// Block title -> generated text or `"Error: ..."`
    pub results: Map<String, Value>,
}

impl AnalysisSummary {
    fn new(product_id: &str, category: &CategoryKey) -> Self {
        Self {
            product_id: product_id.to_string(),
            category: category.clone(),
            blocks: 0,
            failed: 0,
            results: Map::new(),
        }
    }

    fn record(&mut self, row: &AnalysisResult) {
        self.blocks += 1;
        if !row.is_success() {
            self.failed += 1;
        }
        self.results
            .insert(row.prompt_block_title.clone(), row.summary_value());
    }

    pub fn succeeded(&self) -> usize {
        self.blocks - self.failed
    }
}

pub struct AnalysisExecutor {
    db: SharedDatabase,
    client: Arc<GenerationClient>,
    tracker: Arc<CategoryTracker>,
    config: AnalysisConfig,
}

impl AnalysisExecutor {
    pub fn new(
        db: SharedDatabase,
        client: Arc<GenerationClient>,
        tracker: Arc<CategoryTracker>,
        config: AnalysisConfig,
    ) -> Self {
        Self {
            db,
            client,
            tracker,
            config,
        }
    }

    /// Dispatch a task to the pipeline its type selects
    #[instrument(skip(self, task), fields(task_id = %task.task_id, product_id = %task.product_id, task_type = %task.task_type))]
    pub async fn execute(&self, task: &Task) -> Result<AnalysisSummary> {
        let project_id = Some(task.project_id.as_str()).filter(|p| !p.is_empty());

        match task.task_type {
            TaskType::StandardAnalysis => {
                self.analyze_product(&task.product_id, &task.user_id, project_id)
                    .await
            }
            TaskType::CompetitorAnalysis => {
                self.run_competitor_analysis(&task.product_id, &task.user_id, project_id)
                    .await
            }
            TaskType::MarketResearch => {
                let block_id = task.prompt_block_id.as_deref().ok_or_else(|| {
                    ForgeError::Validation("market_research task requires a prompt block".into())
                })?;
                self.run_market_research(&task.product_id, &task.user_id, project_id, block_id)
                    .await
            }
        }
    }

    /// Run every active block against the product, then hand it to the tracker
    pub async fn analyze_product(
        &self,
        product_id: &str,
        user_id: &str,
        project_id: Option<&str>,
    ) -> Result<AnalysisSummary> {
        let product = ProductStore::new(&self.db).require(product_id)?;
        let key = product.require_category_key()?;
        let blocks = self.active_blocks()?;

        let summary = self
            .run_blocks(&product, &key, &blocks, user_id, project_id, false)
            .await?;

        self.register(&key, product_id).await;
        Ok(summary)
    }

    /// Same pipeline as [`analyze_product`](Self::analyze_product), also
    /// maintaining the product's analysis status and per-block product counts,
    /// and writing a product recipe for each successful block
    pub async fn run_competitor_analysis(
        &self,
        product_id: &str,
        user_id: &str,
        project_id: Option<&str>,
    ) -> Result<AnalysisSummary> {
        let product = ProductStore::new(&self.db).require(product_id)?;
        ProductStore::new(&self.db).set_analysis_status(
            product_id,
            AnalysisStatus::InProgress,
            None,
        )?;

        let outcome = async {
            let key = product.require_category_key()?;
            let blocks = self.active_blocks()?;
            let summary = self
                .run_blocks(&product, &key, &blocks, user_id, project_id, true)
                .await?;
            Ok::<_, ForgeError>((key, summary))
        }
        .await;

        match outcome {
            Ok((key, summary)) => {
                ProductStore::new(&self.db).set_analysis_status(
                    product_id,
                    AnalysisStatus::Completed,
                    None,
                )?;
                info!(
                    product_id,
                    succeeded = summary.succeeded(),
                    failed = summary.failed,
                    "Competitor analysis completed"
                );
                self.register(&key, product_id).await;
                Ok(summary)
            }
            Err(e) => {
                let message = e.to_string();
                if let Err(status_err) = ProductStore::new(&self.db).set_analysis_status(
                    product_id,
                    AnalysisStatus::Failed,
                    Some(&message),
                ) {
                    warn!(product_id, "Failed to record analysis failure: {}", status_err);
                }
                Err(e)
            }
        }
    }

    /// Run one market research block against the product
    ///
    /// An unknown block ID falls back to the most recent active market
    /// research block.
    pub async fn run_market_research(
        &self,
        product_id: &str,
        user_id: &str,
        project_id: Option<&str>,
        prompt_block_id: &str,
    ) -> Result<AnalysisSummary> {
        let product = ProductStore::new(&self.db).require(product_id)?;
        let key = product.require_category_key()?;
        let block = self.market_research_block(prompt_block_id)?;

        let input = Self::block_input(&product, &key);
        let row = self
            .run_block(&product, &key, &block, &input, user_id, project_id)
            .await;
        AnalysisStore::new(&self.db).insert(&row)?;

        let mut summary = AnalysisSummary::new(product_id, &key);
        summary.record(&row);

        let products = ProductStore::new(&self.db);
        products.merge_analysis_results(product_id, &summary.results)?;
        products.set_analysis_status(product_id, AnalysisStatus::Completed, None)?;

        info!(product_id, block = %block.block_title, "Market research completed");
        Ok(summary)
    }

    fn active_blocks(&self) -> Result<Vec<PromptBlock>> {
        let blocks = PromptStore::new(&self.db)
            .active_blocks(&self.config.prompt_category, self.config.max_prompt_blocks)?;
        if blocks.is_empty() {
            return Err(ForgeError::Validation(format!(
                "No active {} prompt blocks found",
                self.config.prompt_category
            )));
        }
        Ok(blocks)
    }

    fn market_research_block(&self, prompt_block_id: &str) -> Result<PromptBlock> {
        let prompts = PromptStore::new(&self.db);
        if let Some(block) = prompts.get(prompt_block_id)? {
            return Ok(block);
        }

        warn!(
            prompt_block_id,
            "Prompt block not found, using latest market research block"
        );
        prompts
            .latest_active(prompt_category::MARKET_RESEARCH)?
            .ok_or_else(|| ForgeError::not_found(EntityKind::PromptBlock, prompt_block_id))
    }

    /// Product fields plus the category context shared by every block
    fn block_input(product: &Product, key: &CategoryKey) -> Value {
        let mut input = product.generation_input();
        if let Value::Object(map) = &mut input {
            map.insert("category".into(), Value::String(key.category.clone()));
            map.insert("subcategory".into(), Value::String(key.subcategory.clone()));
        }
        input
    }

    async fn run_blocks(
        &self,
        product: &Product,
        key: &CategoryKey,
        blocks: &[PromptBlock],
        user_id: &str,
        project_id: Option<&str>,
        competitor: bool,
    ) -> Result<AnalysisSummary> {
        let input = Self::block_input(product, key);
        let mut summary = AnalysisSummary::new(&product.id, key);
        let batch_size = self.config.batch_size.max(1);
        let batch_count = blocks.len().div_ceil(batch_size);

        for (index, batch) in blocks.chunks(batch_size).enumerate() {
            if index > 0 {
                tokio::time::sleep(self.config.batch_interval()).await;
            }
            debug!(
                product_id = %product.id,
                "Processing batch {}/{} ({} blocks)",
                index + 1,
                batch_count,
                batch.len()
            );

            let rows = join_all(batch.iter().map(|block| {
                self.run_block(product, key, block, &input, user_id, project_id)
            }))
            .await;

            for row in rows {
                AnalysisStore::new(&self.db).insert(&row)?;
                if competitor {
                    if let Err(e) =
                        PromptStore::new(&self.db).increment_analyzed_count(&row.prompt_block_id)
                    {
                        warn!(block_id = %row.prompt_block_id, "Failed to bump analyzed count: {}", e);
                    }
                    self.write_product_recipe(product, key, &row, project_id).await;
                }
                summary.record(&row);
            }
        }

        ProductStore::new(&self.db).merge_analysis_results(&product.id, &summary.results)?;
        Ok(summary)
    }

    async fn run_block(
        &self,
        product: &Product,
        key: &CategoryKey,
        block: &PromptBlock,
        input: &Value,
        user_id: &str,
        project_id: Option<&str>,
    ) -> AnalysisResult {
        let ctx = GenerationContext::new(&block.id, user_id, project_id);
        let outcome = self
            .client
            .generate_with_rerun(
                &block.analysis_template(),
                input,
                &ctx,
                self.config.min_output_chars,
            )
            .await;

        if let Some(err) = &outcome.error {
            warn!(
                product_id = %product.id,
                block = %block.block_title,
                "Block analysis failed: {}",
                err
            );
        }

        let rerun = outcome.rerun();
        AnalysisResult {
            id: uuid::Uuid::new_v4().to_string(),
            product_id: product.id.clone(),
            project_id: project_id.map(String::from),
            prompt_block_id: block.id.clone(),
            prompt_block_title: block.block_title.clone(),
            user_id: user_id.to_string(),
            category: key.category.clone(),
            subcategory: key.subcategory.clone(),
            input_data: input.clone(),
            output: outcome.text,
            error: outcome.error,
            model: outcome.model,
            duration_ms: outcome.duration_ms,
            rerun,
            created_at: Utc::now(),
        }
    }

    /// Distill one successful block analysis into the product's success
    /// recipe. Failures are logged and never fail the task.
    async fn write_product_recipe(
        &self,
        product: &Product,
        key: &CategoryKey,
        row: &AnalysisResult,
        project_id: Option<&str>,
    ) {
        let Some(analysis) = row.output.as_deref() else {
            return;
        };

        let (template_id, template) =
            match PromptStore::new(&self.db).product_recipe_template(&row.prompt_block_id) {
                Ok(Some(block)) => (block.id.clone(), block.analysis_template()),
                Ok(None) => {
                    debug!(block_id = %row.prompt_block_id, "No product recipe prompt, using default");
                    (
                        DEFAULT_PRODUCT_RECIPE_ID.to_string(),
                        DEFAULT_PRODUCT_RECIPE_PROMPT.to_string(),
                    )
                }
                Err(e) => {
                    warn!(block_id = %row.prompt_block_id, "Failed to load product recipe prompt: {}", e);
                    return;
                }
            };

        let input = json!({
            "product_data": {
                "id": product.id,
                "title": product.title,
            },
            "analysis": {
                "prompt_block_title": row.prompt_block_title,
                "output": analysis,
            },
            "category": key.category,
            "subcategory": key.subcategory,
        });
        let ctx = GenerationContext::new(&template_id, &row.user_id, project_id);
        let outcome = self.client.generate(&template, &input, &ctx).await;

        let Some(content) = outcome.text else {
            warn!(
                product_id = %product.id,
                block = %row.prompt_block_title,
                "Product recipe generation failed: {}",
                outcome.error.unwrap_or_default()
            );
            return;
        };

        let now = Utc::now();
        let recipe = ProductRecipe {
            id: uuid::Uuid::new_v4().to_string(),
            product_id: product.id.clone(),
            product_title: product.title.clone(),
            prompt_block_id: row.prompt_block_id.clone(),
            prompt_block_title: row.prompt_block_title.clone(),
            category: key.category.clone(),
            subcategory: key.subcategory.clone(),
            content,
            user_id: row.user_id.clone(),
            project_id: project_id.map(String::from),
            created_at: now,
            updated_at: now,
        };
        match ProductRecipeStore::new(&self.db).upsert(&recipe) {
            Ok(()) => debug!(product_id = %product.id, block = %row.prompt_block_title, "Product recipe saved"),
            Err(e) => warn!(product_id = %product.id, "Failed to save product recipe: {}", e),
        }
    }

    /// Mark the product in flight for its category. The scheduler releases it
    /// after recording the task outcome.
    async fn register(&self, key: &CategoryKey, product_id: &str) {
        self.tracker.track_key(key, product_id).await;
    }
}
