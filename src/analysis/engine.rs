//! Composition root wiring the analysis components together.

use std::sync::Arc;

use tracing::info;

use super::completion::MasterRecipeGenerator;
use super::executor::AnalysisExecutor;
use super::scheduler::Scheduler;
use super::status::{QueueStatus, queue_status};
use super::tracker::CategoryTracker;
use crate::ai::{GenerationClient, ProviderConfig, SamplingParams, SharedProvider, create_provider};
use crate::config::Config;
use crate::storage::{Database, SharedDatabase};
use crate::types::{CategoryKey, Result};

/// Owns the one scheduler, tracker, executor and recipe generator of a process
pub struct Engine {
    config: Config,
    db: SharedDatabase,
    executor: Arc<AnalysisExecutor>,
    generator: Arc<MasterRecipeGenerator>,
    scheduler: Scheduler,
}

impl Engine {
    pub fn new(config: Config, db: SharedDatabase, provider: SharedProvider) -> Self {
        let client = Arc::new(
            GenerationClient::new(provider, SamplingParams::from(&config.llm))
                .with_logging(db.clone()),
        );
        let generator = Arc::new(MasterRecipeGenerator::new(
            db.clone(),
            client.clone(),
            config.completion.clone(),
            config.analysis.clone(),
        ));
        let tracker = Arc::new(CategoryTracker::new(db.clone(), generator.clone()));
        let executor = Arc::new(AnalysisExecutor::new(
            db.clone(),
            client,
            tracker.clone(),
            config.analysis.clone(),
        ));
        let scheduler = Scheduler::new(
            db.clone(),
            executor.clone(),
            tracker,
            config.scheduler.clone(),
        );

        Self {
            config,
            db,
            executor,
            generator,
            scheduler,
        }
    }

    /// Open the configured database and provider
    pub fn open(config: Config) -> Result<Self> {
        let db = Arc::new(Database::open(&config.storage.database)?);
        db.initialize()?;
        let provider = create_provider(&ProviderConfig::from(&config.llm))?;
        info!(
            provider = provider.name(),
            model = provider.model(),
            "Analysis engine ready"
        );
        Ok(Self::new(config, db, provider))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn db(&self) -> &SharedDatabase {
        &self.db
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn executor(&self) -> &AnalysisExecutor {
        &self.executor
    }

    pub fn generator(&self) -> &MasterRecipeGenerator {
        &self.generator
    }

    pub fn queue_status(&self, key: Option<&CategoryKey>) -> Result<QueueStatus> {
        queue_status(&self.db, key, &self.config.analysis.prompt_category)
    }
}
