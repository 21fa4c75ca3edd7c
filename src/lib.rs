//! RecipeForge - Product Analysis Scheduler
//!
//! Runs scraped e-commerce products through administrator-defined prompt
//! blocks and, once every product of a category has been analyzed, distills
//! the analyses into one master recipe per block and category.
//!
//! ## Core Features
//!
//! - **Delay Queue**: single worker, min-heap on due time, per-task timeout
//! - **Batched Analysis**: prompt blocks run in throttled batches with a short-output re-run
//! - **Category Completion**: per-category pending sets trigger master recipes exactly once
//! - **Provider Abstraction**: Gemini, OpenAI and Ollama with retrying transport
//!
//! ## Quick Start
//!
//! ```ignore
//! use recipeforge::{Config, Engine, TaskType};
//!
//! let engine = Engine::open(Config::default())?;
//! let task_id = engine
//!     .scheduler()
//!     .schedule("p1", "u1", "proj", Duration::ZERO, TaskType::CompetitorAnalysis, None)
//!     .await?;
//! engine.scheduler().drain().await;
//! let task = engine.scheduler().get_status(&task_id)?;
//! ```
//!
//! ## Modules
//!
//! - [`ai`]: generation providers, retry and the generation client
//! - [`analysis`]: scheduler, executor, category tracker, master recipes
//! - [`storage`]: SQLite document store with connection pooling
//! - [`config`]: layered configuration

pub mod ai;
pub mod analysis;
pub mod cli;
pub mod config;
pub mod constants;
pub mod storage;
pub mod types;

// Configuration
pub use config::{Config, ConfigLoader};

// Error Types
pub use types::{ErrorCategory, ForgeError, Result, ResultExt};

// Domain
pub use types::{AnalysisResult, CategoryKey, MasterRecipe, Product, PromptBlock, Task, TaskType};

// Storage
pub use storage::{Database, PoolConfig, SharedDatabase};

// Pipeline
pub use analysis::{
    AnalysisExecutor, CategoryTracker, CompletionHandler, Engine, MasterRecipeGenerator,
    QueueStatus, Scheduler,
};

// AI
pub use ai::{GenerationClient, LlmProvider, LlmResponse, create_provider, with_timeout};
