pub mod analyses;
pub mod database;
pub mod logs;
pub mod product_recipes;
pub mod products;
pub mod prompts;
pub mod recipes;
pub mod tasks;

pub use analyses::AnalysisStore;
pub use database::{Database, PoolConfig, SharedDatabase};
pub use logs::{GenerationLog, LogStore};
pub use product_recipes::ProductRecipeStore;
pub use products::{ProductStatusCounts, ProductStore};
pub use prompts::PromptStore;
pub use recipes::RecipeStore;
pub use tasks::TaskStore;
