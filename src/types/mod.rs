pub mod analysis;
pub mod error;
pub mod product;
pub mod prompt;
pub mod recipe;
pub mod task;

pub use analysis::AnalysisResult;
pub use error::{
    EntityKind, ErrorCategory, ErrorClassifier, ForgeError, LlmError, Result, ResultExt,
};
pub use product::{AnalysisStatus, CategoryHierarchy, CategoryKey, Product};
pub use prompt::{PromptBlock, SortOrder};
pub use recipe::{MasterRecipe, ProductRecipe};
pub use task::{Task, TaskType};
