//! Analysis Pipeline
//!
//! Scheduling, per-product analysis and category completion.
//!
//! ```text
//! Scheduler ──► AnalysisExecutor ──► CategoryTracker ──► MasterRecipeGenerator
//!   (queue)       (prompt blocks)      (pending sets)       (category recipes)
//! ```

pub mod completion;
pub mod engine;
pub mod executor;
pub mod scheduler;
pub mod status;
pub mod tracker;

pub use completion::{CompletionReport, MasterRecipeGenerator};
pub use engine::Engine;
pub use executor::{AnalysisExecutor, AnalysisSummary};
pub use scheduler::Scheduler;
pub use status::{QueueStatus, queue_status};
pub use tracker::{CategoryTracker, CompletionHandler};
