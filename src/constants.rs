//! Global Constants
//!
//! Centralized constants for configuration and tuning.
//! All magic numbers should be defined here with documentation.

/// Prompt categories stored on prompt blocks
pub mod prompt_category {
    /// Blocks run against every product of a category
    pub const COMPETITOR_ANALYSIS: &str = "competitor_analysis";

    /// Blocks run one at a time by market research tasks
    pub const MARKET_RESEARCH: &str = "market_research";

    /// Templates that turn one product's block analysis into a success recipe
    pub const PRODUCT_RECIPE: &str = "product_recipe";
}

/// Per-product analysis constants
pub mod analysis {
    /// Prompt blocks processed per batch
    pub const BATCH_SIZE: usize = 2;

    /// Pause between prompt batches (seconds), throttles generation volume
    pub const BATCH_INTERVAL_SECS: u64 = 30;

    /// Generated text shorter than this triggers one automatic re-run
    pub const MIN_OUTPUT_CHARS: usize = 200;

    /// Maximum active prompt blocks fetched for one product
    pub const MAX_PROMPT_BLOCKS: usize = 100;
}

/// Scheduler constants
pub mod scheduler {
    /// Overall execution bound for one task (seconds)
    pub const TASK_TIMEOUT_SECS: u64 = 300;

    /// Worker exits after this long with nothing queued (seconds)
    pub const IDLE_TIMEOUT_SECS: u64 = 60;
}

/// Category completion constants
pub mod completion {
    /// Interval between analyzed-product counts (seconds)
    pub const POLL_INTERVAL_SECS: u64 = 2;

    /// Upper bound on waiting for a category to finish (seconds)
    pub const MAX_WAIT_SECS: u64 = 20;

    /// Maximum analysis rows gathered for one master recipe
    pub const MAX_ANALYSES_PER_RECIPE: usize = 1000;

    /// Used when no active product recipe template exists
    pub const DEFAULT_PRODUCT_RECIPE_PROMPT: &str = "Based on the product analysis results, \
         generate a comprehensive success recipe that highlights key strengths, strategies, \
         and recommendations.";
}

/// Generation sampling defaults
pub mod generation {
    pub const TEMPERATURE: f32 = 0.7;
    pub const TOP_P: f32 = 0.95;
    pub const TOP_K: u32 = 40;
    pub const MAX_OUTPUT_TOKENS: u32 = 1024;

    /// Transport retries for retryable provider errors
    pub const MAX_RETRIES: usize = 2;

    /// Base delay for exponential backoff (milliseconds)
    pub const BASE_DELAY_MS: u64 = 500;

    /// Maximum delay between retries (seconds)
    pub const MAX_DELAY_SECS: u64 = 30;
}

/// HTTP/Network constants
pub mod network {
    /// Default request timeout (seconds)
    pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

    /// Connection timeout (seconds)
    pub const CONNECTION_TIMEOUT_SECS: u64 = 30;
}
