//! Unified Error Type System
//!
//! Centralized error types for the entire application.
//!
//! ## Error Taxonomy
//!
//! - **NotFound**: product, prompt block or task missing (terminal for the operation)
//! - **IncompleteCategory**: product lacks category metadata (terminal, needs a data fix)
//! - **Generation**: the generation API failed; contained per prompt block as data
//! - **Timeout**: task execution or completion poll bound exceeded (never retried)
//! - **Persistence**: a durable write failed; logged by callers that treat it as best-effort
//!
//! Generation failures carry an [`ErrorCategory`] so the transport retry layer
//! can tell rate limits and network blips apart from bad requests.

use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Error Categories
// =============================================================================

/// Generation error categories for retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Rate limited - wait then retry
    RateLimit,
    /// Authentication failed - fail fast, don't retry
    Auth,
    /// Network/connectivity issues - retry with backoff
    Network,
    /// Invalid request - don't retry, fix request
    BadRequest,
    /// Safety filter or empty candidate list
    Blocked,
    /// Temporary server issues - retry
    Transient,
    /// Unknown error - no retry
    Unknown,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimit => write!(f, "RATE_LIMIT"),
            Self::Auth => write!(f, "AUTH"),
            Self::Network => write!(f, "NETWORK"),
            Self::BadRequest => write!(f, "BAD_REQUEST"),
            Self::Blocked => write!(f, "BLOCKED"),
            Self::Transient => write!(f, "TRANSIENT"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

impl ErrorCategory {
    /// Check if this category is retryable on the same provider
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimit | Self::Network | Self::Transient)
    }
}

// =============================================================================
// LLM Error
// =============================================================================

/// Generation error with category and provider context
#[derive(Debug, Clone)]
pub struct LlmError {
    /// Error category for retry decisions
    pub category: ErrorCategory,
    /// Detailed error message
    pub message: String,
    /// Provider that produced the error
    pub provider: Option<String>,
}

impl std::fmt::Display for LlmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(provider) = &self.provider {
            write!(f, "[{}:{}] {}", provider, self.category, self.message)
        } else {
            write!(f, "[{}] {}", self.category, self.message)
        }
    }
}

impl std::error::Error for LlmError {}

impl LlmError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            provider: None,
        }
    }

    pub fn with_provider(
        category: ErrorCategory,
        message: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            category,
            message: message.into(),
            provider: Some(provider.into()),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.category.is_retryable()
    }
}

// =============================================================================
// Error Classifier
// =============================================================================

/// Maps provider failures onto [`ErrorCategory`]
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classify HTTP status code directly (more accurate than string matching)
    pub fn classify_http_status(status: u16, message: &str, provider: &str) -> LlmError {
        let category = match status {
            429 => ErrorCategory::RateLimit,
            401 | 403 => ErrorCategory::Auth,
            400 | 404 | 422 => ErrorCategory::BadRequest,
            500 | 502 | 503 | 504 => ErrorCategory::Transient,
            _ => ErrorCategory::Unknown,
        };
        LlmError::with_provider(category, message, provider)
    }

    /// Classify a transport-level reqwest failure
    pub fn classify_transport(err: &reqwest::Error, provider: &str) -> LlmError {
        let category = if err.is_timeout() || err.is_connect() || err.is_request() {
            ErrorCategory::Network
        } else if err.is_decode() {
            ErrorCategory::Transient
        } else {
            ErrorCategory::Unknown
        };
        LlmError::with_provider(category, err.to_string(), provider)
    }
}

// =============================================================================
// Application Error
// =============================================================================

/// Kind of record a lookup failed to find
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Product,
    PromptBlock,
    Task,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Product => write!(f, "Product"),
            Self::PromptBlock => write!(f, "Prompt block"),
            Self::Task => write!(f, "Task"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ForgeError {
    // -------------------------------------------------------------------------
    // System Errors (auto From impl)
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // -------------------------------------------------------------------------
    // Domain Errors
    // -------------------------------------------------------------------------
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: String },

    #[error("Category hierarchy incomplete for product {product_id}")]
    IncompleteCategory { product_id: String },

    #[error("Invalid request: {0}")]
    Validation(String),

    // -------------------------------------------------------------------------
    // Generation Errors
    // -------------------------------------------------------------------------
    /// Structured generation error with category
    #[error("Generation failed: {0}")]
    Generation(LlmError),

    /// Provider setup or protocol error
    #[error("LLM API error: {0}")]
    LlmApi(String),

    // -------------------------------------------------------------------------
    // Runtime Errors
    // -------------------------------------------------------------------------
    #[error("Timeout after {duration:?}: {operation}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Not initialized: run 'recipeforge init' first")]
    NotInitialized,

    #[error("Scheduler is shut down")]
    SchedulerClosed,
}

impl From<LlmError> for ForgeError {
    fn from(err: LlmError) -> Self {
        ForgeError::Generation(err)
    }
}

pub type Result<T> = std::result::Result<T, ForgeError>;

// =============================================================================
// Helper Functions
// =============================================================================

impl ForgeError {
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }
}

/// Context extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn with_context<C: Into<String>>(self, context: C) -> Result<T>;

    /// Add context using a closure (lazy evaluation)
    fn with_context_fn<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>;
}

impl<T, E: std::error::Error + Send + Sync + 'static> ResultExt<T> for std::result::Result<T, E> {
    fn with_context<C: Into<String>>(self, context: C) -> Result<T> {
        self.map_err(|e| ForgeError::Persistence(format!("{}: {}", context.into(), e)))
    }

    fn with_context_fn<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>,
    {
        self.map_err(|e| ForgeError::Persistence(format!("{}: {}", f().into(), e)))
    }
}

// =============================================================================
// Tests
// =============================================================================
