//! Unified Error Type System
//!
//! Centralized error types for the analysis core.
//! Provides error classification for retry decisions in the dispatcher.
//!
//! ## Error Categories
//!
//! - **RateLimit**: API rate limiting (wait and retry)
//! - **TokenLimit**: Chunk too large for the model context (fail the chunk)
//! - **Auth**: Authentication failures (fail fast)
//! - **Network**: Connectivity issues (retry with backoff)
//! - **Transient**: Temporary server issues (retry)
//!
//! Public service operations never surface these as `Err`; they are folded
//! into an `ErrorResponse` at the service boundary.

use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Error Categories
// =============================================================================

/// Error categories for retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Rate limited - wait then retry
    RateLimit,
    /// Context/token limit exceeded
    TokenLimit,
    /// Authentication failed - fail fast, don't retry
    Auth,
    /// Network/connectivity issues - retry with backoff
    Network,
    /// Provider unavailable
    Unavailable,
    /// Invalid request - don't retry
    BadRequest,
    /// Provider response could not be parsed
    ParseError,
    /// Temporary server issues - retry
    Transient,
    /// Unknown error - no retry
    Unknown,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimit => write!(f, "RATE_LIMIT"),
            Self::TokenLimit => write!(f, "TOKEN_LIMIT"),
            Self::Auth => write!(f, "AUTH"),
            Self::Network => write!(f, "NETWORK"),
            Self::Unavailable => write!(f, "UNAVAILABLE"),
            Self::BadRequest => write!(f, "BAD_REQUEST"),
            Self::ParseError => write!(f, "PARSE_ERROR"),
            Self::Transient => write!(f, "TRANSIENT"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

impl ErrorCategory {
    /// Check if this category is worth another attempt against the same provider
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimit | Self::Network | Self::Transient | Self::ParseError
        )
    }
}

// =============================================================================
// LLM Error
// =============================================================================

/// Structured provider error with category and retry hint
#[derive(Debug, Clone)]
pub struct LlmError {
    /// Error category for routing decisions
    pub category: ErrorCategory,
    /// Detailed error message
    pub message: String,
    /// Provider that produced the error
    pub provider: Option<String>,
    /// Suggested wait time before retry (if applicable)
    pub retry_after: Option<Duration>,
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
            retry_after: None,
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
            retry_after: None,
        }
    }

    /// Add suggested retry delay
    pub fn retry_after(mut self, duration: Duration) -> Self {
        self.retry_after = Some(duration);
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.category.is_retryable()
    }
}

// =============================================================================
// Error Classifier
// =============================================================================

/// Message fragments checked in order; the first category with a match wins
const MESSAGE_PATTERNS: &[(ErrorCategory, &[&str])] = &[
    (
        ErrorCategory::RateLimit,
        &["rate limit", "429", "too many requests", "quota exceeded"],
    ),
    (
        ErrorCategory::TokenLimit,
        &["context length", "too large", "maximum context", "reduce the length"],
    ),
    (
        ErrorCategory::Auth,
        &["401", "403", "api key", "unauthorized", "permission denied"],
    ),
    (
        ErrorCategory::Network,
        &["network", "connection", "dns", "timed out", "unreachable"],
    ),
    (
        ErrorCategory::Transient,
        &["500", "502", "503", "service unavailable", "overloaded"],
    ),
    // excerpts of violent or explicit fiction can trip provider filters
    (
        ErrorCategory::BadRequest,
        &["content_filter", "content policy", "400", "bad request", "invalid"],
    ),
    (ErrorCategory::ParseError, &["parse", "json"]),
];

impl ErrorCategory {
    /// Suggested pause before retrying, for categories that warrant one
    fn retry_hint(self) -> Option<Duration> {
        match self {
            Self::RateLimit => Some(Duration::from_secs(30)),
            Self::Network => Some(Duration::from_secs(5)),
            Self::Transient => Some(Duration::from_secs(2)),
            _ => None,
        }
    }
}

/// Maps raw provider failures onto an [`ErrorCategory`]
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classify an error message from any provider
    pub fn classify(message: &str, provider: &str) -> LlmError {
        let lower = message.to_lowercase();

        let token_overflow = lower.contains("token")
            && ["limit", "exceed", "maximum"]
                .iter()
                .any(|word| lower.contains(word));

        let category = if token_overflow {
            ErrorCategory::TokenLimit
        } else {
            MESSAGE_PATTERNS
                .iter()
                .find(|(_, needles)| needles.iter().any(|needle| lower.contains(needle)))
                .map(|(category, _)| *category)
                .unwrap_or(ErrorCategory::Unknown)
        };

        Self::build(category, message, provider)
    }

    /// Classify by HTTP status; preferred over message matching when a status exists
    pub fn classify_http_status(status: u16, message: &str, provider: &str) -> LlmError {
        let category = match status {
            429 => ErrorCategory::RateLimit,
            401 | 403 => ErrorCategory::Auth,
            400 | 422 => ErrorCategory::BadRequest,
            404 => ErrorCategory::Unavailable,
            413 => ErrorCategory::TokenLimit,
            500..=599 => ErrorCategory::Transient,
            _ => ErrorCategory::Unknown,
        };
        Self::build(category, message, provider)
    }

    fn build(category: ErrorCategory, message: &str, provider: &str) -> LlmError {
        let err = LlmError::with_provider(category, message, provider);
        match category.retry_hint() {
            Some(delay) => err.retry_after(delay),
            None => err,
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// A single request validation violation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Field that failed validation
    pub field: String,
    /// Detailed message
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ValidationError {}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Join violations into the single message returned to callers
pub fn join_violations(violations: &[ValidationError]) -> String {
    violations
        .iter()
        .map(|v| v.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

// =============================================================================
// Dispatch Error
// =============================================================================

/// Failure of one call to the external text-completion capability
#[derive(Debug, Clone)]
pub struct DispatchError {
    /// Upstream message
    pub message: String,
    /// Classified category
    pub category: ErrorCategory,
    /// Chunk the call belonged to, when chunked
    pub chunk_index: Option<usize>,
}

impl std::fmt::Display for DispatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.chunk_index {
            Some(idx) => write!(f, "chunk {}: {}", idx, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for DispatchError {}

impl DispatchError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            category,
            chunk_index: None,
        }
    }

    pub fn for_chunk(mut self, index: usize) -> Self {
        self.chunk_index = Some(index);
        self
    }
}

impl From<&BuddyError> for DispatchError {
    fn from(err: &BuddyError) -> Self {
        let category = match err {
            BuddyError::Llm(e) => e.category,
            BuddyError::Timeout { .. } => ErrorCategory::Network,
            BuddyError::RateLimited(_) => ErrorCategory::RateLimit,
            _ => ErrorCategory::Unknown,
        };
        DispatchError::new(category, err.to_string())
    }
}

// =============================================================================
// Application Error
// =============================================================================

#[derive(Debug, Error)]
pub enum BuddyError {
    // -------------------------------------------------------------------------
    // System Errors (auto From impl)
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // -------------------------------------------------------------------------
    // Provider Errors
    // -------------------------------------------------------------------------
    #[error("LLM error: {0}")]
    Llm(LlmError),

    #[error("Timeout after {duration:?}: {operation}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    #[error("Rate limited: {0}")]
    RateLimited(String),

    // -------------------------------------------------------------------------
    // Analysis Errors
    // -------------------------------------------------------------------------
    #[error("{}", join_violations(.0))]
    Validation(Vec<ValidationError>),

    #[error("Dispatch failed: {0}")]
    Dispatch(DispatchError),

    #[error("Merge failed: {0}")]
    Merge(String),

    #[error("Invalid analysis result: {0}")]
    InvalidResult(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Service is shutting down")]
    ShuttingDown,

    // -------------------------------------------------------------------------
    // Setup Errors
    // -------------------------------------------------------------------------
    #[error("Config error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<LlmError> for BuddyError {
    fn from(err: LlmError) -> Self {
        BuddyError::Llm(err)
    }
}

impl From<DispatchError> for BuddyError {
    fn from(err: DispatchError) -> Self {
        BuddyError::Dispatch(err)
    }
}

impl From<r2d2::Error> for BuddyError {
    fn from(err: r2d2::Error) -> Self {
        BuddyError::Storage(format!("Connection pool error: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, BuddyError>;

impl BuddyError {
    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create an LLM error with category
    pub fn llm(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self::Llm(LlmError::new(category, message))
    }

    /// Check if this error can be retried against the same provider
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Llm(e) => e.is_retryable(),
            Self::Timeout { .. } => true,
            _ => false,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
