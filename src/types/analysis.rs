//! Analysis result types.
//!
//! Every public service call produces an [`AnalysisOutcome`], which serializes
//! to an object carrying a boolean `success` field either way.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::book::{AnalysisType, Book};

/// Confidence assumed for chunk results that did not report one
pub const DEFAULT_CONFIDENCE: f64 = 0.85;

// =============================================================================
// Raw (per-call) analysis
// =============================================================================

/// Normalized response of one text-completion call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawAnalysis {
    pub content: String,
    pub confidence: Option<f64>,
    pub metadata: RawMetadata,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMetadata {
    pub model: String,
    pub tokens_used: u64,
    #[serde(rename = "costUSD")]
    pub cost_usd: f64,
}

impl RawAnalysis {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

// =============================================================================
// Assembled result
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMethod {
    SingleChunk,
    Chunked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisMetadata {
    pub model: String,
    pub tokens_used: u64,
    #[serde(rename = "costUSD")]
    pub cost_usd: f64,
    pub processing_method: ProcessingMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks_processed: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_chunks: Option<usize>,
}

/// Book fields attached to a finished result
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookMetadata {
    pub id: String,
    pub title: String,
    pub author: String,
    pub word_count: usize,
    pub content_fingerprint: String,
}

impl From<&Book> for BookMetadata {
    fn from(book: &Book) -> Self {
        Self {
            id: book.id.clone(),
            title: book.title.clone(),
            author: book.author.clone(),
            word_count: book.effective_word_count(),
            content_fingerprint: book.content_fingerprint(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub success: bool,
    pub content: String,
    pub analysis_type: AnalysisType,
    pub confidence: f64,
    pub metadata: AnalysisMetadata,
    pub analysis_id: String,
    pub book_id: String,
    pub book: BookMetadata,
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub from_cache: bool,
}

// =============================================================================
// Failure and outcome
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub analysis_id: String,
    pub book_id: String,
    pub analysis_type: String,
    pub timestamp: DateTime<Utc>,
}

impl ErrorResponse {
    pub fn new(
        error: impl Into<String>,
        analysis_id: impl Into<String>,
        book_id: impl Into<String>,
        analysis_type: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            error: error.into(),
            analysis_id: analysis_id.into(),
            book_id: book_id.into(),
            analysis_type: analysis_type.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnalysisOutcome {
    Success(Box<AnalysisResult>),
    Failure(ErrorResponse),
}

impl AnalysisOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AnalysisOutcome::Success(_))
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        match self {
            AnalysisOutcome::Success(result) => Some(result),
            AnalysisOutcome::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            AnalysisOutcome::Success(_) => None,
            AnalysisOutcome::Failure(failure) => Some(&failure.error),
        }
    }

    pub fn analysis_id(&self) -> &str {
        match self {
            AnalysisOutcome::Success(result) => &result.analysis_id,
            AnalysisOutcome::Failure(failure) => &failure.analysis_id,
        }
    }
}

impl From<AnalysisResult> for AnalysisOutcome {
    fn from(result: AnalysisResult) -> Self {
        AnalysisOutcome::Success(Box::new(result))
    }
}

impl From<ErrorResponse> for AnalysisOutcome {
    fn from(failure: ErrorResponse) -> Self {
        AnalysisOutcome::Failure(failure)
    }
}

/// Result of running several analysis types over one book
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub book_id: String,
    pub results: Vec<BatchEntry>,
    pub success_count: usize,
    pub failure_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchEntry {
    pub analysis_type: String,
    pub outcome: AnalysisOutcome,
}
