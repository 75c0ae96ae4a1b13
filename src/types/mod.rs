pub mod analysis;
pub mod book;
pub mod error;

pub use analysis::{
    AnalysisMetadata, AnalysisOutcome, AnalysisResult, BatchEntry, BatchResult, BookMetadata,
    DEFAULT_CONFIDENCE, ErrorResponse, ProcessingMethod, RawAnalysis, RawMetadata,
};
pub use book::{AnalysisDepth, AnalysisOptions, AnalysisType, Book};
pub use error::{
    BuddyError, DispatchError, ErrorCategory, ErrorClassifier, LlmError, Result, ValidationError,
    join_violations,
};

/// Storage key for a persisted analysis result
pub fn analysis_key(book_id: &str, analysis_type: AnalysisType) -> String {
    format!("analysis_{}_{}", book_id, analysis_type.as_str())
}
