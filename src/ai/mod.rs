//! AI Integration Layer
//!
//! Token estimation and chunking, prompts, LLM providers, and the request
//! plumbing (rate limiting, timeouts, usage metrics) used by analysis dispatch.

pub mod analyzer;
pub mod chunker;
pub mod metrics;
pub mod prompt;
pub mod provider;
pub mod rate_limiter;
pub mod timeout;
pub mod tokenizer;

pub use analyzer::{LlmAnalyzer, SharedAnalyzer, TextAnalyzer, extract_confidence};
pub use chunker::{Chunk, ContentChunker};
pub use metrics::{MetricsCollector, MetricsSummary, SharedMetrics, TypeMetrics};
pub use prompt::{AnalysisPrompt, PromptBuilder, PromptSection, analysis_prompt};
pub use provider::{
    CompletionRequest, LlmProvider, LlmResponse, ProviderConfig, ResponseMetadata,
    ResponseTiming, SharedProvider, TokenUsage, create_provider,
};
pub use rate_limiter::{RateLimitConfig, RateLimitStats, RateLimiter, SharedRateLimiter};
pub use timeout::{dispatch_timeout, with_timeout};
pub use tokenizer::{
    EstimationMethod, RegexSentenceSplitter, SentenceSplitter, SharedEstimator, SharedSplitter,
    TokenCounter, TokenEstimator,
};
