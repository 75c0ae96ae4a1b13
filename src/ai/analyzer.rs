//! Text Analyzer
//!
//! The external "analyze text" capability the orchestrator depends on.
//! [`LlmAnalyzer`] implements it over any [`LlmProvider`], asking the model
//! to finish with a `Confidence:` line that is parsed and stripped here.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use super::prompt::analysis_prompt;
use super::provider::{CompletionRequest, SharedProvider};
use crate::types::{
    AnalysisDepth, AnalysisOptions, AnalysisType, BuddyError, ErrorCategory, RawAnalysis,
    RawMetadata, Result,
};

/// Generation cap for standard-depth answers
const STANDARD_MAX_TOKENS: usize = 800;
/// Generation cap for detailed answers
const DETAILED_MAX_TOKENS: usize = 1500;

/// Analyzes one piece of text for one analysis type
#[async_trait]
pub trait TextAnalyzer: Send + Sync {
    async fn analyze_text(
        &self,
        content: &str,
        analysis_type: AnalysisType,
        options: &AnalysisOptions,
    ) -> Result<RawAnalysis>;
}

pub type SharedAnalyzer = Arc<dyn TextAnalyzer>;

static CONFIDENCE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[ \t*_]*confidence[ \t*_]*[:=][ \t*_]*([01](?:\.\d+)?)[ \t*_]*$")
        .expect("confidence pattern is valid")
});

/// Split a trailing confidence line off a model answer
pub fn extract_confidence(text: &str) -> (String, Option<f64>) {
    let Some(caps) = CONFIDENCE_LINE.captures_iter(text).last() else {
        return (text.trim().to_string(), None);
    };

    let confidence = caps
        .get(1)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|c| (0.0..=1.0).contains(c));

    let Some(line) = caps.get(0) else {
        return (text.trim().to_string(), confidence);
    };
    let mut stripped = String::with_capacity(text.len());
    stripped.push_str(&text[..line.start()]);
    stripped.push_str(&text[line.end()..]);
    (stripped.trim().to_string(), confidence)
}

/// [`TextAnalyzer`] backed by an LLM provider
pub struct LlmAnalyzer {
    provider: SharedProvider,
}

impl LlmAnalyzer {
    pub fn new(provider: SharedProvider) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl TextAnalyzer for LlmAnalyzer {
    async fn analyze_text(
        &self,
        content: &str,
        analysis_type: AnalysisType,
        options: &AnalysisOptions,
    ) -> Result<RawAnalysis> {
        let prompt = analysis_prompt(content, analysis_type, options);
        let max_tokens = match options.analysis_depth {
            AnalysisDepth::Standard => STANDARD_MAX_TOKENS,
            AnalysisDepth::Detailed => DETAILED_MAX_TOKENS,
        };

        let response = self
            .provider
            .complete(&CompletionRequest {
                system: prompt.system,
                prompt: prompt.user,
                max_tokens: Some(max_tokens),
            })
            .await?;

        let (text, confidence) = extract_confidence(&response.content);
        if text.is_empty() {
            return Err(BuddyError::llm(
                ErrorCategory::ParseError,
                format!("{} returned an empty analysis", self.provider.name()),
            ));
        }

        debug!(
            provider = self.provider.name(),
            %analysis_type,
            tokens = response.usage.total(),
            latency_ms = response.timing.total_ms,
            ?confidence,
            "Text analyzed"
        );

        Ok(RawAnalysis {
            content: text,
            confidence,
            metadata: RawMetadata {
                model: response.metadata.model,
                tokens_used: u64::from(response.usage.total()),
                cost_usd: response.cost_usd,
            },
        })
    }
}
