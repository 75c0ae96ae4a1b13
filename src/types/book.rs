//! Book and analysis request types.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A book owned by the surrounding library; read-only to the analysis core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Book {
    pub id: String,
    pub title: String,
    pub author: String,
    pub content: String,
    pub word_count: usize,
}

impl Book {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        author: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let content = content.into();
        let word_count = content.split_whitespace().count();
        Self {
            id: id.into(),
            title: title.into(),
            author: author.into(),
            content,
            word_count,
        }
    }

    /// Word count, falling back to counting the content when unset
    pub fn effective_word_count(&self) -> usize {
        if self.word_count > 0 {
            self.word_count
        } else {
            self.content.split_whitespace().count()
        }
    }

    /// SHA-256 of the content, hex encoded
    pub fn content_fingerprint(&self) -> String {
        let digest = Sha256::digest(self.content.as_bytes());
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

// =============================================================================
// Analysis Type
// =============================================================================

/// The fixed set of supported analyses
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisType {
    Summary,
    Themes,
    Characters,
    Difficulty,
    Sentiment,
    Style,
}

impl AnalysisType {
    pub const ALL: [AnalysisType; 6] = [
        AnalysisType::Summary,
        AnalysisType::Themes,
        AnalysisType::Characters,
        AnalysisType::Difficulty,
        AnalysisType::Sentiment,
        AnalysisType::Style,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisType::Summary => "summary",
            AnalysisType::Themes => "themes",
            AnalysisType::Characters => "characters",
            AnalysisType::Difficulty => "difficulty",
            AnalysisType::Sentiment => "sentiment",
            AnalysisType::Style => "style",
        }
    }

    /// Comma separated list of supported names, for error messages
    pub fn supported_list() -> String {
        Self::ALL
            .iter()
            .map(|t| t.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl std::fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AnalysisType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "summary" => Ok(AnalysisType::Summary),
            "themes" => Ok(AnalysisType::Themes),
            "characters" => Ok(AnalysisType::Characters),
            "difficulty" => Ok(AnalysisType::Difficulty),
            "sentiment" => Ok(AnalysisType::Sentiment),
            "style" => Ok(AnalysisType::Style),
            _ => Err(format!(
                "Unsupported analysis type '{}'. Supported: {}",
                s,
                Self::supported_list()
            )),
        }
    }
}

// =============================================================================
// Analysis Options
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisDepth {
    #[default]
    Standard,
    Detailed,
}

impl std::str::FromStr for AnalysisDepth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "standard" => Ok(AnalysisDepth::Standard),
            "detailed" => Ok(AnalysisDepth::Detailed),
            _ => Err(format!(
                "Invalid depth '{}'. Valid values: standard, detailed",
                s
            )),
        }
    }
}

/// Per-request options; every recognized key is an explicit field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnalysisOptions {
    pub analysis_depth: AnalysisDepth,
    pub include_quotes: bool,
    pub target_audience: Option<String>,
    /// Overrides the configured chunk size
    pub max_tokens_per_chunk: Option<usize>,
    /// Per-call dispatch timeout; must be at least 1000 when set
    pub timeout_ms: Option<u64>,
    /// Accept books with no content
    pub allow_empty_content: bool,
}

impl AnalysisOptions {
    pub fn detailed() -> Self {
        Self {
            analysis_depth: AnalysisDepth::Detailed,
            ..Default::default()
        }
    }
}
