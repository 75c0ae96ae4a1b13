//! Token Estimation and Sentence Splitting
//!
//! Local heuristics for sizing book text against model context windows.
//!
//! ## Strategy
//! - Estimate tokens before sending anything to a provider
//! - Never estimate below `ceil(chars / 4)`, whatever the method
//! - Keep estimation and sentence splitting behind traits so a real tokenizer
//!   can replace them without touching orchestration
//!
//! All estimators are pure: the same input always yields the same count, and
//! appending text never lowers the count.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::constants::chunking::LONG_WORD_CHARS;

/// Estimates how many model tokens a text will consume
pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, text: &str) -> usize;

    /// Check if content fits within a token budget
    fn fits_budget(&self, text: &str, budget: usize) -> bool {
        self.estimate(text) <= budget
    }
}

/// Shared estimator handle
pub type SharedEstimator = Arc<dyn TokenEstimator>;

/// Token estimation method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EstimationMethod {
    /// Characters only (4 chars = 1 token)
    #[serde(rename = "char")]
    CharBased,
    /// Words only (4 tokens per 3 words)
    #[serde(rename = "word")]
    WordBased,
    /// Words plus extra weight for long words and punctuation
    #[default]
    #[serde(rename = "heuristic")]
    Heuristic,
}

impl std::str::FromStr for EstimationMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "char" => Ok(EstimationMethod::CharBased),
            "word" => Ok(EstimationMethod::WordBased),
            "heuristic" => Ok(EstimationMethod::Heuristic),
            _ => Err(format!(
                "Unknown estimation method: {}. Valid values: char, word, heuristic",
                s
            )),
        }
    }
}

/// Token counter implementing every [`EstimationMethod`]
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenCounter {
    method: EstimationMethod,
}

impl TokenCounter {
    pub fn new(method: EstimationMethod) -> Self {
        Self { method }
    }

    pub fn method(&self) -> EstimationMethod {
        self.method
    }

    /// Crude floor every method respects
    fn lower_bound(text: &str) -> usize {
        text.chars().count().div_ceil(4)
    }

    fn count_word_based(text: &str) -> usize {
        (text.split_whitespace().count() * 4).div_ceil(3)
    }

    /// Word estimate plus one token per long word and one per two punctuation marks
    fn count_heuristic(text: &str) -> usize {
        let mut long_words = 0;
        let mut punctuation = 0;

        for word in text.split_whitespace() {
            let mut letters = 0;
            for ch in word.chars() {
                if ch.is_ascii_punctuation() {
                    punctuation += 1;
                } else {
                    letters += 1;
                }
            }
            if letters > LONG_WORD_CHARS {
                long_words += 1;
            }
        }

        Self::count_word_based(text) + long_words + punctuation / 2
    }
}

impl TokenEstimator for TokenCounter {
    fn estimate(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }

        let estimate = match self.method {
            EstimationMethod::CharBased => 0,
            EstimationMethod::WordBased => Self::count_word_based(text),
            EstimationMethod::Heuristic => Self::count_heuristic(text),
        };

        estimate.max(Self::lower_bound(text))
    }
}

// =============================================================================
// Sentence Splitting
// =============================================================================

/// Finds sentence boundaries in prose
pub trait SentenceSplitter: Send + Sync {
    /// Sentences of `text`, trimmed, terminators included
    fn sentences<'a>(&self, text: &'a str) -> Vec<&'a str>;

    /// Byte offset just past the last terminator in `text` that is followed by
    /// whitespace
    fn last_boundary(&self, text: &str) -> Option<usize>;
}

pub type SharedSplitter = Arc<dyn SentenceSplitter>;

static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]\s+").expect("sentence pattern is valid"));

/// `.`, `!` or `?` followed by whitespace ends a sentence
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexSentenceSplitter;

impl SentenceSplitter for RegexSentenceSplitter {
    fn sentences<'a>(&self, text: &'a str) -> Vec<&'a str> {
        let mut sentences = Vec::new();
        let mut start = 0;

        for m in SENTENCE_END.find_iter(text) {
            // terminator is a single ASCII byte
            let end = m.start() + 1;
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = m.end();
        }

        let tail = text[start..].trim();
        if !tail.is_empty() {
            sentences.push(tail);
        }
        sentences
    }

    fn last_boundary(&self, text: &str) -> Option<usize> {
        SENTENCE_END.find_iter(text).last().map(|m| m.start() + 1)
    }
}
