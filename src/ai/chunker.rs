//! Content Chunking
//!
//! Splits book text into windows that fit a model's context, sized by the
//! estimator's characters-per-token ratio for that text.
//!
//! ## Strategy
//! 1. Text that fits the budget is returned as one chunk
//! 2. Otherwise windows of `max_tokens` worth of characters are cut, each
//!    starting `overlap_tokens` worth of characters before the previous end
//! 3. With sentence preservation on, a window end moves back to the last
//!    sentence terminator inside it, unless that drops more than 30% of it
//!
//! Chunking never fails; offsets are byte offsets into the source and always
//! fall on character boundaries.

use serde::Serialize;
use tracing::debug;

use super::tokenizer::{
    RegexSentenceSplitter, SharedEstimator, SharedSplitter, TokenCounter, TokenEstimator,
};
use crate::constants::chunking::MAX_SENTENCE_PULLBACK;
use std::sync::Arc;

/// One window of book text
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub content: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub start_offset: usize,
    pub end_offset: usize,
    pub estimated_tokens: usize,
    pub is_empty: bool,
}

/// Splits text into ordered, overlapping chunks
#[derive(Clone)]
pub struct ContentChunker {
    estimator: SharedEstimator,
    splitter: SharedSplitter,
}

impl Default for ContentChunker {
    fn default() -> Self {
        Self::new(
            Arc::new(TokenCounter::default()),
            Arc::new(RegexSentenceSplitter),
        )
    }
}

impl ContentChunker {
    pub fn new(estimator: SharedEstimator, splitter: SharedSplitter) -> Self {
        Self {
            estimator,
            splitter,
        }
    }

    pub fn estimator(&self) -> &dyn TokenEstimator {
        self.estimator.as_ref()
    }

    /// Chunk `text` so each piece holds roughly `max_tokens` estimated tokens
    pub fn chunk(
        &self,
        text: &str,
        max_tokens: usize,
        overlap_tokens: usize,
        preserve_sentences: bool,
    ) -> Vec<Chunk> {
        if text.is_empty() {
            return vec![Chunk {
                content: String::new(),
                chunk_index: 0,
                total_chunks: 1,
                start_offset: 0,
                end_offset: 0,
                estimated_tokens: 0,
                is_empty: true,
            }];
        }

        let max_tokens = max_tokens.max(1);
        let estimate = self.estimator.estimate(text);
        if estimate <= max_tokens {
            return vec![Chunk {
                content: text.to_string(),
                chunk_index: 0,
                total_chunks: 1,
                start_offset: 0,
                end_offset: text.len(),
                estimated_tokens: estimate,
                is_empty: false,
            }];
        }

        // byte offset of every char, plus the end of the text
        let bounds: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let char_count = bounds.len() - 1;

        let chars_per_token = char_count as f64 / estimate as f64;
        let window = ((max_tokens as f64 * chars_per_token) as usize).max(1);
        let overlap = ((overlap_tokens as f64 * chars_per_token) as usize).min(window - 1);

        debug!(
            estimate,
            max_tokens, window, overlap, "Chunking text of {} chars", char_count
        );

        let mut spans = Vec::new();
        let mut start = 0;
        loop {
            let mut end = (start + window).min(char_count);
            if preserve_sentences && end < char_count {
                end = self.pull_back_to_sentence(text, &bounds, start, end, window, overlap);
            }
            spans.push((start, end));
            if end >= char_count {
                break;
            }
            start = end - overlap;
        }

        let total = spans.len();
        spans
            .into_iter()
            .enumerate()
            .map(|(idx, (start, end))| {
                let content = &text[bounds[start]..bounds[end]];
                Chunk {
                    content: content.to_string(),
                    chunk_index: idx,
                    total_chunks: total,
                    start_offset: bounds[start],
                    end_offset: bounds[end],
                    estimated_tokens: self.estimator.estimate(content),
                    is_empty: false,
                }
            })
            .collect()
    }

    /// Move a window end (char index) back to the last sentence boundary in
    /// the window, if that keeps at least 70% of it and still advances past
    /// the overlap.
    fn pull_back_to_sentence(
        &self,
        text: &str,
        bounds: &[usize],
        start: usize,
        end: usize,
        window: usize,
        overlap: usize,
    ) -> usize {
        let slice = &text[bounds[start]..bounds[end]];
        let Some(boundary) = self.splitter.last_boundary(slice) else {
            return end;
        };

        let cut_byte = bounds[start] + boundary;
        let Ok(cut) = bounds.binary_search(&cut_byte) else {
            return end;
        };

        let discarded = end - cut;
        if (discarded as f64) <= window as f64 * MAX_SENTENCE_PULLBACK && cut - start > overlap {
            cut
        } else {
            end
        }
    }
}
