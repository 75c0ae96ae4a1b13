//! Chunk Result Merging
//!
//! Stitches per-chunk analyses of one type back into a single narrative.
//! Each analysis type maps to a merge strategy; a strategy that fails falls
//! back to marker-separated concatenation, so merging never fails.

use std::sync::Arc;

use tracing::warn;

use crate::ai::tokenizer::{RegexSentenceSplitter, SentenceSplitter, SharedSplitter};
use crate::constants::merge::{KEY_POINTS_PER_CHUNK, MIN_KEY_POINT_CHARS, THEME_VOCABULARY};
use crate::types::{AnalysisType, BuddyError, DEFAULT_CONFIDENCE, RawAnalysis, Result};

/// Merge strategy for one analysis type. Chunks arrive in index order.
pub type MergeStrategy = fn(&[RawAnalysis], &dyn SentenceSplitter) -> Result<String>;

/// Strategy table keyed by analysis type
pub fn strategy_for(analysis_type: AnalysisType) -> MergeStrategy {
    match analysis_type {
        AnalysisType::Summary => merge_summary,
        AnalysisType::Themes => merge_themes,
        AnalysisType::Characters | AnalysisType::Sentiment => merge_sections,
        AnalysisType::Difficulty => merge_difficulty,
        AnalysisType::Style => merge_parts,
    }
}

#[derive(Clone)]
pub struct ChunkResultMerger {
    splitter: SharedSplitter,
}

impl Default for ChunkResultMerger {
    fn default() -> Self {
        Self::new(Arc::new(RegexSentenceSplitter))
    }
}

impl ChunkResultMerger {
    pub fn new(splitter: SharedSplitter) -> Self {
        Self { splitter }
    }

    /// Merge chunk results into one narrative. A single result is returned
    /// unchanged; an empty slice yields an empty string.
    pub fn merge(&self, results: &[RawAnalysis], analysis_type: AnalysisType) -> String {
        match results {
            [] => {
                warn!(%analysis_type, "Merge called with no chunk results");
                String::new()
            }
            [only] => only.content.clone(),
            _ => match strategy_for(analysis_type)(results, self.splitter.as_ref()) {
                Ok(merged) => merged,
                Err(e) => {
                    warn!(%analysis_type, error = %e, "Merge strategy failed, concatenating chunks");
                    fallback_merge(results)
                }
            },
        }
    }

    /// Mean chunk confidence, counting unreported confidence as 0.85
    pub fn average_confidence(results: &[RawAnalysis]) -> f64 {
        if results.is_empty() {
            return DEFAULT_CONFIDENCE;
        }
        let total: f64 = results
            .iter()
            .map(|r| r.confidence.unwrap_or(DEFAULT_CONFIDENCE))
            .sum();
        total / results.len() as f64
    }
}

/// Concatenation used when a strategy fails
pub fn fallback_merge(results: &[RawAnalysis]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, r)| format!("--- Chunk {} ---\n{}", i + 1, r.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Chunk contents, failing on any blank chunk
fn contents(results: &[RawAnalysis]) -> Result<Vec<&str>> {
    results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let content = r.content.trim();
            if content.is_empty() {
                Err(BuddyError::Merge(format!("chunk {} has no content", i)))
            } else {
                Ok(content)
            }
        })
        .collect()
}

fn with_headings(contents: &[&str], heading: &str) -> String {
    contents
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{} {}:\n{}", heading, i + 1, c))
        .collect::<Vec<_>>()
        .join("\n\n")
}

// =============================================================================
// Strategies
// =============================================================================

fn merge_summary(results: &[RawAnalysis], splitter: &dyn SentenceSplitter) -> Result<String> {
    let contents = contents(results)?;

    fn first_line(text: &str) -> Option<&str> {
        text.lines().map(str::trim).find(|l| !l.is_empty())
    }
    fn last_line(text: &str) -> Option<&str> {
        text.lines().map(str::trim).rfind(|l| !l.is_empty())
    }

    let intro = contents
        .first()
        .and_then(|c| first_line(c))
        .ok_or_else(|| BuddyError::Merge("summary has no introduction".to_string()))?;
    let conclusion = contents
        .last()
        .and_then(|c| last_line(c))
        .ok_or_else(|| BuddyError::Merge("summary has no conclusion".to_string()))?;

    let key_points: Vec<&str> = contents
        .iter()
        .flat_map(|c| {
            splitter
                .sentences(c)
                .into_iter()
                .filter(|s| s.chars().count() > MIN_KEY_POINT_CHARS)
                .take(KEY_POINTS_PER_CHUNK)
        })
        .collect();

    let mut out = String::from(intro);
    if !key_points.is_empty() {
        out.push_str("\n\nKey points:");
        for point in key_points {
            out.push_str("\n• ");
            out.push_str(point);
        }
    }
    out.push_str("\n\n");
    out.push_str(conclusion);
    Ok(out)
}

fn merge_themes(results: &[RawAnalysis], _: &dyn SentenceSplitter) -> Result<String> {
    let contents = contents(results)?;
    let lowered: Vec<String> = contents.iter().map(|c| c.to_lowercase()).collect();

    let recurring: Vec<&str> = THEME_VOCABULARY
        .iter()
        .copied()
        .filter(|theme| lowered.iter().filter(|c| c.contains(theme)).count() > 1)
        .collect();

    let body = contents.join("\n\n");
    if recurring.is_empty() {
        Ok(body)
    } else {
        Ok(format!(
            "Themes spanning multiple chunks: {}\n\n{}",
            recurring.join(", "),
            body
        ))
    }
}

fn merge_sections(results: &[RawAnalysis], _: &dyn SentenceSplitter) -> Result<String> {
    Ok(with_headings(&contents(results)?, "Section"))
}

fn merge_parts(results: &[RawAnalysis], _: &dyn SentenceSplitter) -> Result<String> {
    Ok(with_headings(&contents(results)?, "Part"))
}

/// 3 = advanced, 2 = intermediate, 1 = everything else
fn difficulty_level(content: &str) -> u32 {
    let lower = content.to_lowercase();
    if lower.contains("advanced") || lower.contains("difficult") {
        3
    } else if lower.contains("intermediate") || lower.contains("moderate") {
        2
    } else {
        1
    }
}

fn difficulty_label(average: f64) -> &'static str {
    if average <= 1.5 {
        "Beginner"
    } else if average <= 2.5 {
        "Intermediate"
    } else {
        "Advanced"
    }
}

fn merge_difficulty(results: &[RawAnalysis], _: &dyn SentenceSplitter) -> Result<String> {
    let contents = contents(results)?;
    let total: u32 = contents.iter().map(|c| difficulty_level(c)).sum();
    let average = f64::from(total) / contents.len() as f64;

    Ok(format!(
        "Overall difficulty: {}\n\n{}",
        difficulty_label(average),
        contents.join("\n\n")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(contents: &[&str]) -> Vec<RawAnalysis> {
        contents.iter().map(|c| RawAnalysis::new(*c)).collect()
    }

    #[test]
    fn test_single_result_unchanged_for_every_type() {
        let merger = ChunkResultMerger::default();
        let results = raw(&["  exactly as returned \n"]);
        for analysis_type in AnalysisType::ALL {
            assert_eq!(merger.merge(&results, analysis_type), "  exactly as returned \n");
        }
    }

    #[test]
    fn test_empty_results_merge_to_empty_string() {
        assert_eq!(ChunkResultMerger::default().merge(&[], AnalysisType::Summary), "");
    }

    #[test]
    fn test_summary_merge() {
        let results = raw(&[
            "The book opens in a small harbor town.\nThe fisherman loses his boat in a storm. He swears revenge on the sea. Short one.",
            "Years pass and the town forgets him entirely. His daughter finds the old logbook.\nIt ends in quiet reconciliation.",
        ]);
        let merged = ChunkResultMerger::default().merge(&results, AnalysisType::Summary);

        assert!(merged.starts_with("The book opens in a small harbor town.\n\nKey points:"));
        assert!(merged.contains("• The book opens in a small harbor town."));
        assert!(merged.contains("• Years pass and the town forgets him entirely."));
        assert!(!merged.contains("• Short one."));
        assert!(merged.ends_with("\n\nIt ends in quiet reconciliation."));
        // two key points per chunk at most
        assert_eq!(merged.matches("• ").count(), 4);
    }

    #[test]
    fn test_summary_intro_and_conclusion_skip_blank_lines() {
        let results = raw(&[
            "\n   \n  Opening line of the first part.  \nMore detail follows here.",
            "The second part goes on.\n  Closing line of the book.  \n\n   ",
        ]);
        let merged = ChunkResultMerger::default().merge(&results, AnalysisType::Summary);

        assert!(merged.starts_with("Opening line of the first part.\n\n"));
        assert!(merged.ends_with("\n\nClosing line of the book."));
    }

    #[test]
    fn test_themes_merge_lists_recurring_themes() {
        let results = raw(&[
            "Love and power shape the court.",
            "Power corrupts; death follows.",
            "Love survives, and so does the truth.",
        ]);
        let merged = ChunkResultMerger::default().merge(&results, AnalysisType::Themes);
        assert!(merged.starts_with("Themes spanning multiple chunks: love, power\n\n"));
        assert!(merged.contains("Power corrupts; death follows."));
    }

    #[test]
    fn test_themes_merge_without_recurring_themes() {
        let results = raw(&["A tale of love.", "A tale of death."]);
        let merged = ChunkResultMerger::default().merge(&results, AnalysisType::Themes);
        assert_eq!(merged, "A tale of love.\n\nA tale of death.");
    }

    #[test]
    fn test_sections_and_parts() {
        let merger = ChunkResultMerger::default();
        let results = raw(&["Alice", "Bob"]);
        assert_eq!(
            merger.merge(&results, AnalysisType::Characters),
            "Section 1:\nAlice\n\nSection 2:\nBob"
        );
        assert_eq!(
            merger.merge(&results, AnalysisType::Sentiment),
            "Section 1:\nAlice\n\nSection 2:\nBob"
        );
        assert_eq!(
            merger.merge(&results, AnalysisType::Style),
            "Part 1:\nAlice\n\nPart 2:\nBob"
        );
    }

    #[test]
    fn test_difficulty_thresholds() {
        let results = raw(&[
            "Plain prose.",
            "A moderate vocabulary.",
            "Advanced philosophical passages.",
        ]);
        let merged = ChunkResultMerger::default().merge(&results, AnalysisType::Difficulty);
        assert!(merged.starts_with("Overall difficulty: Intermediate\n\n"));

        assert_eq!(difficulty_label(1.5), "Beginner");
        assert_eq!(difficulty_label(2.5), "Intermediate");
        assert_eq!(difficulty_label(2.6), "Advanced");
    }

    #[test]
    fn test_blank_chunk_falls_back_to_concatenation() {
        let results = raw(&["first part", "   ", "third part"]);
        for analysis_type in AnalysisType::ALL {
            let merged = ChunkResultMerger::default().merge(&results, analysis_type);
            assert_eq!(
                merged,
                "--- Chunk 1 ---\nfirst part\n\n--- Chunk 2 ---\n   \n\n--- Chunk 3 ---\nthird part"
            );
        }
    }

    #[test]
    fn test_average_confidence_defaults_missing() {
        let results = vec![
            RawAnalysis::new("a").with_confidence(0.65),
            RawAnalysis::new("b"),
        ];
        let avg = ChunkResultMerger::average_confidence(&results);
        assert!((avg - 0.75).abs() < 1e-9);
    }
}
