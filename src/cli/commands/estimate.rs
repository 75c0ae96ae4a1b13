//! Estimate Command
//!
//! Token estimate and chunk plan for a book. Runs offline; no provider is
//! contacted.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use crate::ai::chunker::ContentChunker;
use crate::ai::provider::{TokenUsage, estimate_cost};
use crate::ai::tokenizer::{EstimationMethod, RegexSentenceSplitter, TokenCounter, TokenEstimator};
use crate::cli::ui::output::{Output, OutputFormat, to_structured};
use crate::cli::util::{Overrides, load_config, read_book};
use crate::config::Config;
use crate::types::{Book, Result};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkPlan {
    pub index: usize,
    pub start_offset: usize,
    pub end_offset: usize,
    pub estimated_tokens: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimatePlan {
    pub book_id: String,
    pub title: String,
    pub word_count: usize,
    pub estimation: EstimationMethod,
    pub estimated_tokens: usize,
    pub max_tokens_per_chunk: usize,
    pub overlap_tokens: usize,
    pub chunks: Vec<ChunkPlan>,
    /// Input-side cost of one analysis, when the model is priced
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_input_cost_usd: Option<f64>,
}

/// Compute the plan the service would follow for `book`
pub fn plan(book: &Book, config: &Config) -> EstimatePlan {
    let counter = TokenCounter::new(config.analysis.estimation);
    let chunker = ContentChunker::new(Arc::new(counter), Arc::new(RegexSentenceSplitter));
    let analysis = &config.analysis;

    let chunks = chunker
        .chunk(
            &book.content,
            analysis.max_tokens_per_chunk,
            analysis.overlap_tokens,
            analysis.preserve_sentences,
        )
        .into_iter()
        .filter(|c| !c.is_empty)
        .map(|c| ChunkPlan {
            index: c.chunk_index,
            start_offset: c.start_offset,
            end_offset: c.end_offset,
            estimated_tokens: c.estimated_tokens,
        })
        .collect::<Vec<_>>();

    let estimated_tokens = counter.estimate(&book.content);
    let sent_tokens: usize = chunks.iter().map(|c| c.estimated_tokens).sum();
    let estimated_input_cost_usd = config.llm.model.as_deref().and_then(|model| {
        let usage = TokenUsage::new(u32::try_from(sent_tokens).unwrap_or(u32::MAX), 0);
        let cost = estimate_cost(model, &usage);
        (cost > 0.0).then_some(cost)
    });

    EstimatePlan {
        book_id: book.id.clone(),
        title: book.title.clone(),
        word_count: book.effective_word_count(),
        estimation: counter.method(),
        estimated_tokens,
        max_tokens_per_chunk: analysis.max_tokens_per_chunk,
        overlap_tokens: analysis.overlap_tokens,
        chunks,
        estimated_input_cost_usd,
    }
}

pub fn run(overrides: &Overrides, file: &Path, format: OutputFormat) -> Result<()> {
    let config = load_config(overrides)?;
    let book = read_book(file, None, None)?;
    let plan = plan(&book, &config);

    if format != OutputFormat::Text {
        println!("{}", to_structured(&plan, format)?);
        return Ok(());
    }

    let output = Output::new();
    output.header(&plan.title);
    output.field("Book id", &plan.book_id);
    output.field("Words", plan.word_count);
    output.field("Tokens", format!("~{} ({:?})", plan.estimated_tokens, plan.estimation));
    output.field(
        "Chunk size",
        format!(
            "{} tokens, {} overlap",
            plan.max_tokens_per_chunk, plan.overlap_tokens
        ),
    );
    if let Some(cost) = plan.estimated_input_cost_usd {
        output.field("Input cost", format!("${:.4} per analysis", cost));
    }

    match plan.chunks.len() {
        0 => output.warning("Book has no content to analyze"),
        1 => output.info("Fits in a single request"),
        n => {
            output.section(&format!("{} chunks", n));
            for chunk in &plan.chunks {
                println!(
                    "  #{:<3} bytes {:>8}..{:<8} ~{} tokens",
                    chunk.index + 1,
                    chunk.start_offset,
                    chunk.end_offset,
                    chunk.estimated_tokens
                );
            }
        }
    }
    Ok(())
}
