//! Batch Command
//!
//! Run several analysis types over one book. A failed type is reported and
//! the rest still run.

use std::path::PathBuf;

use crate::cli::progress::{ConsoleRenderer, format_duration};
use crate::cli::ui::output::{Output, OutputFormat, to_structured};
use crate::cli::util::{CommandContext, Overrides, read_book};
use crate::types::{AnalysisOptions, AnalysisType, Result};

pub struct BatchArgs {
    pub file: PathBuf,
    /// Empty means every supported type
    pub types: Vec<String>,
    pub book_id: Option<String>,
    pub title: Option<String>,
    pub options: AnalysisOptions,
    pub format: OutputFormat,
    pub show_progress: bool,
}

/// Returns whether every analysis succeeded
pub async fn run(overrides: &Overrides, args: BatchArgs) -> Result<bool> {
    let book = read_book(&args.file, args.book_id.as_deref(), args.title.as_deref())?;
    let types = if args.types.is_empty() {
        AnalysisType::ALL
            .iter()
            .map(|t| t.as_str().to_string())
            .collect()
    } else {
        args.types
    };

    let ctx = CommandContext::load(overrides)?;
    let renderer = args
        .show_progress
        .then(|| ConsoleRenderer::new(ctx.events.subscribe()).spawn());

    let batch = ctx.service.analyze_batch(&book, &types, &args.options).await;
    let usage = ctx.service.stats().usage;

    drop(ctx);
    if let Some(handle) = renderer {
        let _ = handle.await;
    }

    if args.format != OutputFormat::Text {
        println!("{}", to_structured(&batch, args.format)?);
        return Ok(batch.failure_count == 0);
    }

    let output = Output::new();
    for entry in &batch.results {
        output.outcome(&entry.outcome, OutputFormat::Text)?;
    }

    output.section("Batch");
    output.field("Book", &batch.book_id);
    output.field("Succeeded", batch.success_count);
    output.field("Failed", batch.failure_count);
    output.field("Elapsed", format_duration(usage.uptime_ms));
    output.field("Cost", format!("${:.4}", usage.total_cost_usd));

    if batch.failure_count == 0 {
        output.success(&format!("{} analyses complete", batch.success_count));
    } else {
        output.warning(&format!(
            "{} of {} analyses failed",
            batch.failure_count,
            batch.results.len()
        ));
    }

    Ok(batch.failure_count == 0)
}
