//! Analyze Command
//!
//! Run one analysis type over a book file.
//!
//! Usage:
//!   bookbuddy analyze <file> [-t summary] [--depth detailed] [--quotes]

use std::path::PathBuf;

use crate::cli::progress::ConsoleRenderer;
use crate::cli::ui::output::{Output, OutputFormat};
use crate::cli::util::{CommandContext, Overrides, read_book};
use crate::types::{AnalysisOptions, Result};

pub struct AnalyzeArgs {
    pub file: PathBuf,
    pub analysis_type: String,
    pub book_id: Option<String>,
    pub title: Option<String>,
    pub options: AnalysisOptions,
    pub format: OutputFormat,
    pub show_progress: bool,
}

/// Returns whether the analysis succeeded
pub async fn run(overrides: &Overrides, args: AnalyzeArgs) -> Result<bool> {
    let book = read_book(&args.file, args.book_id.as_deref(), args.title.as_deref())?;
    let ctx = CommandContext::load(overrides)?;
    let renderer = args
        .show_progress
        .then(|| ConsoleRenderer::new(ctx.events.subscribe()).spawn());

    let outcome = ctx
        .service
        .analyze(&book, &args.analysis_type, &args.options)
        .await;
    let usage = ctx.service.stats().usage;

    // closes the event channel so the renderer drains and exits
    drop(ctx);
    if let Some(handle) = renderer {
        let _ = handle.await;
    }

    let output = Output::new();
    output.outcome(&outcome, args.format)?;
    if args.format == OutputFormat::Text && usage.api_calls > 0 {
        output.section("Usage");
        println!("{}", usage.display());
    }

    Ok(outcome.is_success())
}
