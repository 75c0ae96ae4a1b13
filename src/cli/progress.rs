//! Console Progress Rendering
//!
//! Subscribes to the service's broadcast sink and prints one line per
//! analysis event.

use console::style;
use tokio::sync::broadcast;

use crate::analysis::{AnalysisEvent, ProgressStage};

/// Prints analysis events as they arrive
pub struct ConsoleRenderer {
    receiver: broadcast::Receiver<AnalysisEvent>,
    bar_width: usize,
}

impl ConsoleRenderer {
    pub fn new(receiver: broadcast::Receiver<AnalysisEvent>) -> Self {
        Self {
            receiver,
            bar_width: 30,
        }
    }

    pub fn with_bar_width(mut self, width: usize) -> Self {
        self.bar_width = width;
        self
    }

    /// Render events on stderr until the sink is dropped
    pub fn spawn(mut self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match self.receiver.recv().await {
                    Ok(event) => {
                        if let Some(line) = render_event(&event, self.bar_width) {
                            eprintln!("{}", line);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

/// One display line for an event, or `None` for events not shown
pub fn render_event(event: &AnalysisEvent, bar_width: usize) -> Option<String> {
    match event {
        AnalysisEvent::Started {
            book_id,
            analysis_type,
            ..
        } => Some(format!(
            "{} {} analysis of '{}'",
            style("▶").cyan(),
            analysis_type,
            book_id
        )),
        AnalysisEvent::Progress(update) => {
            // start and completion already get their own lines
            if matches!(update.stage, ProgressStage::Started | ProgressStage::Completed) {
                return None;
            }
            let label = update
                .detail
                .clone()
                .unwrap_or_else(|| stage_label(update.stage).to_string());
            Some(format!(
                "  {} {:>3}% {}",
                render_progress_bar(update.progress, bar_width),
                (update.progress * 100.0).round() as u32,
                label
            ))
        }
        AnalysisEvent::ChunkFailed {
            chunk_index, error, ..
        } => Some(format!(
            "  {} chunk {} skipped: {}",
            style("⚠").yellow(),
            chunk_index + 1,
            error
        )),
        AnalysisEvent::Completed {
            analysis_type,
            from_cache,
            ..
        } => Some(format!(
            "{} {} analysis complete{}",
            style("✓").green(),
            analysis_type,
            if *from_cache { " (cached)" } else { "" }
        )),
        AnalysisEvent::Error {
            analysis_type,
            error,
            ..
        } => Some(format!(
            "{} {} analysis failed: {}",
            style("✗").red(),
            analysis_type,
            error
        )),
        AnalysisEvent::CacheCleared { .. } => None,
    }
}

fn stage_label(stage: ProgressStage) -> &'static str {
    match stage {
        ProgressStage::Started => "Started",
        ProgressStage::Preparing => "Preparing request",
        ProgressStage::Chunk => "Processing chunk",
        ProgressStage::Merging => "Merging chunk results",
        ProgressStage::Processing => "Finalizing",
        ProgressStage::Completed => "Completed",
    }
}

/// Render a simple progress bar for a 0.0 - 1.0 fraction
fn render_progress_bar(progress: f32, width: usize) -> String {
    let progress = progress.clamp(0.0, 1.0);
    let filled = (progress * width as f32) as usize;
    let empty = width.saturating_sub(filled);

    format!("[{}{}]", "█".repeat(filled), "░".repeat(empty))
}

/// Format a duration in milliseconds as a short human-readable string
pub fn format_duration(ms: u64) -> String {
    let secs = ms / 1000;
    if secs == 0 {
        format!("{}ms", ms)
    } else if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}
