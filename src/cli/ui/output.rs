use console::style;
use serde::Serialize;

use crate::types::{AnalysisOutcome, Result};

/// How command results are printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Yaml,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "yaml" => Ok(OutputFormat::Yaml),
            _ => Err(format!(
                "Invalid format '{}'. Valid values: text, json, yaml",
                s
            )),
        }
    }
}

/// Serialize `value` as JSON or YAML
pub fn to_structured<T: Serialize>(value: &T, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Yaml => Ok(serde_yaml::to_string(value)?),
        _ => Ok(serde_json::to_string_pretty(value)?),
    }
}

pub struct Output;

impl Output {
    pub fn new() -> Self {
        Self
    }

    pub fn success(&self, message: &str) {
        println!("{} {}", style("✓").green(), message);
    }

    pub fn error(&self, message: &str) {
        eprintln!("{} {}", style("✗").red(), message);
    }

    pub fn warning(&self, message: &str) {
        println!("{} {}", style("⚠").yellow(), message);
    }

    pub fn info(&self, message: &str) {
        println!("{} {}", style("ℹ").blue(), message);
    }

    pub fn header(&self, message: &str) {
        println!("\n{}", style(message).bold().underlined());
    }

    pub fn section(&self, message: &str) {
        println!("\n{}", style(message).bold());
        println!("{}", "─".repeat(40));
    }

    pub fn field(&self, key: &str, value: impl std::fmt::Display) {
        println!("  {:<14} {}", style(key).dim(), value);
    }

    /// Print one analysis outcome in the requested format
    pub fn outcome(&self, outcome: &AnalysisOutcome, format: OutputFormat) -> Result<()> {
        if format != OutputFormat::Text {
            println!("{}", to_structured(outcome, format)?);
            return Ok(());
        }

        match outcome {
            AnalysisOutcome::Success(result) => {
                self.header(&format!(
                    "{}: {}",
                    result.book.title,
                    result.analysis_type.as_str()
                ));
                println!("{}", result.content);
                self.section("Details");
                self.field("Confidence", format!("{:.2}", result.confidence));
                self.field("Model", &result.metadata.model);
                self.field("Tokens", result.metadata.tokens_used);
                self.field("Cost", format!("${:.4}", result.metadata.cost_usd));
                if let (Some(done), Some(total)) =
                    (result.metadata.chunks_processed, result.metadata.total_chunks)
                {
                    self.field("Chunks", format!("{}/{}", done, total));
                }
                if result.from_cache {
                    self.field("Source", "cache");
                }
                self.field("Analysis id", &result.analysis_id);
            }
            AnalysisOutcome::Failure(failure) => {
                self.error(&format!(
                    "{} analysis failed: {}",
                    failure.analysis_type, failure.error
                ));
            }
        }
        Ok(())
    }
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorResponse;

    #[test]
    fn test_output_format_parse() {
        assert_eq!("JSON".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert!("xml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_structured_failure() {
        let outcome: AnalysisOutcome =
            ErrorResponse::new("Book id is required", "a1", "", "summary").into();
        let json = to_structured(&outcome, OutputFormat::Json).unwrap();
        assert!(json.contains("\"success\": false"));

        let yaml = to_structured(&outcome, OutputFormat::Yaml).unwrap();
        assert!(yaml.contains("success: false"));
    }
}
