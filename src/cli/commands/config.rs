//! Config Command
//!
//! Manage Book Buddy configuration.
//!
//! Usage:
//!   bookbuddy config show [-f json]
//!   bookbuddy config path
//!   bookbuddy config init [-g] [--force]

use crate::cli::ui::output::{Output, OutputFormat, to_structured};
use crate::cli::util::{Overrides, load_config};
use crate::config::{Config, ConfigLoader};
use crate::types::{BuddyError, Result};

/// Render the merged configuration; text output is TOML
pub fn render(config: &Config, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => toml::to_string_pretty(config)
            .map_err(|e| BuddyError::Config(format!("Cannot render config: {}", e))),
        _ => to_structured(config, format),
    }
}

/// Show the effective configuration (merged from all sources)
pub fn show(overrides: &Overrides, format: OutputFormat) -> Result<()> {
    let config = load_config(overrides)?;
    println!("{}", render(&config, format)?);
    Ok(())
}

/// Show configuration and data file locations
pub fn path(overrides: &Overrides) -> Result<()> {
    let output = Output::new();
    let marker = |exists: bool| if exists { "" } else { " (not found)" };

    match ConfigLoader::global_config_path() {
        Some(global) => output.field(
            "Global",
            format!("{}{}", global.display(), marker(global.exists())),
        ),
        None => output.field("Global", "unavailable"),
    }

    let project = ConfigLoader::project_config_path();
    output.field(
        "Project",
        format!("{}{}", project.display(), marker(project.exists())),
    );

    if let Some(explicit) = &overrides.config_path {
        output.field("--config", explicit.display());
    }

    let config = load_config(overrides)?;
    let db = ConfigLoader::database_path(&config);
    output.field(
        "Database",
        format!(
            "{}{} [{}]",
            db.display(),
            marker(db.exists()),
            config.storage.backend
        ),
    );
    Ok(())
}

/// Write a default config file
pub fn init(global: bool, force: bool) -> Result<()> {
    let path = ConfigLoader::init(global, force)?;
    let output = Output::new();
    output.success(&format!(
        "Initialized {} configuration",
        if global { "global" } else { "project" }
    ));
    output.field("Config", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_text_is_toml() {
        let text = render(&Config::default(), OutputFormat::Text).unwrap();
        assert!(text.contains("[analysis]"));
        assert!(text.contains("max_tokens_per_chunk = 3000"));

        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.analysis.overlap_tokens, 200);
    }

    #[test]
    fn test_render_never_shows_api_key() {
        let mut config = Config::default();
        config.llm.api_key = Some("sk-secret".to_string());
        for format in [OutputFormat::Text, OutputFormat::Json, OutputFormat::Yaml] {
            assert!(!render(&config, format).unwrap().contains("sk-secret"));
        }
    }
}
