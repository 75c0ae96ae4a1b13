//! Check Command
//!
//! Verifies the configured provider is reachable before a long analysis.

use crate::ai::provider::create_provider;
use crate::cli::ui::output::Output;
use crate::cli::util::{Overrides, load_config};
use crate::types::Result;

/// Returns whether the provider answered its health check
pub async fn run(overrides: &Overrides) -> Result<bool> {
    let config = load_config(overrides)?;
    let provider = create_provider(&config.llm)?;
    let output = Output::new();

    output.field("Provider", provider.name());
    output.field("Model", provider.model());

    let healthy = provider.health_check().await?;
    if healthy {
        output.success("Provider is reachable");
    } else {
        output.error("Provider did not answer its health check");
    }
    Ok(healthy)
}
