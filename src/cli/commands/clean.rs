//! Clean Command
//!
//! Removes persisted analysis results.

use crate::cli::ui::output::Output;
use crate::cli::util::{Overrides, load_config, open_store};
use crate::config::{ConfigLoader, StorageBackend};
use crate::storage::remove_analyses;
use crate::types::Result;

/// Remove stored results for `book_id`, or all of them
pub fn run(overrides: &Overrides, book_id: Option<&str>) -> Result<()> {
    let config = load_config(overrides)?;
    let output = Output::new();

    if config.storage.backend == StorageBackend::Sqlite
        && !ConfigLoader::database_path(&config).exists()
    {
        output.info("No stored analyses");
        return Ok(());
    }

    let store = open_store(&config)?;
    let removed = remove_analyses(store.as_ref(), book_id)?;

    match (book_id, removed) {
        (_, 0) => output.info("No stored analyses"),
        (Some(id), n) => output.success(&format!("Removed {} stored analyses for '{}'", n, id)),
        (None, n) => output.success(&format!("Removed {} stored analyses", n)),
    }
    Ok(())
}
