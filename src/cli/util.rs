//! CLI Common Utilities
//!
//! Shared configuration loading, service wiring and book input for commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::ai::analyzer::LlmAnalyzer;
use crate::ai::provider::create_provider;
use crate::ai::rate_limiter::RateLimiter;
use crate::analysis::{BookAnalysisService, BroadcastSink};
use crate::config::{Config, ConfigLoader, StorageBackend};
use crate::storage::{MemoryStore, SharedStore, SqliteStore};
use crate::types::{Book, BuddyError, Result};

/// Settings given on the command line; they win over every config source
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub config_path: Option<PathBuf>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub max_tokens_per_chunk: Option<usize>,
    pub no_cache: bool,
    pub no_persist: bool,
}

/// Load configuration and apply command line overrides
pub fn load_config(overrides: &Overrides) -> Result<Config> {
    let mut config = match &overrides.config_path {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load()?,
    };

    if let Some(provider) = &overrides.provider {
        config.llm.provider = provider.clone();
    }
    if let Some(model) = &overrides.model {
        config.llm.model = Some(model.clone());
    }
    if let Some(max) = overrides.max_tokens_per_chunk {
        config.analysis.max_tokens_per_chunk = max;
    }
    if overrides.no_cache {
        config.analysis.cache_enabled = false;
    }
    if overrides.no_persist {
        config.analysis.persist_results = false;
    }

    config.validate()?;
    Ok(config)
}

/// Open the configured result store
pub fn open_store(config: &Config) -> Result<SharedStore> {
    match config.storage.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StorageBackend::Sqlite => {
            let path = ConfigLoader::database_path(config);
            tracing::debug!("Opening analysis store at {}", path.display());
            Ok(Arc::new(SqliteStore::open(&path)?))
        }
    }
}

/// Command execution context
///
/// Holds the loaded configuration, the wired analysis service and the
/// broadcast sink its events are published on.
pub struct CommandContext {
    pub config: Config,
    pub service: Arc<BookAnalysisService>,
    pub events: BroadcastSink,
}

impl CommandContext {
    pub fn load(overrides: &Overrides) -> Result<Self> {
        let config = load_config(overrides)?;
        let events = BroadcastSink::default();

        let provider = create_provider(&config.llm)?;
        tracing::debug!(
            provider = provider.name(),
            model = provider.model(),
            "LLM provider ready"
        );

        let mut builder = BookAnalysisService::builder(Arc::new(LlmAnalyzer::new(provider)))
            .config(config.analysis.clone())
            .event_sink(Arc::new(events.clone()))
            .store(open_store(&config)?);
        if config.rate_limit.enabled {
            builder = builder.rate_limiter(Arc::new(RateLimiter::new(&config.rate_limit)));
        }

        Ok(Self {
            service: Arc::new(builder.build()?),
            config,
            events,
        })
    }
}

/// Read a book from disk.
///
/// `.json` files are parsed as a `Book` document; anything else is plain
/// text titled after the file stem.
pub fn read_book(path: &Path, id: Option<&str>, title: Option<&str>) -> Result<Book> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| BuddyError::Config(format!("Cannot read {}: {}", path.display(), e)))?;

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let mut book = if is_json {
        let mut book: Book = serde_json::from_str(&raw)?;
        if book.word_count == 0 {
            book.word_count = book.effective_word_count();
        }
        book
    } else {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("untitled");
        Book::new(stem, stem, "", raw)
    };

    if let Some(id) = id {
        book.id = id.to_string();
    }
    if let Some(title) = title {
        book.title = title.to_string();
    }
    Ok(book)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_plain_text_book() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("moby-dick.txt");
        std::fs::write(&path, "Call me Ishmael. Some years ago.").unwrap();

        let book = read_book(&path, None, None).unwrap();
        assert_eq!(book.id, "moby-dick");
        assert_eq!(book.title, "moby-dick");
        assert_eq!(book.word_count, 6);
    }

    #[test]
    fn test_read_json_book_with_overrides() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("book.JSON");
        std::fs::write(
            &path,
            r#"{"id":"b1","title":"Dune","author":"Frank Herbert","content":"A beginning is a delicate time."}"#,
        )
        .unwrap();

        let book = read_book(&path, Some("custom-id"), None).unwrap();
        assert_eq!(book.id, "custom-id");
        assert_eq!(book.author, "Frank Herbert");
        assert_eq!(book.word_count, 6);
    }

    #[test]
    fn test_read_missing_book() {
        assert!(read_book(Path::new("/nonexistent/book.txt"), None, None).is_err());
    }

    #[test]
    fn test_memory_store_backend() {
        let mut config = Config::default();
        config.storage.backend = StorageBackend::Memory;
        let store = open_store(&config).unwrap();
        assert!(store.keys("").unwrap().is_empty());
    }
}
