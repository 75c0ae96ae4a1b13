//! Book Buddy - AI Book Analysis Core
//!
//! Runs language-model analyses (summary, themes, characters, difficulty,
//! sentiment, style) over whole books. Texts too long for a single request
//! are split into overlapping chunks, dispatched one by one and merged back
//! into a single result.
//!
//! ## Core Features
//!
//! - **Chunking**: sentence-aware windows sized by a pluggable token estimator
//! - **Merging**: per-type strategies for combining chunk results
//! - **Caching**: bounded result cache with TTL, oldest-insertion eviction and content fingerprints
//! - **Resilience**: retries with backoff, per-call timeouts, rate limiting
//! - **Persistence**: finished results saved to SQLite or memory
//!
//! ## Quick Start
//!
//! ```ignore
//! use bookbuddy::{BookAnalysisService, Book, AnalysisOptions};
//! use bookbuddy::ai::{LlmAnalyzer, create_provider};
//!
//! let provider = create_provider(&config.llm)?;
//! let service = BookAnalysisService::builder(Arc::new(LlmAnalyzer::new(provider)))
//!     .config(config.analysis.clone())
//!     .build()?;
//! let outcome = service
//!     .analyze(&book, "themes", &AnalysisOptions::default())
//!     .await;
//! ```
//!
//! ## Modules
//!
//! - [`ai`]: token estimation, chunking, prompts, LLM providers
//! - [`analysis`]: dispatch, merge, cache and the orchestrating service
//! - [`storage`]: persisted results (SQLite with connection pooling, memory)
//! - [`config`]: hierarchical configuration
//! - [`types`]: books, options, results and errors

pub mod ai;
pub mod analysis;
pub mod cli;
pub mod config;
pub mod constants;
pub mod storage;
pub mod types;

// =============================================================================
// Core Re-exports
// =============================================================================

// Configuration
pub use config::{AnalysisConfig, Config, ConfigLoader, StorageBackend, StorageConfig};

// Error Types
pub use types::error::{BuddyError, ErrorCategory, Result};

// Data Model
pub use types::{
    AnalysisDepth, AnalysisOptions, AnalysisOutcome, AnalysisResult, AnalysisType, BatchResult,
    Book, ErrorResponse,
};

// Storage
pub use storage::{AnalysisStore, MemoryStore, PoolConfig, SharedStore, SqliteStore};

// =============================================================================
// Analysis Re-exports
// =============================================================================

pub use analysis::{
    AnalysisCache, AnalysisDispatcher, AnalysisEvent, BookAnalysisService, ChunkResultMerger,
    PacingPolicy, ServiceBuilder, SystemEvent,
};

// =============================================================================
// AI Re-exports
// =============================================================================

pub use ai::{
    ContentChunker, EstimationMethod, LlmAnalyzer, LlmProvider, RateLimiter, TextAnalyzer,
    TokenCounter, TokenEstimator,
};
