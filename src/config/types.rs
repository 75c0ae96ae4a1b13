//! Configuration Types
//!
//! All configuration structures with sensible defaults.
//! Supports global (`<config dir>/bookbuddy/`) and project (`.bookbuddy/`) level configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::ai::provider::{ProviderConfig, validate_endpoint};
use crate::ai::rate_limiter::RateLimitConfig;
use crate::ai::tokenizer::EstimationMethod;
use crate::constants::{analysis, cache, chunking};
use crate::types::{BuddyError, Result};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// LLM provider settings
    pub llm: ProviderConfig,

    /// Chunking, caching and orchestration settings
    pub analysis: AnalysisConfig,

    /// Request and spend throttling
    pub rate_limit: RateLimitConfig,

    /// Where finished analyses are persisted
    pub storage: StorageConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            llm: ProviderConfig::default(),
            analysis: AnalysisConfig::default(),
            rate_limit: RateLimitConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    /// Returns `BuddyError::Config` on validation failure.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(BuddyError::Config(format!(
                "LLM temperature must be between 0.0 and 2.0, got {}",
                self.llm.temperature
            )));
        }

        if self.llm.timeout_secs == 0 {
            return Err(BuddyError::Config(
                "LLM timeout_secs must be greater than 0".to_string(),
            ));
        }

        if let Some(base) = &self.llm.api_base {
            validate_endpoint(base, &self.llm.provider)?;
        }

        self.analysis.validate()?;

        if self.rate_limit.enabled {
            if self.rate_limit.window_secs == 0 {
                return Err(BuddyError::Config(
                    "rate_limit.window_secs must be greater than 0".to_string(),
                ));
            }
            if self.rate_limit.max_cost_per_hour_usd < 0.0 {
                return Err(BuddyError::Config(
                    "rate_limit.max_cost_per_hour_usd must not be negative".to_string(),
                ));
            }
        }

        Ok(())
    }
}

// =============================================================================
// Analysis Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Estimated tokens per chunk (request option `maxTokensPerChunk` overrides)
    pub max_tokens_per_chunk: usize,

    /// Tokens shared between consecutive chunks
    pub overlap_tokens: usize,

    /// Cut chunks at sentence ends where possible
    pub preserve_sentences: bool,

    /// Token estimation heuristic
    pub estimation: EstimationMethod,

    pub cache_enabled: bool,
    pub cache_max_size: usize,
    pub cache_ttl_hours: u64,

    /// Emit progress milestones to listeners and the event sink
    pub progress_enabled: bool,

    /// Pause between chunk dispatches; 0 disables pacing
    pub inter_chunk_delay_ms: u64,

    /// Per-call timeout when the request sets none
    pub request_timeout_secs: u64,

    /// Retries of a recoverable dispatch failure
    pub max_retries: usize,

    pub shutdown_timeout_secs: u64,

    /// Save finished results to the store
    pub persist_results: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_tokens_per_chunk: chunking::DEFAULT_MAX_TOKENS_PER_CHUNK,
            overlap_tokens: chunking::DEFAULT_OVERLAP_TOKENS,
            preserve_sentences: true,
            estimation: EstimationMethod::default(),
            cache_enabled: true,
            cache_max_size: cache::MAX_ENTRIES,
            cache_ttl_hours: cache::EXPIRATION_HOURS,
            progress_enabled: true,
            inter_chunk_delay_ms: analysis::DEFAULT_INTER_CHUNK_DELAY_MS,
            request_timeout_secs: analysis::DEFAULT_REQUEST_TIMEOUT_SECS,
            max_retries: analysis::DEFAULT_MAX_RETRIES,
            shutdown_timeout_secs: analysis::DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            persist_results: true,
        }
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_tokens_per_chunk == 0 {
            return Err(BuddyError::Config(
                "analysis.max_tokens_per_chunk must be greater than 0".to_string(),
            ));
        }

        if self.overlap_tokens >= self.max_tokens_per_chunk {
            return Err(BuddyError::Config(format!(
                "analysis.overlap_tokens ({}) must be smaller than max_tokens_per_chunk ({})",
                self.overlap_tokens, self.max_tokens_per_chunk
            )));
        }

        if self.cache_enabled && self.cache_max_size == 0 {
            return Err(BuddyError::Config(
                "analysis.cache_max_size must be greater than 0 when caching is enabled"
                    .to_string(),
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(BuddyError::Config(
                "analysis.request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

// =============================================================================
// Storage Configuration
// =============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Memory,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackend::Sqlite => write!(f, "sqlite"),
            StorageBackend::Memory => write!(f, "memory"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,

    /// Database file; defaults to `analyses.db` in the user data directory
    pub path: Option<PathBuf>,
}
