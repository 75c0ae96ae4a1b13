//! Global Constants
//!
//! Centralized constants for configuration and tuning.
//! All magic numbers should be defined here with documentation.

/// Chunking constants
pub mod chunking {
    /// Default maximum estimated tokens per chunk
    pub const DEFAULT_MAX_TOKENS_PER_CHUNK: usize = 3000;

    /// Default overlap between consecutive chunks (tokens)
    pub const DEFAULT_OVERLAP_TOKENS: usize = 200;

    /// A sentence boundary may shorten a window by at most this fraction
    pub const MAX_SENTENCE_PULLBACK: f64 = 0.3;

    /// Words longer than this many characters weigh an extra token
    pub const LONG_WORD_CHARS: usize = 10;
}

/// Result merging constants
pub mod merge {
    /// Minimum length of a sentence to count as a summary key point
    pub const MIN_KEY_POINT_CHARS: usize = 20;

    /// Key points taken from each chunk
    pub const KEY_POINTS_PER_CHUNK: usize = 2;

    /// Candidate themes looked for in every chunk
    pub const THEME_VOCABULARY: [&str; 10] = [
        "love", "death", "power", "freedom", "identity", "family", "society", "nature", "time",
        "truth",
    ];
}

/// Orchestration constants
pub mod analysis {
    /// Minimum accepted `timeout_ms` request option
    pub const MIN_TIMEOUT_MS: u64 = 1000;

    /// Default delay between chunk dispatches (milliseconds)
    pub const DEFAULT_INTER_CHUNK_DELAY_MS: u64 = 1000;

    /// Default per-call dispatch timeout (seconds)
    pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

    /// Default retries of a recoverable dispatch failure
    pub const DEFAULT_MAX_RETRIES: usize = 2;

    /// Minimum backoff between dispatch retries (milliseconds)
    pub const RETRY_MIN_DELAY_MS: u64 = 500;

    /// Maximum backoff between dispatch retries (seconds)
    pub const RETRY_MAX_DELAY_SECS: u64 = 30;

    /// How long shutdown waits for active analyses (seconds)
    pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

    /// Poll interval while waiting for active analyses during shutdown
    pub const SHUTDOWN_POLL_MS: u64 = 100;

    /// Progress milestones
    pub mod progress {
        pub const STARTED: f32 = 0.1;
        pub const PREPARING: f32 = 0.3;
        pub const CHUNKS_START: f32 = 0.2;
        pub const CHUNKS_END: f32 = 0.8;
        pub const MERGING: f32 = 0.85;
        pub const PROCESSING: f32 = 0.9;
        pub const COMPLETED: f32 = 1.0;
    }
}

/// Cache constants
pub mod cache {
    /// Maximum entries in the analysis cache
    pub const MAX_ENTRIES: usize = 100;

    /// Cache entry expiration (hours)
    pub const EXPIRATION_HOURS: u64 = 24;
}

/// Rate limiter constants
pub mod rate_limit {
    /// Requests allowed per window
    pub const REQUESTS_PER_WINDOW: usize = 20;

    /// Window length (seconds)
    pub const WINDOW_SECS: u64 = 60;

    /// Rolling hourly spend cap (USD)
    pub const MAX_COST_PER_HOUR_USD: f64 = 5.0;

    /// Maximum callers waiting for a slot
    pub const MAX_QUEUE_SIZE: usize = 50;
}

/// HTTP/Network constants
pub mod network {
    /// Default request timeout (seconds)
    pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

    /// Connection timeout (seconds)
    pub const CONNECTION_TIMEOUT_SECS: u64 = 30;
}

/// Model pricing in USD per 1K tokens: (model prefix, input, output)
///
/// Longest prefix wins; unknown models cost nothing.
pub const MODEL_PRICING: &[(&str, f64, f64)] = &[
    ("gpt-4o-mini", 0.00015, 0.0006),
    ("gpt-4o", 0.0025, 0.01),
    ("gpt-4-turbo", 0.01, 0.03),
    ("gpt-4", 0.03, 0.06),
    ("gpt-3.5-turbo", 0.0005, 0.0015),
];
