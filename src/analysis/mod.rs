//! Analysis Orchestration
//!
//! Turns a book and an analysis type into a finished [`AnalysisResult`]:
//! dispatch per chunk, merge, cache and persist.
//!
//! [`AnalysisResult`]: crate::types::AnalysisResult

pub mod cache;
pub mod dispatcher;
pub mod events;
pub mod merger;
pub mod service;

pub use cache::{AnalysisCache, CacheStats, Clock, ManualClock, SystemClock};
pub use dispatcher::{AnalysisDispatcher, RetryPolicy};
pub use events::{
    AnalysisEvent, BroadcastSink, EventSink, MemorySink, NullSink, ProgressListener,
    ProgressStage, ProgressUpdate, SharedSink, SystemEvent, system_channel,
};
pub use merger::{ChunkResultMerger, MergeStrategy, fallback_merge, strategy_for};
pub use service::{BookAnalysisService, PacingPolicy, ServiceBuilder, ServiceStats};
