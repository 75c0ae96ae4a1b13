//! Book Analysis Service
//!
//! Runs one analysis request end to end:
//!
//! ```text
//! validate → cache check ─ hit ──────────────────────────────────────→ done
//!                        └ miss → chunk → dispatch (1..N) → merge
//!                                 → check result → enhance → cache → persist → done
//! ```
//!
//! Public operations never return `Err`. Every failure becomes an
//! [`ErrorResponse`] and an `Error` event on the sink.
//!
//! Chunks are dispatched one at a time in index order, separated by the
//! configured [`PacingPolicy`]. A failed chunk is skipped when the book was
//! split; a failure of the only chunk fails the request.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::cache::{AnalysisCache, CacheStats, Clock, SystemClock};
use super::dispatcher::{AnalysisDispatcher, RetryPolicy};
use super::events::{
    AnalysisEvent, NullSink, ProgressListener, ProgressStage, ProgressUpdate,
    SharedSink, SystemEvent,
};
use super::merger::ChunkResultMerger;
use crate::ai::analyzer::SharedAnalyzer;
use crate::ai::chunker::{Chunk, ContentChunker};
use crate::ai::metrics::{MetricsSummary, SharedMetrics};
use crate::ai::rate_limiter::SharedRateLimiter;
use crate::ai::tokenizer::{RegexSentenceSplitter, SharedEstimator, SharedSplitter, TokenCounter};
use crate::config::AnalysisConfig;
use crate::constants::analysis::{MIN_TIMEOUT_MS, SHUTDOWN_POLL_MS, progress};
use crate::storage::{SharedStore, remove_analyses};
use crate::types::{
    AnalysisMetadata, AnalysisOptions, AnalysisOutcome, AnalysisResult, AnalysisType,
    BatchEntry, BatchResult, Book, BookMetadata, BuddyError, DEFAULT_CONFIDENCE, DispatchError,
    ErrorCategory, ErrorResponse, ProcessingMethod, RawAnalysis, Result, ValidationError,
    analysis_key,
};

// =============================================================================
// Pacing
// =============================================================================

/// Delay inserted between consecutive chunk dispatches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacingPolicy {
    Immediate,
    Fixed(Duration),
}

impl PacingPolicy {
    pub fn from_millis(ms: u64) -> Self {
        if ms == 0 {
            PacingPolicy::Immediate
        } else {
            PacingPolicy::Fixed(Duration::from_millis(ms))
        }
    }

    async fn pause(&self) {
        if let PacingPolicy::Fixed(delay) = self {
            tokio::time::sleep(*delay).await;
        }
    }
}

// =============================================================================
// Builder
// =============================================================================

pub struct ServiceBuilder {
    analyzer: SharedAnalyzer,
    config: AnalysisConfig,
    store: Option<SharedStore>,
    sink: SharedSink,
    rate_limiter: Option<SharedRateLimiter>,
    metrics: Option<SharedMetrics>,
    pacing: Option<PacingPolicy>,
    retry: Option<RetryPolicy>,
    clock: Arc<dyn Clock>,
    estimator: Option<SharedEstimator>,
    splitter: SharedSplitter,
}

impl ServiceBuilder {
    pub fn config(mut self, config: AnalysisConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(mut self, store: SharedStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn event_sink(mut self, sink: SharedSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn rate_limiter(mut self, limiter: SharedRateLimiter) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    pub fn metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Overrides `inter_chunk_delay_ms`
    pub fn pacing(mut self, pacing: PacingPolicy) -> Self {
        self.pacing = Some(pacing);
        self
    }

    /// Overrides `max_retries` and `request_timeout_secs`
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Overrides the estimator selected by `estimation`
    pub fn estimator(mut self, estimator: SharedEstimator) -> Self {
        self.estimator = Some(estimator);
        self
    }

    pub fn splitter(mut self, splitter: SharedSplitter) -> Self {
        self.splitter = splitter;
        self
    }

    pub fn build(self) -> Result<BookAnalysisService> {
        self.config.validate()?;

        let retry = self.retry.unwrap_or_else(|| RetryPolicy {
            max_retries: self.config.max_retries,
            request_timeout_secs: self.config.request_timeout_secs,
            ..RetryPolicy::default()
        });

        let mut dispatcher = AnalysisDispatcher::new(self.analyzer).with_policy(retry);
        if let Some(limiter) = self.rate_limiter {
            dispatcher = dispatcher.with_rate_limiter(limiter);
        }
        if let Some(metrics) = self.metrics {
            dispatcher = dispatcher.with_metrics(metrics);
        }

        let estimator = self
            .estimator
            .unwrap_or_else(|| Arc::new(TokenCounter::new(self.config.estimation)) as SharedEstimator);

        Ok(BookAnalysisService {
            chunker: ContentChunker::new(estimator, self.splitter.clone()),
            merger: ChunkResultMerger::new(self.splitter),
            cache: AnalysisCache::with_clock(
                self.config.cache_max_size,
                self.config.cache_ttl_hours,
                self.clock,
            ),
            pacing: self
                .pacing
                .unwrap_or_else(|| PacingPolicy::from_millis(self.config.inter_chunk_delay_ms)),
            config: self.config,
            dispatcher,
            store: self.store,
            sink: self.sink,
            listeners: RwLock::new(Vec::new()),
            active: DashMap::new(),
            shutting_down: AtomicBool::new(false),
        })
    }
}

// =============================================================================
// Service
// =============================================================================

#[derive(Debug, Clone)]
struct ActiveAnalysis {
    book_id: String,
    analysis_type: AnalysisType,
    started_at: Instant,
}

/// Removes an analysis from the active set when the request ends
struct ActiveGuard<'a> {
    active: &'a DashMap<String, ActiveAnalysis>,
    analysis_id: String,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.active.remove(&self.analysis_id);
    }
}

/// Assembled analysis before ids and book metadata are attached
#[derive(Debug)]
struct Draft {
    content: String,
    confidence: f64,
    model: String,
    tokens_used: u64,
    cost_usd: f64,
    method: ProcessingMethod,
    chunks_processed: Option<usize>,
    total_chunks: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStats {
    pub active_analyses: usize,
    pub shutting_down: bool,
    pub cache: CacheStats,
    pub usage: MetricsSummary,
}

pub struct BookAnalysisService {
    config: AnalysisConfig,
    chunker: ContentChunker,
    dispatcher: AnalysisDispatcher,
    merger: ChunkResultMerger,
    cache: AnalysisCache,
    pacing: PacingPolicy,
    store: Option<SharedStore>,
    sink: SharedSink,
    listeners: RwLock<Vec<ProgressListener>>,
    active: DashMap<String, ActiveAnalysis>,
    shutting_down: AtomicBool,
}

impl BookAnalysisService {
    pub fn builder(analyzer: SharedAnalyzer) -> ServiceBuilder {
        ServiceBuilder {
            analyzer,
            config: AnalysisConfig::default(),
            store: None,
            sink: Arc::new(NullSink),
            rate_limiter: None,
            metrics: None,
            pacing: None,
            retry: None,
            clock: Arc::new(SystemClock),
            estimator: None,
            splitter: Arc::new(RegexSentenceSplitter),
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn chunker(&self) -> &ContentChunker {
        &self.chunker
    }

    /// Register a progress callback
    pub fn on_progress<F>(&self, listener: F)
    where
        F: Fn(&ProgressUpdate) + Send + Sync + 'static,
    {
        self.listeners
            .write()
            .unwrap_or_else(|poisoned| {
                tracing::error!("Progress listener RwLock poisoned, recovering");
                poisoned.into_inner()
            })
            .push(Arc::new(listener));
    }

    /// Analyze `book` for the named analysis type
    #[instrument(skip_all, fields(book_id = %book.id, analysis_type = %analysis_type))]
    pub async fn analyze(
        &self,
        book: &Book,
        analysis_type: &str,
        options: &AnalysisOptions,
    ) -> AnalysisOutcome {
        let analysis_id = Uuid::new_v4().to_string();

        if self.shutting_down.load(Ordering::Acquire) {
            return self.fail(&analysis_id, book, analysis_type, &BuddyError::ShuttingDown);
        }

        let parsed = match validate_request(book, analysis_type, options, self.config.overlap_tokens) {
            Ok(parsed) => parsed,
            Err(e) => return self.fail(&analysis_id, book, analysis_type, &e),
        };

        if let Some(hit) = self.cached(book, parsed) {
            debug!("Serving cached analysis {}", hit.analysis_id);
            return hit.into();
        }

        let _guard = self.track(&analysis_id, book, parsed);
        info!(analysis_id = %analysis_id, "Analysis started");
        self.sink.emit(AnalysisEvent::Started {
            analysis_id: analysis_id.clone(),
            book_id: book.id.clone(),
            analysis_type: parsed,
            timestamp: Utc::now(),
        });
        self.report(&analysis_id, book, parsed, progress::STARTED, ProgressStage::Started, None);

        match self.run(&analysis_id, book, parsed, options).await {
            Ok(result) => {
                self.report(
                    &analysis_id,
                    book,
                    parsed,
                    progress::COMPLETED,
                    ProgressStage::Completed,
                    None,
                );
                self.sink.emit(AnalysisEvent::Completed {
                    analysis_id: analysis_id.clone(),
                    book_id: book.id.clone(),
                    analysis_type: parsed,
                    from_cache: false,
                    timestamp: result.generated_at,
                });
                info!(
                    analysis_id = %analysis_id,
                    method = ?result.metadata.processing_method,
                    tokens = result.metadata.tokens_used,
                    "Analysis completed"
                );
                result.into()
            }
            Err(e) => self.fail(&analysis_id, book, analysis_type, &e),
        }
    }

    /// Typed convenience over [`analyze`](Self::analyze)
    pub async fn analyze_type(
        &self,
        book: &Book,
        analysis_type: AnalysisType,
        options: &AnalysisOptions,
    ) -> AnalysisOutcome {
        self.analyze(book, analysis_type.as_str(), options).await
    }

    /// Run each analysis type in turn; failures are recorded, not fatal
    pub async fn analyze_batch<I, S>(
        &self,
        book: &Book,
        analysis_types: I,
        options: &AnalysisOptions,
    ) -> BatchResult
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut results = Vec::new();
        for analysis_type in analysis_types {
            let analysis_type = analysis_type.as_ref();
            let outcome = self.analyze(book, analysis_type, options).await;
            results.push(BatchEntry {
                analysis_type: analysis_type.to_string(),
                outcome,
            });
        }

        let success_count = results.iter().filter(|r| r.outcome.is_success()).count();
        let failure_count = results.len() - success_count;
        info!(
            book_id = %book.id,
            success_count, failure_count, "Batch analysis finished"
        );

        BatchResult {
            book_id: book.id.clone(),
            results,
            success_count,
            failure_count,
        }
    }

    // =========================================================================
    // Pipeline
    // =========================================================================

    async fn run(
        &self,
        analysis_id: &str,
        book: &Book,
        analysis_type: AnalysisType,
        options: &AnalysisOptions,
    ) -> Result<AnalysisResult> {
        let max_tokens = options
            .max_tokens_per_chunk
            .unwrap_or(self.config.max_tokens_per_chunk);
        let chunks = self.chunker.chunk(
            &book.content,
            max_tokens,
            self.config.overlap_tokens,
            self.config.preserve_sentences,
        );
        debug!(chunks = chunks.len(), max_tokens, "Content chunked");

        let draft = match chunks.as_slice() {
            [single] => {
                self.analyze_single(analysis_id, book, analysis_type, single, options)
                    .await?
            }
            _ => {
                self.analyze_chunked(analysis_id, book, analysis_type, &chunks, options)
                    .await?
            }
        };

        check_draft(&draft)?;

        let result = enhance(draft, analysis_id, book, analysis_type);

        if self.config.cache_enabled {
            self.cache.put(&book.id, analysis_type, result.clone());
        }
        if let Err(e) = self.persist(&result) {
            warn!(analysis_id, error = %e, "Failed to persist analysis result");
        }

        Ok(result)
    }

    async fn analyze_single(
        &self,
        analysis_id: &str,
        book: &Book,
        analysis_type: AnalysisType,
        chunk: &Chunk,
        options: &AnalysisOptions,
    ) -> Result<Draft> {
        self.report(
            analysis_id,
            book,
            analysis_type,
            progress::PREPARING,
            ProgressStage::Preparing,
            None,
        );

        let raw = self
            .dispatcher
            .dispatch(&chunk.content, analysis_type, options)
            .await?;

        Ok(Draft {
            confidence: raw.confidence.unwrap_or(DEFAULT_CONFIDENCE),
            content: raw.content,
            model: raw.metadata.model,
            tokens_used: raw.metadata.tokens_used,
            cost_usd: raw.metadata.cost_usd,
            method: ProcessingMethod::SingleChunk,
            chunks_processed: None,
            total_chunks: None,
        })
    }

    async fn analyze_chunked(
        &self,
        analysis_id: &str,
        book: &Book,
        analysis_type: AnalysisType,
        chunks: &[Chunk],
        options: &AnalysisOptions,
    ) -> Result<Draft> {
        let total = chunks.len();
        let mut successes: Vec<RawAnalysis> = Vec::with_capacity(total);
        let mut last_error: Option<DispatchError> = None;

        for chunk in chunks {
            if chunk.chunk_index > 0 {
                self.pacing.pause().await;
            }

            let fraction = chunk.chunk_index as f32 / total as f32;
            self.report(
                analysis_id,
                book,
                analysis_type,
                progress::CHUNKS_START + (progress::CHUNKS_END - progress::CHUNKS_START) * fraction,
                ProgressStage::Chunk,
                Some(format!("Processing chunk {}/{}", chunk.chunk_index + 1, total)),
            );

            match self
                .dispatcher
                .dispatch(&chunk.content, analysis_type, options)
                .await
            {
                Ok(raw) => successes.push(raw),
                Err(e) => {
                    let e = e.for_chunk(chunk.chunk_index);
                    warn!(analysis_id, error = %e, "Chunk analysis failed, skipping");
                    self.sink.emit(AnalysisEvent::ChunkFailed {
                        analysis_id: analysis_id.to_string(),
                        book_id: book.id.clone(),
                        chunk_index: chunk.chunk_index,
                        error: e.message.clone(),
                    });
                    last_error = Some(e);
                }
            }
        }

        self.report(
            analysis_id,
            book,
            analysis_type,
            progress::CHUNKS_END,
            ProgressStage::Chunk,
            Some(format!("Processed {}/{} chunks", successes.len(), total)),
        );

        if successes.is_empty() {
            let category = last_error
                .as_ref()
                .map(|e| e.category)
                .unwrap_or(ErrorCategory::Unknown);
            let detail = last_error.map(|e| e.message).unwrap_or_default();
            return Err(BuddyError::Dispatch(DispatchError::new(
                category,
                format!("all {} chunks failed; last error: {}", total, detail),
            )));
        }

        self.report(
            analysis_id,
            book,
            analysis_type,
            progress::MERGING,
            ProgressStage::Merging,
            None,
        );
        let content = self.merger.merge(&successes, analysis_type);
        let confidence = ChunkResultMerger::average_confidence(&successes);

        self.report(
            analysis_id,
            book,
            analysis_type,
            progress::PROCESSING,
            ProgressStage::Processing,
            None,
        );

        Ok(Draft {
            content,
            confidence,
            model: successes[0].metadata.model.clone(),
            tokens_used: successes.iter().map(|r| r.metadata.tokens_used).sum(),
            cost_usd: successes.iter().map(|r| r.metadata.cost_usd).sum(),
            method: ProcessingMethod::Chunked,
            chunks_processed: Some(successes.len()),
            total_chunks: Some(total),
        })
    }

    // =========================================================================
    // Cache and persistence
    // =========================================================================

    fn cached(&self, book: &Book, analysis_type: AnalysisType) -> Option<AnalysisResult> {
        if !self.config.cache_enabled {
            return None;
        }
        let mut hit = self.cache.get(&book.id, analysis_type)?;

        if hit.book.content_fingerprint != book.content_fingerprint() {
            debug!(book_id = %book.id, %analysis_type, "Book content changed, dropping cached result");
            self.cache.invalidate(&book.id, Some(analysis_type));
            return None;
        }

        hit.from_cache = true;
        Some(hit)
    }

    fn persist(&self, result: &AnalysisResult) -> Result<()> {
        let Some(store) = self.store.as_ref().filter(|_| self.config.persist_results) else {
            return Ok(());
        };
        let value = serde_json::to_value(result)?;
        store
            .save(&analysis_key(&result.book_id, result.analysis_type), &value)
            .map_err(|e| BuddyError::Persistence(e.to_string()))
    }

    /// Load a previously persisted result
    pub fn stored_analysis(
        &self,
        book_id: &str,
        analysis_type: AnalysisType,
    ) -> Result<Option<AnalysisResult>> {
        let Some(store) = &self.store else {
            return Ok(None);
        };
        store
            .load(&analysis_key(book_id, analysis_type))?
            .map(|value| serde_json::from_value(value).map_err(BuddyError::from))
            .transpose()
    }

    /// Delete persisted results for one book, or all of them
    pub fn remove_stored(&self, book_id: Option<&str>) -> Result<usize> {
        match &self.store {
            Some(store) => remove_analyses(store.as_ref(), book_id),
            None => Ok(0),
        }
    }

    pub fn cache(&self) -> &AnalysisCache {
        &self.cache
    }

    // =========================================================================
    // System events
    // =========================================================================

    pub fn handle_system_event(&self, event: &SystemEvent) {
        match event {
            SystemEvent::CacheClear { book_id: Some(id) } => {
                let removed = self.cache.invalidate(id, None);
                info!(book_id = %id, removed, "Cleared cached analyses for book");
                self.sink.emit(AnalysisEvent::CacheCleared {
                    book_id: Some(id.clone()),
                    removed,
                });
            }
            SystemEvent::CacheClear { book_id: None } => {
                let removed = self.cache.len();
                self.cache.clear();
                info!(removed, "Cleared analysis cache");
                self.sink.emit(AnalysisEvent::CacheCleared {
                    book_id: None,
                    removed,
                });
            }
            SystemEvent::MemoryPressure => {
                let removed = self.cache.handle_memory_pressure();
                warn!(removed, "Memory pressure: trimmed analysis cache");
            }
        }
    }

    /// Consume system events until the channel closes
    pub fn spawn_event_listener(
        self: &Arc<Self>,
        mut events: broadcast::Receiver<SystemEvent>,
    ) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        debug!(event = event.name(), "System event received");
                        service.handle_system_event(&event);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "System event listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    fn track(&self, analysis_id: &str, book: &Book, analysis_type: AnalysisType) -> ActiveGuard<'_> {
        self.active.insert(
            analysis_id.to_string(),
            ActiveAnalysis {
                book_id: book.id.clone(),
                analysis_type,
                started_at: Instant::now(),
            },
        );
        ActiveGuard {
            active: &self.active,
            analysis_id: analysis_id.to_string(),
        }
    }

    pub fn active_analyses(&self) -> usize {
        self.active.len()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Stop accepting work and wait for active analyses.
    ///
    /// Returns how many analyses were still running at the deadline; their
    /// tracking state is cleared but in-flight calls are not aborted.
    pub async fn shutdown(&self) -> usize {
        self.shutting_down.store(true, Ordering::Release);
        let deadline = Instant::now() + Duration::from_secs(self.config.shutdown_timeout_secs);
        info!(active = self.active.len(), "Shutting down analysis service");

        while !self.active.is_empty() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(SHUTDOWN_POLL_MS)).await;
        }

        let abandoned = self.active.len();
        if abandoned > 0 {
            for entry in self.active.iter() {
                warn!(
                    analysis_id = %entry.key(),
                    book_id = %entry.book_id,
                    analysis_type = %entry.analysis_type,
                    running_ms = entry.started_at.elapsed().as_millis() as u64,
                    "Abandoning active analysis at shutdown"
                );
            }
            self.active.clear();
        }
        abandoned
    }

    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            active_analyses: self.active.len(),
            shutting_down: self.is_shutting_down(),
            cache: self.cache.stats(),
            usage: self.dispatcher.metrics().snapshot(),
        }
    }

    // =========================================================================
    // Reporting
    // =========================================================================

    fn report(
        &self,
        analysis_id: &str,
        book: &Book,
        analysis_type: AnalysisType,
        progress: f32,
        stage: ProgressStage,
        detail: Option<String>,
    ) {
        if !self.config.progress_enabled {
            return;
        }

        let update = ProgressUpdate {
            analysis_id: analysis_id.to_string(),
            book_id: book.id.clone(),
            analysis_type,
            progress,
            stage,
            detail,
        };

        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        for listener in &listeners {
            listener(&update);
        }
        self.sink.emit(AnalysisEvent::Progress(update));
    }

    fn fail(
        &self,
        analysis_id: &str,
        book: &Book,
        analysis_type: &str,
        error: &BuddyError,
    ) -> AnalysisOutcome {
        warn!(analysis_id, book_id = %book.id, error = %error, "Analysis failed");
        self.sink.emit(AnalysisEvent::Error {
            analysis_id: analysis_id.to_string(),
            book_id: book.id.clone(),
            analysis_type: analysis_type.to_string(),
            error: error.to_string(),
            timestamp: Utc::now(),
        });
        ErrorResponse::new(error.to_string(), analysis_id, &book.id, analysis_type).into()
    }
}

// =============================================================================
// Validation
// =============================================================================

/// Check a request before any work is done, collecting every violation
fn validate_request(
    book: &Book,
    analysis_type: &str,
    options: &AnalysisOptions,
    overlap_tokens: usize,
) -> Result<AnalysisType> {
    let mut violations = Vec::new();

    if book.id.trim().is_empty() {
        violations.push(ValidationError::new("id", "Book id is required"));
    }
    if book.title.trim().is_empty() {
        violations.push(ValidationError::new("title", "Book title is required"));
    }
    if book.content.trim().is_empty() && !options.allow_empty_content {
        violations.push(ValidationError::new("content", "Book content is required"));
    }

    let parsed = match analysis_type.parse::<AnalysisType>() {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            violations.push(ValidationError::new("analysisType", e));
            None
        }
    };

    if let Some(ms) = options.timeout_ms
        && ms < MIN_TIMEOUT_MS
    {
        violations.push(ValidationError::new(
            "timeoutMs",
            format!("timeoutMs must be at least {}, got {}", MIN_TIMEOUT_MS, ms),
        ));
    }
    match options.max_tokens_per_chunk {
        Some(0) => violations.push(ValidationError::new(
            "maxTokensPerChunk",
            "maxTokensPerChunk must be greater than 0",
        )),
        // chunk windows would advance by a single character
        Some(max) if max <= overlap_tokens => violations.push(ValidationError::new(
            "maxTokensPerChunk",
            format!(
                "maxTokensPerChunk ({}) must be greater than overlap_tokens ({})",
                max, overlap_tokens
            ),
        )),
        _ => {}
    }

    match parsed {
        Some(parsed) if violations.is_empty() => Ok(parsed),
        _ => Err(BuddyError::Validation(violations)),
    }
}

/// Post-conditions on an assembled analysis
fn check_draft(draft: &Draft) -> Result<()> {
    if draft.content.trim().is_empty() {
        return Err(BuddyError::InvalidResult(
            "analysis content is empty".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&draft.confidence) {
        return Err(BuddyError::InvalidResult(format!(
            "confidence {} is outside [0, 1]",
            draft.confidence
        )));
    }
    Ok(())
}

fn enhance(
    draft: Draft,
    analysis_id: &str,
    book: &Book,
    analysis_type: AnalysisType,
) -> AnalysisResult {
    AnalysisResult {
        success: true,
        content: draft.content,
        analysis_type,
        confidence: draft.confidence,
        metadata: AnalysisMetadata {
            model: draft.model,
            tokens_used: draft.tokens_used,
            cost_usd: draft.cost_usd,
            processing_method: draft.method,
            chunks_processed: draft.chunks_processed,
            total_chunks: draft.total_chunks,
        },
        analysis_id: analysis_id.to_string(),
        book_id: book.id.clone(),
        book: BookMetadata::from(book),
        generated_at: Utc::now(),
        from_cache: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::analyzer::TextAnalyzer;
    use crate::ai::tokenizer::EstimationMethod;
    use crate::analysis::cache::ManualClock;
    use crate::analysis::events::MemorySink;
    use crate::storage::{AnalysisStore, MemoryStore};
    use crate::types::RawMetadata;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    /// Spy analyzer: counts calls and fails the calls whose index is listed
    struct SpyAnalyzer {
        calls: AtomicUsize,
        fail_calls: HashSet<usize>,
        seen: Mutex<Vec<String>>,
        confidence: Option<f64>,
    }

    impl SpyAnalyzer {
        fn new() -> Arc<Self> {
            Self::failing(&[])
        }

        fn failing(indices: &[usize]) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail_calls: indices.iter().copied().collect(),
                seen: Mutex::new(Vec::new()),
                confidence: Some(0.9),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TextAnalyzer for SpyAnalyzer {
        async fn analyze_text(
            &self,
            content: &str,
            analysis_type: AnalysisType,
            _options: &AnalysisOptions,
        ) -> Result<RawAnalysis> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(content.to_string());
            if self.fail_calls.contains(&call) {
                return Err(BuddyError::llm(ErrorCategory::Auth, "provider rejected call"));
            }
            Ok(RawAnalysis {
                content: format!("{} of [{}]", analysis_type, content.trim()),
                confidence: self.confidence,
                metadata: RawMetadata {
                    model: "spy-model".to_string(),
                    tokens_used: 100,
                    cost_usd: 0.01,
                },
            })
        }
    }

    fn test_config() -> AnalysisConfig {
        AnalysisConfig {
            overlap_tokens: 0,
            preserve_sentences: false,
            estimation: EstimationMethod::CharBased,
            inter_chunk_delay_ms: 0,
            max_retries: 0,
            shutdown_timeout_secs: 0,
            ..Default::default()
        }
    }

    fn service(analyzer: Arc<SpyAnalyzer>) -> BookAnalysisService {
        BookAnalysisService::builder(analyzer)
            .config(test_config())
            .build()
            .unwrap()
    }

    fn short_book() -> Book {
        Book::new(
            "book-1",
            "Short Stories",
            "A. Writer",
            "Sentence one. Sentence two. Sentence three.",
        )
    }

    /// 120 chars; with char estimation and 10 tokens per chunk this splits in 3
    fn long_book() -> Book {
        let content = format!("{}{}{}", "a".repeat(40), "b".repeat(40), "c".repeat(40));
        Book::new("book-2", "Long Read", "B. Author", content)
    }

    fn small_chunks() -> AnalysisOptions {
        AnalysisOptions {
            max_tokens_per_chunk: Some(10),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_short_book_single_chunk() {
        let analyzer = SpyAnalyzer::new();
        let service = service(analyzer.clone());

        let outcome = service
            .analyze(&short_book(), "summary", &AnalysisOptions::default())
            .await;

        let result = outcome.result().unwrap();
        assert!(result.success);
        assert!(!result.content.is_empty());
        assert_eq!(result.metadata.processing_method, ProcessingMethod::SingleChunk);
        assert_eq!(result.book.title, "Short Stories");
        assert!((result.confidence - 0.9).abs() < f64::EPSILON);
        assert_eq!(analyzer.calls(), 1);
        assert_eq!(service.active_analyses(), 0);
    }

    #[tokio::test]
    async fn test_missing_id_fails_without_dispatch() {
        let analyzer = SpyAnalyzer::new();
        let service = service(analyzer.clone());
        let mut book = short_book();
        book.id.clear();

        let outcome = service
            .analyze(&book, "summary", &AnalysisOptions::default())
            .await;

        assert!(!outcome.is_success());
        assert!(outcome.error().unwrap().contains("id"));
        assert_eq!(analyzer.calls(), 0);
    }

    #[tokio::test]
    async fn test_all_violations_are_joined() {
        let analyzer = SpyAnalyzer::new();
        let service = service(analyzer.clone());
        let book = Book::new("", "", "", "");
        let options = AnalysisOptions {
            timeout_ms: Some(10),
            ..Default::default()
        };

        let outcome = service.analyze(&book, "plot", &options).await;
        let error = outcome.error().unwrap();
        assert!(error.contains("Book id is required"));
        assert!(error.contains("Book title is required"));
        assert!(error.contains("Book content is required"));
        assert!(error.contains("Unsupported analysis type 'plot'"));
        assert!(error.contains("timeoutMs"));
        assert_eq!(analyzer.calls(), 0);
    }

    #[tokio::test]
    async fn test_chunk_size_option_must_exceed_overlap() {
        let analyzer = SpyAnalyzer::new();
        let config = AnalysisConfig {
            overlap_tokens: 200,
            ..test_config()
        };
        let service = BookAnalysisService::builder(analyzer.clone())
            .config(config)
            .build()
            .unwrap();
        let book = Book::new("book-3", "Dense Read", "C. Author", "x".repeat(2000));

        let too_small = AnalysisOptions {
            max_tokens_per_chunk: Some(50),
            ..Default::default()
        };
        let outcome = service.analyze(&book, "summary", &too_small).await;
        let error = outcome.error().unwrap();
        assert!(error.contains("maxTokensPerChunk (50)"));
        assert!(error.contains("overlap_tokens (200)"));
        assert_eq!(analyzer.calls(), 0);

        // 500 estimated tokens, windows of 300 advancing by 100
        let above_overlap = AnalysisOptions {
            max_tokens_per_chunk: Some(300),
            ..Default::default()
        };
        let outcome = service.analyze(&book, "summary", &above_overlap).await;
        assert!(outcome.is_success());
        assert!((2..=5).contains(&analyzer.calls()));
    }

    #[tokio::test]
    async fn test_empty_content_allowed_by_option() {
        let analyzer = SpyAnalyzer::new();
        let service = service(analyzer.clone());
        let book = Book::new("b-empty", "Blank", "Nobody", "");
        let options = AnalysisOptions {
            allow_empty_content: true,
            ..Default::default()
        };

        let outcome = service.analyze(&book, "style", &options).await;
        assert!(outcome.is_success());
        assert_eq!(analyzer.calls(), 1);
    }

    #[tokio::test]
    async fn test_chunk_failure_is_skipped() {
        let analyzer = SpyAnalyzer::failing(&[1]);
        let sink = Arc::new(MemorySink::new());
        let service = BookAnalysisService::builder(analyzer.clone())
            .config(test_config())
            .event_sink(sink.clone())
            .build()
            .unwrap();

        let outcome = service
            .analyze(&long_book(), "characters", &small_chunks())
            .await;

        let result = outcome.result().unwrap();
        assert_eq!(result.metadata.processing_method, ProcessingMethod::Chunked);
        assert_eq!(result.metadata.chunks_processed, Some(2));
        assert_eq!(result.metadata.total_chunks, Some(3));
        assert_eq!(result.metadata.tokens_used, 200);
        assert!(result.content.contains(&"a".repeat(40)));
        assert!(!result.content.contains(&"b".repeat(40)));
        assert!(result.content.contains(&"c".repeat(40)));
        assert_eq!(analyzer.calls(), 3);
        assert!(sink.names().contains(&"ai:analysis:chunk_failed"));
    }

    #[tokio::test]
    async fn test_single_chunk_failure_fails_request() {
        let analyzer = SpyAnalyzer::failing(&[0]);
        let sink = Arc::new(MemorySink::new());
        let service = BookAnalysisService::builder(analyzer)
            .config(test_config())
            .event_sink(sink.clone())
            .build()
            .unwrap();

        let outcome = service
            .analyze(&short_book(), "summary", &AnalysisOptions::default())
            .await;

        assert!(!outcome.is_success());
        assert!(outcome.error().unwrap().contains("provider rejected call"));
        assert_eq!(
            sink.names(),
            vec!["ai:analysis:started", "ai:analysis:progress", "ai:analysis:progress", "ai:analysis:error"]
        );
    }

    #[tokio::test]
    async fn test_all_chunks_failing_fails_request() {
        let service = service(SpyAnalyzer::failing(&[0, 1, 2]));
        let outcome = service
            .analyze(&long_book(), "themes", &small_chunks())
            .await;
        assert!(outcome.error().unwrap().contains("all 3 chunks failed"));
    }

    #[tokio::test]
    async fn test_repeated_request_is_served_from_cache() {
        let analyzer = SpyAnalyzer::new();
        let service = service(analyzer.clone());
        let book = long_book();

        let first = service.analyze(&book, "sentiment", &small_chunks()).await;
        assert!(!first.result().unwrap().from_cache);
        assert_eq!(analyzer.calls(), 3);

        let second = service.analyze(&book, "sentiment", &small_chunks()).await;
        let cached = second.result().unwrap();
        assert!(cached.from_cache);
        assert_eq!(cached.analysis_id, first.analysis_id());
        assert_eq!(analyzer.calls(), 3);
    }

    #[tokio::test]
    async fn test_changed_content_bypasses_cache() {
        let analyzer = SpyAnalyzer::new();
        let service = service(analyzer.clone());
        let mut book = short_book();

        service.analyze(&book, "summary", &AnalysisOptions::default()).await;
        book.content.push_str(" Sentence four.");
        let outcome = service
            .analyze(&book, "summary", &AnalysisOptions::default())
            .await;

        assert!(!outcome.result().unwrap().from_cache);
        assert_eq!(analyzer.calls(), 2);
    }

    #[tokio::test]
    async fn test_cache_expires_after_ttl() {
        let analyzer = SpyAnalyzer::new();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let service = BookAnalysisService::builder(analyzer.clone())
            .config(test_config())
            .clock(clock.clone())
            .build()
            .unwrap();
        let book = short_book();

        service.analyze(&book, "themes", &AnalysisOptions::default()).await;
        clock.advance(chrono::Duration::hours(24) + chrono::Duration::minutes(1));
        service.analyze(&book, "themes", &AnalysisOptions::default()).await;

        assert_eq!(analyzer.calls(), 2);
    }

    #[tokio::test]
    async fn test_cache_disabled() {
        let analyzer = SpyAnalyzer::new();
        let service = BookAnalysisService::builder(analyzer.clone())
            .config(AnalysisConfig {
                cache_enabled: false,
                ..test_config()
            })
            .build()
            .unwrap();

        for _ in 0..2 {
            service
                .analyze(&short_book(), "summary", &AnalysisOptions::default())
                .await;
        }
        assert_eq!(analyzer.calls(), 2);
        assert!(service.cache().is_empty());
    }

    #[tokio::test]
    async fn test_result_is_persisted() {
        let store = Arc::new(MemoryStore::new());
        let service = BookAnalysisService::builder(SpyAnalyzer::new())
            .config(test_config())
            .store(store.clone())
            .build()
            .unwrap();

        let outcome = service
            .analyze(&short_book(), "difficulty", &AnalysisOptions::default())
            .await;
        assert!(outcome.is_success());
        assert!(store.load("analysis_book-1_difficulty").unwrap().is_some());

        let stored = service
            .stored_analysis("book-1", AnalysisType::Difficulty)
            .unwrap()
            .unwrap();
        assert_eq!(stored.analysis_id, outcome.analysis_id());

        assert_eq!(service.remove_stored(Some("book-1")).unwrap(), 1);
        assert!(store.is_empty());
    }

    struct BrokenStore;

    impl AnalysisStore for BrokenStore {
        fn save(&self, _key: &str, _value: &serde_json::Value) -> Result<()> {
            Err(BuddyError::Storage("disk full".to_string()))
        }
        fn load(&self, _key: &str) -> Result<Option<serde_json::Value>> {
            Ok(None)
        }
        fn remove(&self, _key: &str) -> Result<bool> {
            Ok(false)
        }
        fn remove_prefix(&self, _prefix: &str) -> Result<usize> {
            Ok(0)
        }
        fn keys(&self, _prefix: &str) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_persistence_failure_is_not_fatal() {
        let service = BookAnalysisService::builder(SpyAnalyzer::new())
            .config(test_config())
            .store(Arc::new(BrokenStore))
            .build()
            .unwrap();

        let outcome = service
            .analyze(&short_book(), "summary", &AnalysisOptions::default())
            .await;
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn test_out_of_range_confidence_is_rejected() {
        let analyzer = Arc::new(SpyAnalyzer {
            calls: AtomicUsize::new(0),
            fail_calls: HashSet::new(),
            seen: Mutex::new(Vec::new()),
            confidence: Some(1.5),
        });
        let service = service(analyzer);

        let outcome = service
            .analyze(&short_book(), "summary", &AnalysisOptions::default())
            .await;
        assert!(outcome.error().unwrap().contains("confidence"));
    }

    #[tokio::test]
    async fn test_progress_milestones() {
        let service = service(SpyAnalyzer::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        service.on_progress(move |update| sink.lock().unwrap().push(update.progress));

        service
            .analyze(&long_book(), "style", &small_chunks())
            .await;

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.first(), Some(&0.1));
        assert_eq!(seen.last(), Some(&1.0));
        assert!(seen.contains(&progress::CHUNKS_START));
        assert!(seen.contains(&progress::CHUNKS_END));
        assert!(seen.contains(&0.85));
        assert!(seen.contains(&0.9));
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        // started + 3 chunks + chunks done + merging + processing + completed
        assert_eq!(seen.len(), 8);
    }

    #[tokio::test]
    async fn test_progress_disabled() {
        let service = BookAnalysisService::builder(SpyAnalyzer::new())
            .config(AnalysisConfig {
                progress_enabled: false,
                ..test_config()
            })
            .build()
            .unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        service.on_progress(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        service
            .analyze(&short_book(), "summary", &AnalysisOptions::default())
            .await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_batch_collects_failures() {
        let analyzer = SpyAnalyzer::new();
        let service = service(analyzer.clone());

        let batch = service
            .analyze_batch(
                &short_book(),
                ["summary", "plot", "themes"],
                &AnalysisOptions::default(),
            )
            .await;

        assert_eq!(batch.success_count, 2);
        assert_eq!(batch.failure_count, 1);
        assert_eq!(batch.results[1].analysis_type, "plot");
        assert!(!batch.results[1].outcome.is_success());
        assert_eq!(analyzer.calls(), 2);
    }

    #[tokio::test]
    async fn test_system_events() {
        let sink = Arc::new(MemorySink::new());
        let service = BookAnalysisService::builder(SpyAnalyzer::new())
            .config(test_config())
            .event_sink(sink.clone())
            .build()
            .unwrap();
        let book = short_book();
        service.analyze(&book, "summary", &AnalysisOptions::default()).await;
        service.analyze(&book, "themes", &AnalysisOptions::default()).await;
        assert_eq!(service.cache().len(), 2);

        service.handle_system_event(&SystemEvent::CacheClear {
            book_id: Some("book-1".to_string()),
        });
        assert!(service.cache().is_empty());
        assert!(sink.names().contains(&"ai:cache:cleared"));
    }

    #[tokio::test]
    async fn test_event_listener_task() {
        let service = Arc::new(service(SpyAnalyzer::new()));
        service
            .analyze(&short_book(), "summary", &AnalysisOptions::default())
            .await;

        let (tx, rx) = crate::analysis::events::system_channel();
        let handle = service.spawn_event_listener(rx);
        tx.send(SystemEvent::CacheClear { book_id: None }).unwrap();
        drop(tx);
        handle.await.unwrap();

        assert!(service.cache().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_work() {
        let analyzer = SpyAnalyzer::new();
        let service = service(analyzer.clone());

        assert_eq!(service.shutdown().await, 0);
        let outcome = service
            .analyze(&short_book(), "summary", &AnalysisOptions::default())
            .await;

        assert!(outcome.error().unwrap().contains("shutting down"));
        assert_eq!(analyzer.calls(), 0);
        assert!(service.stats().shutting_down);
    }

    #[tokio::test]
    async fn test_stats_report_usage() {
        let service = service(SpyAnalyzer::new());
        service
            .analyze(&long_book(), "summary", &small_chunks())
            .await;
        service
            .analyze(&long_book(), "summary", &small_chunks())
            .await;

        let stats = service.stats();
        assert_eq!(stats.active_analyses, 0);
        assert_eq!(stats.cache.hits, 1);
        assert_eq!(stats.usage.api_calls, 3);
        assert!((stats.usage.total_cost_usd - 0.03).abs() < 1e-9);
    }

    #[test]
    fn test_pacing_from_millis() {
        assert_eq!(PacingPolicy::from_millis(0), PacingPolicy::Immediate);
        assert_eq!(
            PacingPolicy::from_millis(250),
            PacingPolicy::Fixed(Duration::from_millis(250))
        );
    }
}
