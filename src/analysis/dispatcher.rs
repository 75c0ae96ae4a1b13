//! Analysis Dispatch
//!
//! Sends one piece of text to the text analyzer and normalizes the outcome.
//! Each attempt takes a rate limiter slot and runs under the per-call
//! timeout; recoverable failures are retried with exponential backoff,
//! waiting at least as long as the provider's retry hint.

use std::sync::Arc;
use std::time::{Duration, Instant};

use backon::{ExponentialBuilder, Retryable};
use tracing::{debug, warn};

use crate::ai::analyzer::SharedAnalyzer;
use crate::ai::metrics::{MetricsCollector, SharedMetrics};
use crate::ai::rate_limiter::SharedRateLimiter;
use crate::ai::timeout::{dispatch_timeout, with_timeout};
use crate::constants::analysis::{
    DEFAULT_MAX_RETRIES, DEFAULT_REQUEST_TIMEOUT_SECS, RETRY_MAX_DELAY_SECS, RETRY_MIN_DELAY_MS,
};
use crate::types::{
    AnalysisOptions, AnalysisType, BuddyError, DispatchError, ErrorCategory, RawAnalysis,
};

/// Retry and timeout settings for dispatch
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub min_delay: Duration,
    pub max_delay: Duration,
    /// Used when the request does not set `timeout_ms`
    pub request_timeout_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            min_delay: Duration::from_millis(RETRY_MIN_DELAY_MS),
            max_delay: Duration::from_secs(RETRY_MAX_DELAY_SECS),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl RetryPolicy {
    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries)
            .with_jitter()
    }
}

pub struct AnalysisDispatcher {
    analyzer: SharedAnalyzer,
    rate_limiter: Option<SharedRateLimiter>,
    metrics: SharedMetrics,
    policy: RetryPolicy,
}

impl AnalysisDispatcher {
    pub fn new(analyzer: SharedAnalyzer) -> Self {
        Self {
            analyzer,
            rate_limiter: None,
            metrics: Arc::new(MetricsCollector::new()),
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_rate_limiter(mut self, limiter: SharedRateLimiter) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn metrics(&self) -> &SharedMetrics {
        &self.metrics
    }

    pub fn rate_limiter(&self) -> Option<&SharedRateLimiter> {
        self.rate_limiter.as_ref()
    }

    /// Analyze `content` once, retrying recoverable failures
    pub async fn dispatch(
        &self,
        content: &str,
        analysis_type: AnalysisType,
        options: &AnalysisOptions,
    ) -> Result<RawAnalysis, DispatchError> {
        let limit = dispatch_timeout(options.timeout_ms, self.policy.request_timeout_secs);
        let started = Instant::now();

        let analyzer = &self.analyzer;
        let limiter = self.rate_limiter.as_ref();
        let attempt = move || async move {
            if let Some(limiter) = limiter {
                limiter.acquire().await?;
            }
            let raw = with_timeout(
                limit,
                analyzer.analyze_text(content, analysis_type, options),
                "text analysis",
            )
            .await?;
            if raw.content.trim().is_empty() {
                return Err(BuddyError::llm(
                    ErrorCategory::ParseError,
                    "analyzer returned empty content",
                ));
            }
            Ok(raw)
        };

        let outcome = attempt
            .retry(self.policy.backoff())
            .when(|e: &BuddyError| e.is_recoverable())
            .adjust(|e: &BuddyError, backoff: Option<Duration>| {
                backoff.map(|delay| retry_delay(e, delay))
            })
            .notify(|e: &BuddyError, wait: Duration| {
                warn!(%analysis_type, error = %e, "Dispatch failed, retrying in {:?}", wait);
            })
            .await;

        match outcome {
            Ok(raw) => {
                if let Some(limiter) = &self.rate_limiter {
                    limiter.record_cost(raw.metadata.cost_usd).await;
                }
                self.metrics
                    .record_success(analysis_type, &raw, started.elapsed());
                debug!(
                    %analysis_type,
                    tokens = raw.metadata.tokens_used,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Dispatch succeeded"
                );
                Ok(raw)
            }
            Err(e) => {
                self.metrics.record_failure(analysis_type);
                Err(DispatchError::from(&e))
            }
        }
    }
}

/// Backoff delay, raised to the error's retry hint when it has one
fn retry_delay(error: &BuddyError, backoff: Duration) -> Duration {
    match error {
        BuddyError::Llm(e) => e.retry_after.map_or(backoff, |hint| hint.max(backoff)),
        _ => backoff,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::analyzer::TextAnalyzer;
    use crate::ai::rate_limiter::{RateLimitConfig, RateLimiter};
    use crate::types::{LlmError, RawMetadata, Result};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays scripted outcomes in order, then succeeds
    struct ScriptedAnalyzer {
        script: Mutex<VecDeque<Result<RawAnalysis>>>,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl ScriptedAnalyzer {
        fn new(script: Vec<Result<RawAnalysis>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            })
        }
    }

    #[async_trait]
    impl TextAnalyzer for ScriptedAnalyzer {
        async fn analyze_text(
            &self,
            content: &str,
            _analysis_type: AnalysisType,
            _options: &AnalysisOptions,
        ) -> Result<RawAnalysis> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or_else(|| {
                Ok(RawAnalysis {
                    content: format!("analysis of {}", content),
                    confidence: Some(0.8),
                    metadata: RawMetadata {
                        model: "scripted".to_string(),
                        tokens_used: 10,
                        cost_usd: 0.002,
                    },
                })
            })
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            min_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            request_timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn test_dispatch_success() {
        let analyzer = ScriptedAnalyzer::new(vec![]);
        let dispatcher = AnalysisDispatcher::new(analyzer.clone()).with_policy(fast_policy());

        let raw = dispatcher
            .dispatch("chapter one", AnalysisType::Summary, &AnalysisOptions::default())
            .await
            .unwrap();
        assert_eq!(raw.content, "analysis of chapter one");
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.metrics().snapshot().total_tokens, 10);
    }

    #[tokio::test]
    async fn test_recoverable_errors_are_retried() {
        let analyzer = ScriptedAnalyzer::new(vec![
            Err(BuddyError::llm(ErrorCategory::Network, "connection reset")),
            Err(BuddyError::llm(ErrorCategory::Transient, "503")),
        ]);
        let dispatcher = AnalysisDispatcher::new(analyzer.clone()).with_policy(fast_policy());

        let result = dispatcher
            .dispatch("text", AnalysisType::Themes, &AnalysisOptions::default())
            .await;
        assert!(result.is_ok());
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fatal_error_is_not_retried() {
        let analyzer = ScriptedAnalyzer::new(vec![Err(BuddyError::llm(
            ErrorCategory::Auth,
            "invalid api key",
        ))]);
        let dispatcher = AnalysisDispatcher::new(analyzer.clone()).with_policy(fast_policy());

        let err = dispatcher
            .dispatch("text", AnalysisType::Themes, &AnalysisOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.category, ErrorCategory::Auth);
        assert!(err.message.contains("invalid api key"));
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.metrics().snapshot().failed_calls, 1);
    }

    #[tokio::test]
    async fn test_empty_content_is_an_error() {
        let analyzer = ScriptedAnalyzer::new(vec![Ok(RawAnalysis::new("   "))]);
        let policy = RetryPolicy {
            max_retries: 0,
            ..fast_policy()
        };
        let dispatcher = AnalysisDispatcher::new(analyzer).with_policy(policy);

        let err = dispatcher
            .dispatch("text", AnalysisType::Style, &AnalysisOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.category, ErrorCategory::ParseError);
    }

    #[tokio::test]
    async fn test_timeout_option_bounds_each_call() {
        let analyzer = Arc::new(ScriptedAnalyzer {
            script: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(1500),
        });
        let policy = RetryPolicy {
            max_retries: 0,
            ..fast_policy()
        };
        let dispatcher = AnalysisDispatcher::new(analyzer).with_policy(policy);
        let options = AnalysisOptions {
            timeout_ms: Some(1000),
            ..Default::default()
        };

        let err = dispatcher
            .dispatch("text", AnalysisType::Summary, &options)
            .await
            .unwrap_err();
        assert_eq!(err.category, ErrorCategory::Network);
        assert!(err.message.contains("Timeout"));
    }

    #[tokio::test]
    async fn test_rate_limiter_records_cost() {
        let limiter = Arc::new(RateLimiter::new(&RateLimitConfig::default()));
        let dispatcher = AnalysisDispatcher::new(ScriptedAnalyzer::new(vec![]))
            .with_policy(fast_policy())
            .with_rate_limiter(limiter.clone());

        dispatcher
            .dispatch("text", AnalysisType::Summary, &AnalysisOptions::default())
            .await
            .unwrap();

        let stats = limiter.stats().await;
        assert_eq!(stats.requests_in_window, 1);
        assert!((stats.cost_last_hour_usd - 0.002).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_exhausted_budget_fails_without_calling_analyzer() {
        let limiter = Arc::new(RateLimiter::new(&RateLimitConfig {
            max_cost_per_hour_usd: 0.0,
            ..Default::default()
        }));
        let analyzer = ScriptedAnalyzer::new(vec![]);
        let dispatcher = AnalysisDispatcher::new(analyzer.clone())
            .with_policy(fast_policy())
            .with_rate_limiter(limiter);

        let err = dispatcher
            .dispatch("text", AnalysisType::Summary, &AnalysisOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.category, ErrorCategory::RateLimit);
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rate_limit_hint_extends_backoff() {
        let hint = Duration::from_millis(200);
        let analyzer = ScriptedAnalyzer::new(vec![Err(BuddyError::Llm(
            LlmError::new(ErrorCategory::RateLimit, "429 too many requests").retry_after(hint),
        ))]);
        let dispatcher = AnalysisDispatcher::new(analyzer.clone()).with_policy(fast_policy());

        let started = Instant::now();
        let result = dispatcher
            .dispatch("text", AnalysisType::Summary, &AnalysisOptions::default())
            .await;

        assert!(result.is_ok());
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 2);
        assert!(started.elapsed() >= hint);
    }

    #[test]
    fn test_retry_delay_takes_longer_of_hint_and_backoff() {
        let backoff = Duration::from_secs(1);
        let limited = BuddyError::Llm(
            LlmError::new(ErrorCategory::RateLimit, "slow down")
                .retry_after(Duration::from_secs(30)),
        );
        let brief = BuddyError::Llm(
            LlmError::new(ErrorCategory::Transient, "busy")
                .retry_after(Duration::from_millis(10)),
        );
        let unhinted = BuddyError::llm(ErrorCategory::Network, "reset");

        assert_eq!(retry_delay(&limited, backoff), Duration::from_secs(30));
        assert_eq!(retry_delay(&brief, backoff), backoff);
        assert_eq!(retry_delay(&unhinted, backoff), backoff);
    }
}
