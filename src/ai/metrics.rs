//! Usage Metrics Collection
//!
//! Aggregates completion calls, tokens, cost and latency across every
//! analysis a service runs. Thread-safe; counters are atomics.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::types::{AnalysisType, RawAnalysis};

// =============================================================================
// Metrics Collector
// =============================================================================

pub struct MetricsCollector {
    start_time: Instant,
    api_calls: AtomicU64,
    failed_calls: AtomicU64,
    tokens: AtomicU64,
    total_latency_ms: AtomicU64,
    /// Stored as microdollars for atomic ops
    total_cost_micros: AtomicU64,
    by_type: RwLock<BTreeMap<AnalysisType, TypeMetrics>>,
}

/// Usage attributed to one analysis type
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeMetrics {
    pub api_calls: u64,
    pub failed_calls: u64,
    pub tokens: u64,
    #[serde(rename = "costUSD")]
    pub cost_usd: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSummary {
    pub uptime_ms: u64,
    pub api_calls: u64,
    pub failed_calls: u64,
    pub total_tokens: u64,
    pub avg_latency_ms: f64,
    #[serde(rename = "totalCostUSD")]
    pub total_cost_usd: f64,
    pub by_type: BTreeMap<AnalysisType, TypeMetrics>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            api_calls: AtomicU64::new(0),
            failed_calls: AtomicU64::new(0),
            tokens: AtomicU64::new(0),
            total_latency_ms: AtomicU64::new(0),
            total_cost_micros: AtomicU64::new(0),
            by_type: RwLock::new(BTreeMap::new()),
        }
    }

    fn with_type(&self, analysis_type: AnalysisType, f: impl FnOnce(&mut TypeMetrics)) {
        let mut by_type = self.by_type.write().unwrap_or_else(|poisoned| {
            tracing::error!("Metrics by_type RwLock poisoned, recovering");
            poisoned.into_inner()
        });
        f(by_type.entry(analysis_type).or_default());
    }

    /// Record a successful completion call
    pub fn record_success(&self, analysis_type: AnalysisType, raw: &RawAnalysis, latency: Duration) {
        self.api_calls.fetch_add(1, Ordering::Relaxed);
        self.tokens
            .fetch_add(raw.metadata.tokens_used, Ordering::Relaxed);
        self.total_latency_ms
            .fetch_add(latency.as_millis() as u64, Ordering::Relaxed);

        let cost_micros = (raw.metadata.cost_usd * 1_000_000.0) as u64;
        self.total_cost_micros
            .fetch_add(cost_micros, Ordering::Relaxed);

        self.with_type(analysis_type, |m| {
            m.api_calls += 1;
            m.tokens += raw.metadata.tokens_used;
            m.cost_usd += raw.metadata.cost_usd;
        });
    }

    /// Record a call that failed after all retries
    pub fn record_failure(&self, analysis_type: AnalysisType) {
        self.api_calls.fetch_add(1, Ordering::Relaxed);
        self.failed_calls.fetch_add(1, Ordering::Relaxed);
        self.with_type(analysis_type, |m| {
            m.api_calls += 1;
            m.failed_calls += 1;
        });
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSummary {
        let api_calls = self.api_calls.load(Ordering::Relaxed);
        let failed_calls = self.failed_calls.load(Ordering::Relaxed);
        let succeeded = api_calls - failed_calls;
        let total_latency = self.total_latency_ms.load(Ordering::Relaxed);

        let avg_latency = if succeeded > 0 {
            total_latency as f64 / succeeded as f64
        } else {
            0.0
        };

        let by_type = self
            .by_type
            .read()
            .unwrap_or_else(|poisoned| {
                tracing::error!("Metrics by_type RwLock poisoned on read, recovering");
                poisoned.into_inner()
            })
            .clone();

        MetricsSummary {
            uptime_ms: self.start_time.elapsed().as_millis() as u64,
            api_calls,
            failed_calls,
            total_tokens: self.tokens.load(Ordering::Relaxed),
            avg_latency_ms: avg_latency,
            total_cost_usd: self.total_cost_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0,
            by_type,
        }
    }
}

impl MetricsSummary {
    /// Format summary for display
    pub fn display(&self) -> String {
        format!(
            "API Calls: {} ({} failed)\n\
             Tokens: {}\n\
             Avg Latency: {:.0}ms\n\
             Estimated Cost: ${:.4}",
            self.api_calls,
            self.failed_calls,
            self.total_tokens,
            self.avg_latency_ms,
            self.total_cost_usd
        )
    }
}

/// Shared metrics collector
pub type SharedMetrics = Arc<MetricsCollector>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RawMetadata;

    fn raw(tokens: u64, cost: f64) -> RawAnalysis {
        RawAnalysis {
            content: "x".to_string(),
            confidence: None,
            metadata: RawMetadata {
                model: "m".to_string(),
                tokens_used: tokens,
                cost_usd: cost,
            },
        }
    }

    #[test]
    fn test_record_success_and_failure() {
        let metrics = MetricsCollector::new();
        metrics.record_success(AnalysisType::Summary, &raw(150, 0.0125), Duration::from_millis(500));
        metrics.record_failure(AnalysisType::Themes);

        let summary = metrics.snapshot();
        assert_eq!(summary.api_calls, 2);
        assert_eq!(summary.failed_calls, 1);
        assert_eq!(summary.total_tokens, 150);
        assert!((summary.avg_latency_ms - 500.0).abs() < f64::EPSILON);
        assert!((summary.total_cost_usd - 0.0125).abs() < 0.0001);
        assert_eq!(summary.by_type[&AnalysisType::Themes].failed_calls, 1);
    }

    #[test]
    fn test_concurrent_recording() {
        use std::thread;

        let metrics = Arc::new(MetricsCollector::new());

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let m = Arc::clone(&metrics);
                thread::spawn(move || {
                    for _ in 0..100 {
                        m.record_success(AnalysisType::Style, &raw(15, 0.001), Duration::from_millis(50));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let summary = metrics.snapshot();
        assert_eq!(summary.api_calls, 1000);
        assert_eq!(summary.total_tokens, 15000);
        assert!((summary.total_cost_usd - 1.0).abs() < 0.001);
        assert_eq!(summary.by_type[&AnalysisType::Style].api_calls, 1000);
    }

    #[test]
    fn test_summary_display() {
        let metrics = MetricsCollector::new();
        metrics.record_success(AnalysisType::Summary, &raw(1500, 0.05), Duration::from_secs(1));

        let display = metrics.snapshot().display();
        assert!(display.contains("1500"));
        assert!(display.contains("$0.0500"));
    }
}
