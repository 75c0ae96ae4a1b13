//! Request Rate Limiting
//!
//! Throttles calls to the completion provider along three axes:
//!
//! - **Requests**: at most N requests per sliding window
//! - **Cost**: rolling one-hour spend cap in USD
//! - **Queue**: bounded number of callers waiting for a slot
//!
//! `acquire` waits for a request slot; it fails fast when the wait queue is
//! full or the hourly budget is already spent.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::constants::rate_limit;
use crate::types::{BuddyError, Result};

const COST_WINDOW: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub max_requests_per_window: usize,
    pub window_secs: u64,
    pub max_cost_per_hour_usd: f64,
    pub max_queue_size: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests_per_window: rate_limit::REQUESTS_PER_WINDOW,
            window_secs: rate_limit::WINDOW_SECS,
            max_cost_per_hour_usd: rate_limit::MAX_COST_PER_HOUR_USD,
            max_queue_size: rate_limit::MAX_QUEUE_SIZE,
        }
    }
}

#[derive(Debug, Default)]
struct LimiterState {
    requests: VecDeque<Instant>,
    costs: VecDeque<(Instant, f64)>,
}

impl LimiterState {
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&t) = self.requests.front() {
            if now.duration_since(t) >= window {
                self.requests.pop_front();
            } else {
                break;
            }
        }
        while let Some(&(t, _)) = self.costs.front() {
            if now.duration_since(t) >= COST_WINDOW {
                self.costs.pop_front();
            } else {
                break;
            }
        }
    }

    fn hourly_cost(&self) -> f64 {
        self.costs.iter().map(|(_, c)| c).sum()
    }
}

/// Point-in-time limiter usage
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RateLimitStats {
    pub requests_in_window: usize,
    pub cost_last_hour_usd: f64,
    pub waiting: usize,
}

pub struct RateLimiter {
    window: Duration,
    max_requests: usize,
    max_cost: f64,
    max_queue: usize,
    state: Mutex<LimiterState>,
    queue: Semaphore,
}

pub type SharedRateLimiter = Arc<RateLimiter>;

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let max_queue = config.max_queue_size.max(1);
        Self {
            window: Duration::from_secs(config.window_secs),
            max_requests: config.max_requests_per_window.max(1),
            max_cost: config.max_cost_per_hour_usd,
            max_queue,
            state: Mutex::new(LimiterState::default()),
            queue: Semaphore::new(max_queue),
        }
    }

    /// Build with an explicit window, mainly for short-window tests
    pub fn with_window(config: &RateLimitConfig, window: Duration) -> Self {
        Self {
            window,
            ..Self::new(config)
        }
    }

    /// Wait for a request slot and claim it
    pub async fn acquire(&self) -> Result<()> {
        let _ticket = self.queue.try_acquire().map_err(|_| {
            warn!(max_queue = self.max_queue, "Rate limiter queue is full");
            BuddyError::RateLimited(format!(
                "request queue is full ({} waiting)",
                self.max_queue
            ))
        })?;

        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                state.prune(now, self.window);

                let spent = state.hourly_cost();
                if spent >= self.max_cost {
                    return Err(BuddyError::RateLimited(format!(
                        "hourly cost budget exhausted (${:.4} of ${:.2})",
                        spent, self.max_cost
                    )));
                }

                if state.requests.len() < self.max_requests {
                    state.requests.push_back(now);
                    return Ok(());
                }

                match state.requests.front() {
                    Some(&oldest) => (oldest + self.window).saturating_duration_since(now),
                    None => Duration::ZERO,
                }
            };

            debug!(wait_ms = wait.as_millis() as u64, "Waiting for rate limit slot");
            tokio::time::sleep(wait).await;
        }
    }

    /// Count a finished call's cost against the hourly budget
    pub async fn record_cost(&self, cost_usd: f64) {
        if cost_usd > 0.0 {
            self.state
                .lock()
                .await
                .costs
                .push_back((Instant::now(), cost_usd));
        }
    }

    pub async fn stats(&self) -> RateLimitStats {
        let mut state = self.state.lock().await;
        state.prune(Instant::now(), self.window);
        RateLimitStats {
            requests_in_window: state.requests.len(),
            cost_last_hour_usd: state.hourly_cost(),
            waiting: self.max_queue - self.queue.available_permits(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_requests: usize, max_cost: f64, max_queue: usize) -> RateLimitConfig {
        RateLimitConfig {
            enabled: true,
            max_requests_per_window: max_requests,
            window_secs: 60,
            max_cost_per_hour_usd: max_cost,
            max_queue_size: max_queue,
        }
    }

    #[tokio::test]
    async fn test_allows_requests_within_window() {
        let limiter = RateLimiter::new(&config(3, 10.0, 5));
        for _ in 0..3 {
            limiter.acquire().await.unwrap();
        }
        assert_eq!(limiter.stats().await.requests_in_window, 3);
    }

    #[tokio::test]
    async fn test_waits_for_window_to_slide() {
        let window = Duration::from_millis(80);
        let limiter = RateLimiter::with_window(&config(2, 10.0, 5), window);
        limiter.acquire().await.unwrap();
        limiter.acquire().await.unwrap();

        let started = std::time::Instant::now();
        limiter.acquire().await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn test_cost_budget_exhausted() {
        let limiter = RateLimiter::new(&config(10, 0.05, 5));
        limiter.acquire().await.unwrap();
        limiter.record_cost(0.06).await;

        let err = limiter.acquire().await.unwrap_err();
        assert!(matches!(err, BuddyError::RateLimited(ref m) if m.contains("budget")));
        assert!((limiter.stats().await.cost_last_hour_usd - 0.06).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_queue_full_fails_fast() {
        let limiter = Arc::new(RateLimiter::new(&config(1, 10.0, 1)));
        limiter.acquire().await.unwrap();

        // occupies the only queue ticket while waiting out the 60s window
        let waiter = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.acquire().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let err = limiter.acquire().await.unwrap_err();
        assert!(matches!(err, BuddyError::RateLimited(ref m) if m.contains("queue")));
        assert_eq!(limiter.stats().await.waiting, 1);
        waiter.abort();
    }
}
