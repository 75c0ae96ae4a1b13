//! Timeout Helpers
//!
//! Wraps async operations with a deadline and a consistent timeout error.
//!
//! ## Usage
//!
//! ```ignore
//! use crate::ai::timeout::{dispatch_timeout, with_timeout};
//!
//! let limit = dispatch_timeout(options.timeout_ms, config.request_timeout_secs);
//! let raw = with_timeout(limit, analyzer.analyze_text(..), "chunk analysis").await?;
//! ```

use std::future::Future;
use std::time::Duration;

use crate::types::{BuddyError, Result};

/// Per-call dispatch deadline: the request option wins over the configured default
pub fn dispatch_timeout(timeout_ms: Option<u64>, default_secs: u64) -> Duration {
    timeout_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| Duration::from_secs(default_secs))
}

/// Execute an async operation with a timeout
///
/// Returns [`BuddyError::Timeout`] if the operation doesn't complete within
/// the specified duration.
pub async fn with_timeout<T, F>(timeout: Duration, future: F, operation_name: &str) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(BuddyError::timeout(operation_name, timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_timeout_prefers_option() {
        assert_eq!(dispatch_timeout(Some(1500), 120), Duration::from_millis(1500));
        assert_eq!(dispatch_timeout(None, 120), Duration::from_secs(120));
    }

    #[tokio::test]
    async fn test_with_timeout_success() {
        let result = with_timeout(
            Duration::from_secs(1),
            async { Ok::<_, BuddyError>(42) },
            "test operation",
        )
        .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_with_timeout_expires() {
        let result = with_timeout(
            Duration::from_millis(10),
            async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok::<_, BuddyError>(42)
            },
            "slow operation",
        )
        .await;
        let err = result.unwrap_err();
        assert!(matches!(err, BuddyError::Timeout { .. }));
        assert!(err.is_recoverable());
    }
}
