//! Transient-error retry combinator.
//!
//! Connection-class back-end failures (SQLite busy/locked, unreachable
//! database file) are re-attempted on a fixed 1 s / 3 s / 5 s schedule:
//! three retries after the initial attempt. Any other error aborts
//! immediately. The sleeps are ordinary await points, so aborting the owning
//! task cancels a retry loop between attempts.

use crate::error::{Result, StorageError};
use std::time::Duration;

/// Backoff schedule applied after the initial failed attempt.
pub const RETRY_DELAYS: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(3),
    Duration::from_secs(5),
];

/// Runs `op`, retrying on transient errors per [`RETRY_DELAYS`].
///
/// `op` must be idempotent at the logical level: the same upsert re-issued
/// after a busy database produces the same durable state.
pub async fn with_retry<T>(mut op: impl FnMut() -> Result<T>) -> Result<T> {
    let mut last = match op() {
        Ok(v) => return Ok(v),
        Err(e) if e.is_transient() => e,
        Err(e) => return Err(e),
    };

    for (attempt, delay) in RETRY_DELAYS.iter().enumerate() {
        tracing::warn!(
            attempt = attempt + 1,
            delay_secs = delay.as_secs(),
            error = %last,
            "transient storage error, retrying"
        );
        tokio::time::sleep(*delay).await;
        match op() {
            Ok(v) => return Ok(v),
            Err(e) if e.is_transient() => last = e,
            Err(e) => return Err(e),
        }
    }

    Err(last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn transient() -> StorageError {
        StorageError::Transient("connection refused".to_string())
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_two_transient_failures() {
        let calls = AtomicUsize::new(0);
        let start = tokio::time::Instant::now();

        let out = with_retry(|| {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(transient())
            } else {
                Ok(42)
            }
        })
        .await
        .unwrap();

        assert_eq!(out, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1 s + 3 s of schedule elapsed before the third attempt
        assert!(start.elapsed() >= Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn surfaces_error_after_exhaustion() {
        let calls = AtomicUsize::new(0);

        let err = with_retry(|| -> Result<()> {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(transient())
        })
        .await
        .unwrap_err();

        assert!(err.is_transient());
        // initial attempt plus three retries
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn fatal_error_is_not_retried() {
        let calls = AtomicUsize::new(0);

        let err = with_retry(|| -> Result<()> {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StorageError::Other("schema mismatch".to_string()))
        })
        .await
        .unwrap_err();

        assert!(!err.is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
