//! Retry with exponential back-off and jitter for transient crawl errors.
//!
//! Blocked responses are deliberately NOT retried here — blocking means the
//! current session identity is burned, so the caller must rotate identity and
//! re-acquire tokens before trying again.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::error::CrawlError;

/// Returns `true` for errors worth retrying after a back-off delay.
///
/// **Retriable:**
/// - Network-level failures: timeout, connection reset.
/// - HTTP 5xx: transient server trouble.
/// - HTTP 429: the target asked us to slow down.
/// - Page-level parse failures: often a truncated or interstitial response;
///   a refetch usually yields the real document.
///
/// **Not retriable (handled elsewhere or hard stop):**
/// - [`CrawlError::Blocked`] — needs an identity/token refresh, not a retry.
/// - Non-5xx unexpected statuses — retrying returns the same result.
/// - [`CrawlError::Validation`] — data issue; retrying won't fix it.
pub(crate) fn is_retriable(err: &CrawlError) -> bool {
    match err {
        CrawlError::Http(e) => {
            e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
        }
        CrawlError::RateLimited { .. } | CrawlError::Parse { .. } => true,
        CrawlError::UnexpectedStatus { status, .. } => (500..=599).contains(status),
        CrawlError::Blocked { .. } | CrawlError::Validation(_) => false,
    }
}

/// Runs `operation` with up to `max_retries` additional attempts on transient
/// errors, bumping `retry_counter` once per retry.
///
/// Back-off schedule with `backoff_base_ms = 500`:
///
/// | Retry | Sleep before attempt        |
/// |-------|-----------------------------|
/// | 1     | 500 ms × 2⁰ ± 25 % jitter   |
/// | 2     | 500 ms × 2¹ ± 25 % jitter   |
/// | 3     | 500 ms × 2² ± 25 % jitter   |
///
/// Delay is capped at 60 s. Non-retriable errors are returned immediately.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_ms: u64,
    retry_counter: &AtomicU64,
    mut operation: F,
) -> Result<T, CrawlError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CrawlError>>,
{
    const MAX_DELAY_MS: u64 = 60_000;
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retriable(&err) || attempt >= max_retries {
                    return Err(err);
                }
                attempt += 1;
                retry_counter.fetch_add(1, Ordering::Relaxed);
                let computed = backoff_base_ms.saturating_mul(1u64 << (attempt - 1).min(10));
                let capped = computed.min(MAX_DELAY_MS);
                #[allow(
                    clippy::cast_possible_truncation,
                    clippy::cast_sign_loss,
                    clippy::cast_precision_loss
                )]
                let delay_ms = (capped as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
                tracing::warn!(
                    attempt,
                    max_retries,
                    delay_ms,
                    error = %err,
                    "transient crawl error — retrying after back-off"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;

    fn rate_limited() -> CrawlError {
        CrawlError::RateLimited {
            url: "https://target.example.com/prolist".to_string(),
            retry_after_secs: 0,
        }
    }

    fn blocked() -> CrawlError {
        CrawlError::Blocked {
            url: "https://target.example.com/prolist".to_string(),
            reason: "HTTP 403".to_string(),
        }
    }

    #[tokio::test]
    async fn succeeds_immediately_on_first_try() {
        let calls = Arc::new(AtomicU32::new(0));
        let retries = AtomicU64::new(0);
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(3, 0, &retries, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<u32, CrawlError>(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(retries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn retries_transient_errors_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let retries = AtomicU64::new(0);
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(3, 0, &retries, || {
            let c = Arc::clone(&c);
            async move {
                let n = c.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(rate_limited())
                } else {
                    Ok::<u32, CrawlError>(99)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 99);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(retries.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn propagates_last_error_after_exhausting_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let retries = AtomicU64::new(0);
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(2, 0, &retries, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, CrawlError>(rate_limited())
            }
        })
        .await;
        // max_retries=2 → 3 total attempts
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(result, Err(CrawlError::RateLimited { .. })));
    }

    #[tokio::test]
    async fn does_not_retry_blocked() {
        let calls = Arc::new(AtomicU32::new(0));
        let retries = AtomicU64::new(0);
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(3, 0, &retries, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, CrawlError>(blocked())
            }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(retries.load(Ordering::SeqCst), 0);
        assert!(matches!(result, Err(CrawlError::Blocked { .. })));
    }

    #[tokio::test]
    async fn retries_parse_errors_as_page_level_transients() {
        let calls = Arc::new(AtomicU32::new(0));
        let retries = AtomicU64::new(0);
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(1, 0, &retries, || {
            let c = Arc::clone(&c);
            async move {
                let n = c.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    Err(CrawlError::Parse {
                        context: "search page".to_string(),
                        reason: "truncated document".to_string(),
                    })
                } else {
                    Ok::<u32, CrawlError>(7)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn server_errors_are_retriable_client_errors_are_not() {
        assert!(is_retriable(&CrawlError::UnexpectedStatus {
            status: 503,
            url: "u".to_string()
        }));
        assert!(!is_retriable(&CrawlError::UnexpectedStatus {
            status: 404,
            url: "u".to_string()
        }));
    }
}
