//! Retry with exponential backoff for provider sends.
//!
//! A failed send is retried only for retryable errors (rate limits,
//! 5xx, network timeouts) and only until `max_retries` is exhausted.
//! Cancellation is honored both between attempts and during the
//! backoff sleep.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::provider::ProviderError;

/// Default maximum retries.
pub const DEFAULT_MAX_RETRIES: u32 = 5;
/// Default base delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
/// Default maximum delay in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 60_000;
/// Default jitter factor (0.0-1.0).
pub const DEFAULT_JITTER_FACTOR: f64 = 0.2;

/// Configuration for retry logic.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 5).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay for exponential backoff in ms (default: 1000).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Maximum delay between retries in ms (default: 60000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Jitter factor 0.0-1.0 (default: 0.2).
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}
fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}
fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY_MS
}
fn default_jitter_factor() -> f64 {
    DEFAULT_JITTER_FACTOR
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }
}

/// Calculate exponential backoff delay with jitter.
///
/// Formula: `min(max_delay, base_delay * 2^attempt) * (1 + jitter)`.
/// The jitter term is the full jitter range, keeping the delay
/// deterministic and always at least the capped exponential value.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn calculate_backoff_delay(
    attempt: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    jitter_factor: f64,
) -> u64 {
    let exponential = base_delay_ms.saturating_mul(1u64 << attempt.min(31));
    let capped = exponential.min(max_delay_ms);
    let with_jitter = (capped as f64) * (1.0 + jitter_factor);
    with_jitter.round() as u64
}

/// Parse a `Retry-After` HTTP header value.
///
/// Accepts either a number of seconds or an HTTP-date. Returns the
/// delay in milliseconds, or `None` if parsing fails.
#[must_use]
pub fn parse_retry_after_header(value: &str) -> Option<u64> {
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(seconds * 1000);
    }

    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value) {
        let delay_ms = date
            .signed_duration_since(chrono::Utc::now())
            .num_milliseconds();
        #[allow(clippy::cast_sign_loss)]
        return Some(if delay_ms > 0 { delay_ms as u64 } else { 0 });
    }

    None
}

/// Run a send operation with retry.
///
/// `op` is called once per attempt. Non-retryable errors and retry
/// exhaustion return the last error. The delay between attempts is the
/// larger of the computed backoff and the provider's `Retry-After`
/// hint. Cancelling `cancel` returns [`ProviderError::Cancelled`]
/// without waiting out the current backoff.
pub async fn send_with_retry<T, F, Fut>(
    op: F,
    config: &RetryConfig,
    cancel: &CancellationToken,
) -> Result<T, ProviderError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }

        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.is_retryable() || attempt >= config.max_retries {
                    return Err(err);
                }

                attempt += 1;
                let backoff_ms = calculate_backoff_delay(
                    attempt,
                    config.base_delay_ms,
                    config.max_delay_ms,
                    config.jitter_factor,
                );
                // Respect Retry-After if present (use the larger value)
                let delay_ms = err.retry_after_ms().map_or(backoff_ms, |ra| backoff_ms.max(ra));

                warn!(
                    attempt,
                    max_retries = config.max_retries,
                    delay_ms,
                    category = err.category(),
                    error = %err,
                    "provider send failed, retrying"
                );

                tokio::select! {
                    () = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
                    () = cancel.cancelled() => {
                        debug!(attempt, "retry wait cancelled");
                        return Err(ProviderError::Cancelled);
                    }
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn quick_config() -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            base_delay_ms: 1,
            max_delay_ms: 10,
            jitter_factor: 0.0,
        }
    }

    fn retryable_error() -> ProviderError {
        ProviderError::Api {
            status: 500,
            message: "Server error".into(),
            retryable: true,
        }
    }

    #[test]
    fn config_defaults() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.base_delay_ms, 1000);
        assert_eq!(config.max_delay_ms, 60_000);
        assert!((config.jitter_factor - 0.2).abs() < f64::EPSILON);
    }

    #[test]
    fn config_serde_defaults() {
        let config: RetryConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.base_delay_ms, 1000);
    }

    #[test]
    fn backoff_exponential_growth() {
        assert_eq!(calculate_backoff_delay(0, 1000, 60_000, 0.0), 1000);
        assert_eq!(calculate_backoff_delay(1, 1000, 60_000, 0.0), 2000);
        assert_eq!(calculate_backoff_delay(2, 1000, 60_000, 0.0), 4000);
        assert_eq!(calculate_backoff_delay(3, 1000, 60_000, 0.0), 8000);
    }

    #[test]
    fn backoff_caps_at_max() {
        assert_eq!(calculate_backoff_delay(10, 1000, 60_000, 0.0), 60_000);
    }

    #[test]
    fn backoff_high_attempt_no_overflow() {
        let delay = calculate_backoff_delay(100, 1000, 60_000, 0.2);
        assert!(delay > 0);
        assert!(delay <= 72_000);
    }

    #[test]
    fn parse_retry_after_seconds() {
        assert_eq!(parse_retry_after_header("120"), Some(120_000));
        assert_eq!(parse_retry_after_header("0"), Some(0));
    }

    #[test]
    fn parse_retry_after_invalid() {
        assert_eq!(parse_retry_after_header("not-a-number"), None);
        assert_eq!(parse_retry_after_header(""), None);
    }

    #[test]
    fn parse_retry_after_past_date() {
        use chrono::{TimeZone, Utc};
        let past = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap().to_rfc2822();
        assert_eq!(parse_retry_after_header(&past), Some(0));
    }

    #[tokio::test]
    async fn succeeds_without_retry() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let result = send_with_retry(
            move || {
                let counter = counter.clone();
                async move {
                    let _ = counter.fetch_add(1, Ordering::SeqCst);
                    Ok(42u32)
                }
            },
            &quick_config(),
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let result = send_with_retry(
            move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(retryable_error())
                    } else {
                        Ok("ok")
                    }
                }
            },
            &quick_config(),
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_retries() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let result: Result<(), _> = send_with_retry(
            move || {
                let counter = counter.clone();
                async move {
                    let _ = counter.fetch_add(1, Ordering::SeqCst);
                    Err(retryable_error())
                }
            },
            &quick_config(),
            &CancellationToken::new(),
        )
        .await;
        assert!(matches!(result, Err(ProviderError::Api { status: 500, .. })));
        // Initial attempt plus 3 retries
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn non_retryable_fails_immediately() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let result: Result<(), _> = send_with_retry(
            move || {
                let counter = counter.clone();
                async move {
                    let _ = counter.fetch_add(1, Ordering::SeqCst);
                    Err(ProviderError::Auth {
                        message: "Invalid API key".into(),
                    })
                }
            },
            &quick_config(),
            &CancellationToken::new(),
        )
        .await;
        assert!(matches!(result, Err(ProviderError::Auth { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_aborts_backoff_wait() {
        let token = CancellationToken::new();
        let config = RetryConfig {
            max_retries: 5,
            base_delay_ms: 10_000,
            max_delay_ms: 60_000,
            jitter_factor: 0.0,
        };

        let cancel = token.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });

        let result: Result<(), _> = send_with_retry(
            || async { Err(retryable_error()) },
            &config,
            &token,
        )
        .await;
        assert!(matches!(result, Err(ProviderError::Cancelled)));
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn already_cancelled_skips_op() {
        let token = CancellationToken::new();
        token.cancel();
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let result: Result<(), _> = send_with_retry(
            move || {
                let counter = counter.clone();
                async move {
                    let _ = counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            },
            &quick_config(),
            &token,
        )
        .await;
        assert!(matches!(result, Err(ProviderError::Cancelled)));
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn respects_retry_after_hint() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let start = tokio::time::Instant::now();
        let result = send_with_retry(
            move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(ProviderError::RateLimited {
                            retry_after_ms: 50,
                            message: "Rate limited".into(),
                        })
                    } else {
                        Ok(())
                    }
                }
            },
            &quick_config(),
            &CancellationToken::new(),
        )
        .await;
        assert!(result.is_ok());
        assert!(start.elapsed().as_millis() >= 50);
    }
}
