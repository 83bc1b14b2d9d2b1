//! Classification-aware retry with exponential backoff.
//!
//! Provider calls (speech recognition, language-model inference, speech
//! synthesis) are the system's only externally-fallible operations, and
//! they all go through this module.
//!
//! Policy per [`ErrorClass`]:
//! - `Transient`         — retry up to `max_retries` with backoff + jitter
//! - `ResourceExhausted` — returned to the caller, who may make one
//!   degraded-configuration attempt (see [`crate::fallback`])
//! - `Permanent`         — fail immediately

use sotto_core::error::{Classify, ErrorClass};
use std::future::Future;
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

/// Retry policy for provider calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts after the initial call
    pub max_retries: u32,
    /// Base delay between retries (doubles each attempt)
    pub base_delay: Duration,
    /// Maximum delay cap
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries — useful for tests and fail-fast paths.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }
}

/// Compute the delay before the next retry attempt.
///
/// When `retry_after` is provided (e.g. from a rate-limit response), that
/// value is used directly but capped at `policy.max_delay`. Otherwise the
/// delay follows exponential backoff:
/// `min(base_delay * 2^attempt + jitter, max_delay)`.
///
/// Jitter is 0-25% of the computed delay, derived from the subsecond nanos
/// of the system clock rather than a random number generator.
#[must_use]
pub fn delay_for_attempt(
    policy: &RetryPolicy,
    attempt: u32,
    retry_after: Option<Duration>,
) -> Duration {
    if let Some(ra) = retry_after {
        return ra.min(policy.max_delay);
    }

    let base = policy
        .base_delay
        .saturating_mul(2u32.saturating_pow(attempt));
    let base = base.min(policy.max_delay);

    let jitter_nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();

    // Scale to 0-25% of the base delay
    let jitter_fraction = (jitter_nanos % 250) as f64 / 1000.0;
    let jitter = base.mul_f64(jitter_fraction);

    (base + jitter).min(policy.max_delay)
}

/// Extract a provider-suggested wait from an error, if it carries one.
fn retry_after_hint<E: Classify>(error: &E) -> Option<Duration>
where
    E: std::fmt::Display,
{
    // Rate-limit errors encode "retry after Ns" in their display text;
    // anything else gets plain backoff. Parsing the display string keeps
    // this generic over error types without widening the Classify trait.
    let text = error.to_string();
    let after = text.split("retry after ").nth(1)?;
    let secs: u64 = after.trim_end_matches('s').parse().ok()?;
    Some(Duration::from_secs(secs))
}

/// Run `op`, retrying transient failures with exponential backoff.
///
/// Guarantees: with a stub that fails transiently exactly R times then
/// succeeds, `max_retries >= R` succeeds after exactly R+1 underlying calls;
/// `max_retries < R` fails after exactly `max_retries + 1` calls. Permanent
/// and resource-exhausted failures are returned without any retry.
pub async fn call_with_resilience<T, E, F, Fut>(
    policy: &RetryPolicy,
    mut op: F,
) -> std::result::Result<T, E>
where
    E: Classify + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
{
    let mut attempt: u32 = 0;

    loop {
        match op().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(attempt = attempt + 1, "Provider call recovered after retry");
                }
                return Ok(value);
            }
            Err(e) => match e.classify() {
                ErrorClass::Permanent => {
                    debug!(error = %e, "Permanent provider failure, not retrying");
                    return Err(e);
                }
                ErrorClass::ResourceExhausted => {
                    debug!(error = %e, "Provider out of capacity, deferring to fallback");
                    return Err(e);
                }
                ErrorClass::Transient => {
                    if attempt >= policy.max_retries {
                        warn!(
                            attempts = attempt + 1,
                            error = %e,
                            "Transient provider failure, retries exhausted"
                        );
                        return Err(e);
                    }
                    let delay = delay_for_attempt(policy, attempt, retry_after_hint(&e));
                    warn!(
                        attempt = attempt + 1,
                        max = policy.max_retries + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient provider failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sotto_core::error::ProviderError;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    /// An operation that fails transiently `failures` times, then succeeds.
    fn flaky_op(
        calls: Arc<AtomicU32>,
        failures: u32,
    ) -> impl FnMut() -> std::pin::Pin<
        Box<dyn Future<Output = Result<&'static str, ProviderError>> + Send>,
    > {
        move || {
            let calls = calls.clone();
            Box::pin(async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < failures {
                    Err(ProviderError::Network("connection reset".into()))
                } else {
                    Ok("done")
                }
            })
        }
    }

    #[tokio::test]
    async fn succeeds_after_exact_retry_count() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = call_with_resilience(&fast_policy(3), flaky_op(calls.clone(), 2)).await;

        assert_eq!(result.unwrap(), "done");
        // 2 failures + 1 success
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fails_after_max_retries_plus_one_calls() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = call_with_resilience(&fast_policy(2), flaky_op(calls.clone(), 10)).await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3); // max_retries + 1
    }

    #[tokio::test]
    async fn permanent_error_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let result: Result<(), ProviderError> = call_with_resilience(&fast_policy(5), move || {
            let calls = calls2.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::AuthenticationFailed("bad key".into()))
            })
                as std::pin::Pin<Box<dyn Future<Output = Result<(), ProviderError>> + Send>>
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn resource_exhaustion_returned_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let result: Result<(), ProviderError> = call_with_resilience(&fast_policy(5), move || {
            let calls = calls2.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::ResourceExhausted("model too large".into()))
            })
                as std::pin::Pin<Box<dyn Future<Output = Result<(), ProviderError>> + Send>>
        })
        .await;

        assert!(matches!(
            result.unwrap_err(),
            ProviderError::ResourceExhausted(_)
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn exponential_growth() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(60),
        };

        let d0 = delay_for_attempt(&policy, 0, None);
        let d1 = delay_for_attempt(&policy, 1, None);
        let d2 = delay_for_attempt(&policy, 2, None);

        // Each attempt's base doubles; jitter adds up to 25%
        assert!(d0 >= Duration::from_millis(100), "attempt 0: {d0:?}");
        assert!(d1 >= Duration::from_millis(200), "attempt 1: {d1:?}");
        assert!(d2 >= Duration::from_millis(400), "attempt 2: {d2:?}");
    }

    #[test]
    fn delay_capped_at_max() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(15),
        };
        let d = delay_for_attempt(&policy, 3, None);
        assert!(d <= policy.max_delay, "delay {d:?} exceeds max");
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(60),
        };
        for _ in 0..50 {
            let d = delay_for_attempt(&policy, 0, None);
            assert!(d >= Duration::from_millis(1000), "below base: {d:?}");
            assert!(d <= Duration::from_millis(1250), "above 125%: {d:?}");
        }
    }

    #[test]
    fn respects_retry_after() {
        let policy = RetryPolicy::default();
        let ra = Duration::from_secs(10);
        assert_eq!(delay_for_attempt(&policy, 0, Some(ra)), ra);
    }

    #[test]
    fn caps_retry_after_at_max_delay() {
        let policy = RetryPolicy {
            max_delay: Duration::from_secs(5),
            ..RetryPolicy::default()
        };
        let ra = Duration::from_secs(60);
        assert_eq!(delay_for_attempt(&policy, 0, Some(ra)), policy.max_delay);
    }

    #[test]
    fn rate_limit_hint_parsed_from_error() {
        let err = ProviderError::RateLimited { retry_after_secs: 7 };
        assert_eq!(retry_after_hint(&err), Some(Duration::from_secs(7)));

        let err = ProviderError::Network("down".into());
        assert_eq!(retry_after_hint(&err), None);
    }
}
