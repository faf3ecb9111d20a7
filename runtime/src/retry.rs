//! Retry logic with exponential backoff for handling transient failures.
//!
//! Used for optimistic-concurrency conflicts on shelf records and for
//! transient store or bus failures.
//!
//! # Example
//!
//! ```rust
//! use fulfillment_runtime::retry::{RetryPolicy, retry_with_backoff};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let policy = RetryPolicy::builder()
//!     .max_retries(5)
//!     .initial_delay(Duration::from_millis(10))
//!     .max_delay(Duration::from_millis(500))
//!     .multiplier(2.0)
//!     .jitter(0.5)
//!     .build();
//!
//! let result = retry_with_backoff(&policy, || async {
//!     Ok::<_, String>(42)
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::metrics::RetryMetrics;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Retry policy configuration for exponential backoff.
///
/// # Default Values
///
/// - `max_retries`: 3
/// - `initial_delay`: 100ms
/// - `max_delay`: 30 seconds
/// - `multiplier`: 2.0 (delay doubles each retry)
/// - `jitter`: 0.0 (no randomization)
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts
    pub max_retries: usize,
    /// Initial delay before first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries (cap for exponential backoff)
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
    /// Fraction of each delay that is randomized, in `0.0..=1.0`
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RetryPolicy {
    /// Create a new policy builder.
    #[must_use]
    pub const fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder {
            max_retries: None,
            initial_delay: None,
            max_delay: None,
            multiplier: None,
            jitter: None,
        }
    }

    /// Calculate the base delay for a given attempt number.
    ///
    /// Uses exponential backoff: `initial_delay * multiplier ^ attempt`,
    /// capped at `max_delay`.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_possible_wrap,
        clippy::cast_sign_loss
    )]
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return self.initial_delay.min(self.max_delay);
        }

        let exponent = attempt.min(i32::MAX as usize) as i32;
        let delay_ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let cap_ms = self.max_delay.as_millis() as f64;

        if !delay_ms.is_finite() || delay_ms >= cap_ms {
            self.max_delay
        } else {
            Duration::from_millis(delay_ms as u64)
        }
    }

    /// Delay for `attempt` with jitter applied.
    ///
    /// The result lies in `[base * (1 - jitter), base]`, so concurrent
    /// retriers spread out instead of colliding again.
    #[must_use]
    pub fn jittered_delay(&self, attempt: usize) -> Duration {
        let base = self.delay_for_attempt(attempt);
        if self.jitter <= 0.0 || base.is_zero() {
            return base;
        }
        let factor = rand::thread_rng().gen_range(0.0..=self.jitter.min(1.0));
        base.mul_f64(1.0 - factor)
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    max_retries: Option<usize>,
    initial_delay: Option<Duration>,
    max_delay: Option<Duration>,
    multiplier: Option<f64>,
    jitter: Option<f64>,
}

impl RetryPolicyBuilder {
    /// Set maximum number of retries.
    #[must_use]
    pub const fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Set initial delay before first retry.
    #[must_use]
    pub const fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = Some(delay);
        self
    }

    /// Set maximum delay (cap for exponential backoff).
    #[must_use]
    pub const fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Set multiplier for exponential backoff.
    #[must_use]
    pub const fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier);
        self
    }

    /// Set the randomized fraction of each delay (clamped to `0.0..=1.0`).
    #[must_use]
    pub const fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = Some(jitter);
        self
    }

    /// Build the [`RetryPolicy`].
    #[must_use]
    pub fn build(self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries.unwrap_or(3),
            initial_delay: self.initial_delay.unwrap_or(Duration::from_millis(100)),
            max_delay: self.max_delay.unwrap_or(Duration::from_secs(30)),
            multiplier: self.multiplier.unwrap_or(2.0),
            jitter: self.jitter.unwrap_or(0.0).clamp(0.0, 1.0),
        }
    }
}

/// Retry an async operation with exponential backoff.
///
/// Returns the first success, or the last error once `max_retries` retries
/// have failed.
///
/// # Errors
///
/// Returns the error of the final attempt.
pub async fn retry_with_backoff<F, Fut, T, E>(policy: &RetryPolicy, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    retry_with_predicate(policy, operation, |_| true).await
}

/// Retry an async operation while `is_retryable` accepts its errors.
///
/// # Errors
///
/// Returns a non-retryable error immediately, or the error of the final
/// attempt once retries are exhausted.
pub async fn retry_with_predicate<F, Fut, T, E, P>(
    policy: &RetryPolicy,
    mut operation: F,
    is_retryable: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    RetryMetrics::record_success();
                    tracing::info!(attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(err) => {
                if !is_retryable(&err) {
                    tracing::debug!(error = %err, "Error is not retryable, failing immediately");
                    return Err(err);
                }

                if attempt >= policy.max_retries {
                    RetryMetrics::record_exhausted();
                    tracing::error!(attempt, error = %err, "Operation failed after max retries");
                    return Err(err);
                }

                let delay = policy.jittered_delay(attempt);
                RetryMetrics::record_attempt();
                tracing::warn!(
                    attempt,
                    delay_ms = delay.as_millis(),
                    error = %err,
                    "Operation failed, retrying"
                );

                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fulfillment_core::error::{ResourceType, StoreError};

    fn conflict(expected_version: i64) -> StoreError {
        StoreError::Conflict {
            resource: ResourceType::ShelfItem,
            id: 1,
            expected_version,
        }
    }

    fn fast(max_retries: usize) -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(max_retries)
            .initial_delay(Duration::from_millis(1))
            .build()
    }

    #[test]
    fn backoff_doubles_then_caps() {
        let policy = RetryPolicy::builder()
            .initial_delay(Duration::from_millis(10))
            .max_delay(Duration::from_millis(50))
            .build();

        let delays: Vec<_> = (0..5).map(|n| policy.delay_for_attempt(n)).collect();
        assert_eq!(
            delays,
            [10, 20, 40, 50, 50].map(Duration::from_millis).to_vec()
        );
        assert_eq!(policy.delay_for_attempt(usize::MAX), Duration::from_millis(50));
    }

    #[test]
    fn jittered_delay_never_exceeds_base() {
        let policy = RetryPolicy::builder()
            .initial_delay(Duration::from_millis(40))
            .jitter(0.25)
            .build();

        for _ in 0..50 {
            let delay = policy.jittered_delay(0);
            assert!((Duration::from_millis(29)..=Duration::from_millis(40)).contains(&delay));
        }
        assert!((RetryPolicy::builder().jitter(-1.0).build().jitter).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn conflicts_are_retried_until_the_write_lands() {
        let mut versions_seen = Vec::new();
        let mut version = 0;

        let result = retry_with_backoff(&fast(5), || {
            version += 1;
            versions_seen.push(version);
            let outcome = if version < 3 { Err(conflict(version)) } else { Ok(version) };
            async move { outcome }
        })
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(versions_seen, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn exhausted_retries_return_the_last_conflict() {
        let mut attempts = 0;

        let result: Result<(), _> = retry_with_backoff(&fast(2), || {
            attempts += 1;
            let error = conflict(attempts);
            async move { Err(error) }
        })
        .await;

        assert_eq!(result, Err(conflict(3)));
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn predicate_stops_on_unavailable_store() {
        let mut attempts = 0;

        let result: Result<(), _> = retry_with_predicate(
            &fast(5),
            || {
                attempts += 1;
                async { Err(StoreError::Unavailable("connection refused".into())) }
            },
            |e| matches!(e, StoreError::Conflict { .. }),
        )
        .await;

        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        assert_eq!(attempts, 1);
    }
}
