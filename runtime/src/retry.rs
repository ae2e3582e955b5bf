//! Exponential backoff for connecting to the broker and the store.
//!
//! One [`RetryPolicy`] drives every dependency; the dependency supplies a
//! connection closure and [`connect_with_retry`] turns an exhausted budget
//! into a [`BootstrapError`].
//!
//! # Example
//!
//! ```rust
//! use parking_sim_runtime::retry::{RetryPolicy, connect_with_retry};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let policy = RetryPolicy::builder()
//!     .max_attempts(5)
//!     .initial_delay(Duration::from_millis(100))
//!     .max_delay(Duration::from_secs(10))
//!     .multiplier(2.0)
//!     .build();
//!
//! let client = connect_with_retry("redis", &policy, || async {
//!     Ok::<_, String>("connected")
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

/// A dependency could not be reached within the retry budget.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("could not connect to {dependency} after {attempts} attempts: {last_error}")]
pub struct BootstrapError {
    /// Name of the dependency (e.g. `"redpanda"`).
    pub dependency: String,
    /// Attempts made.
    pub attempts: usize,
    /// Error from the final attempt.
    pub last_error: String,
}

/// Retry policy configuration for exponential backoff.
///
/// # Default Values
///
/// - `max_attempts`: 5
/// - `initial_delay`: 2 seconds
/// - `max_delay`: 30 seconds
/// - `multiplier`: 2.0 (delay doubles each retry)
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: usize,
    /// Delay after the first failure
    pub initial_delay: Duration,
    /// Maximum delay between attempts (cap for exponential backoff)
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
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
            max_attempts: None,
            initial_delay: None,
            max_delay: None,
            multiplier: None,
        }
    }

    /// Delay to wait after the failed attempt numbered `attempt` (0-based).
    ///
    /// `initial_delay * multiplier^attempt`, capped at `max_delay`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return self.initial_delay.min(self.max_delay);
        }

        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay_secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);

        if !delay_secs.is_finite() || delay_secs >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(delay_secs.max(0.0))
        }
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    max_attempts: Option<usize>,
    initial_delay: Option<Duration>,
    max_delay: Option<Duration>,
    multiplier: Option<f64>,
}

impl RetryPolicyBuilder {
    /// Set total number of attempts. Values below 1 are treated as 1.
    #[must_use]
    pub const fn max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Set delay after the first failure.
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

    /// Build the [`RetryPolicy`].
    #[must_use]
    pub fn build(self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.unwrap_or(5).max(1),
            initial_delay: self.initial_delay.unwrap_or(Duration::from_secs(2)),
            max_delay: self.max_delay.unwrap_or(Duration::from_secs(30)),
            multiplier: self.multiplier.unwrap_or(2.0),
        }
    }
}

/// Retry an async operation with exponential backoff.
///
/// Calls `operation` up to `policy.max_attempts` times, sleeping
/// [`RetryPolicy::delay_for_attempt`] between failures. Returns the first
/// success or the error of the final attempt.
///
/// # Errors
///
/// Returns the last error once all attempts have failed.
pub async fn retry_with_backoff<F, Fut, T, E>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(err) => {
                if attempt + 1 >= policy.max_attempts {
                    tracing::error!(
                        attempts = attempt + 1,
                        error = %err,
                        "Operation failed after max attempts"
                    );
                    return Err(err);
                }

                let delay = policy.delay_for_attempt(attempt);
                tracing::warn!(
                    attempt,
                    delay_ms = delay.as_millis(),
                    error = %err,
                    "Operation failed, retrying..."
                );

                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Connect to a named dependency, retrying per `policy`.
///
/// # Errors
///
/// Returns [`BootstrapError`] carrying the last connection error once the
/// budget is exhausted. Callers treat this as fatal.
pub async fn connect_with_retry<F, Fut, T, E>(
    dependency: &str,
    policy: &RetryPolicy,
    connect: F,
) -> Result<T, BootstrapError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    tracing::info!(dependency, max_attempts = policy.max_attempts, "Connecting");

    let client = retry_with_backoff(policy, connect)
        .await
        .map_err(|err| BootstrapError {
            dependency: dependency.to_string(),
            attempts: policy.max_attempts,
            last_error: err.to_string(),
        })?;

    tracing::info!(dependency, "Connected");
    Ok(client)
}
