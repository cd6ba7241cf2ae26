//! # Retry Engine
//!
//! [`retry`] wraps any asynchronous operation with bounded attempts, multiplicative
//! backoff and an optional per-attempt timeout. It knows nothing about what the
//! operation does: only whether it succeeded, failed (and if so whether the error is
//! [`Retryable`]), or ran out of time.
//!
//! ```text
//! attempt 0 ──fail──▶ sleep(initial) ──▶ attempt 1 ──fail──▶ sleep(initial × f) ──▶ ...
//!                                                     last attempt fails ──▶ Err(last error)
//! ```
//!
//! The last error is returned verbatim so the caller decides how to classify it.

use crate::framework::error::Retryable;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Rejected retry policy parameters.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
#[error("invalid retry policy: {0}")]
pub struct InvalidRetryPolicy(pub String);

/// Immutable retry parameters attached to a step kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRetryPolicy", into = "RawRetryPolicy")]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff_factor: f64,
    initial_delay: Duration,
    timeout: Option<Duration>,
}

impl RetryPolicy {
    /// Builds a validated policy.
    ///
    /// `max_attempts >= 1`, `backoff_factor >= 1.0`, and a timeout, when given, must be non-zero.
    pub fn new(
        max_attempts: u32,
        backoff_factor: f64,
        initial_delay: Duration,
        timeout: Option<Duration>,
    ) -> Result<Self, InvalidRetryPolicy> {
        if max_attempts == 0 {
            return Err(InvalidRetryPolicy("max_attempts must be at least 1".into()));
        }
        if !backoff_factor.is_finite() || backoff_factor < 1.0 {
            return Err(InvalidRetryPolicy(format!(
                "backoff_factor must be >= 1.0, got {backoff_factor}"
            )));
        }
        if matches!(timeout, Some(t) if t.is_zero()) {
            return Err(InvalidRetryPolicy("timeout must be greater than 0".into()));
        }
        Ok(Self {
            max_attempts,
            backoff_factor,
            initial_delay,
            timeout,
        })
    }

    /// Known-good presets used for configuration defaults.
    pub(crate) const fn preset(
        max_attempts: u32,
        backoff_factor: f64,
        initial_delay_ms: u64,
        timeout_ms: Option<u64>,
    ) -> Self {
        let timeout = match timeout_ms {
            Some(ms) => Some(Duration::from_millis(ms)),
            None => None,
        };
        Self {
            max_attempts,
            backoff_factor,
            initial_delay: Duration::from_millis(initial_delay_ms),
            timeout,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff_factor(&self) -> f64 {
        self.backoff_factor
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Same policy without the per-attempt timeout.
    ///
    /// Used where the timeout is handed to the operation itself instead of bounding
    /// the whole attempt (the work-dispatch acknowledgment deadline).
    pub fn without_timeout(&self) -> Self {
        Self {
            timeout: None,
            ..self.clone()
        }
    }

    /// Delay slept after failed attempt `attempt` (0-based): `initial × factor^attempt`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::preset(3, 2.0, 1_000, None)
    }
}

/// Wire form of [`RetryPolicy`]: durations as seconds, as they appear in YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRetryPolicy {
    #[serde(default = "RawRetryPolicy::default_max_attempts")]
    max_attempts: u32,
    #[serde(default = "RawRetryPolicy::default_backoff_factor")]
    backoff_factor: f64,
    #[serde(default = "RawRetryPolicy::default_initial_delay")]
    initial_delay: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timeout: Option<f64>,
}

impl RawRetryPolicy {
    fn default_max_attempts() -> u32 {
        3
    }
    fn default_backoff_factor() -> f64 {
        2.0
    }
    fn default_initial_delay() -> f64 {
        1.0
    }
}

impl TryFrom<RawRetryPolicy> for RetryPolicy {
    type Error = InvalidRetryPolicy;

    fn try_from(raw: RawRetryPolicy) -> Result<Self, Self::Error> {
        let initial_delay = Duration::try_from_secs_f64(raw.initial_delay).map_err(|_| {
            InvalidRetryPolicy(format!("initial_delay must be >= 0, got {}", raw.initial_delay))
        })?;
        let timeout = raw
            .timeout
            .map(|t| {
                Duration::try_from_secs_f64(t)
                    .map_err(|_| InvalidRetryPolicy(format!("timeout must be > 0, got {t}")))
            })
            .transpose()?;
        RetryPolicy::new(raw.max_attempts, raw.backoff_factor, initial_delay, timeout)
    }
}

impl From<RetryPolicy> for RawRetryPolicy {
    fn from(policy: RetryPolicy) -> Self {
        Self {
            max_attempts: policy.max_attempts,
            backoff_factor: policy.backoff_factor,
            initial_delay: policy.initial_delay.as_secs_f64(),
            timeout: policy.timeout.map(|t| t.as_secs_f64()),
        }
    }
}

/// Runs `operation` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are used up.
///
/// Each attempt is bounded by the policy timeout when one is set; an elapsed timeout
/// counts as a failed attempt. Attempts are numbered from 0 and the delay after a failed
/// attempt `i` is [`RetryPolicy::delay_after`]`(i)`.
pub async fn retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut attempt_fn: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let mut attempt: u32 = 0;
    loop {
        let outcome = match policy.timeout {
            Some(limit) => match tokio::time::timeout(limit, attempt_fn()).await {
                Ok(result) => result,
                Err(_) => Err(E::attempt_timed_out(operation, limit)),
            },
            None => attempt_fn().await,
        };

        match outcome {
            Ok(value) => {
                if attempt > 0 {
                    debug!(operation, attempts = attempt + 1, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if !e.is_retryable() => {
                warn!(operation, attempt = attempt + 1, error = %e, "Non-retryable failure");
                return Err(e);
            }
            Err(e) if attempt + 1 >= policy.max_attempts => {
                error!(operation, attempts = attempt + 1, error = %e, "Retries exhausted");
                return Err(e);
            }
            Err(e) => {
                let delay = policy.delay_after(attempt);
                warn!(
                    operation,
                    attempt = attempt + 1,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Attempt failed, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::error::{StepError, TransportError};
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tokio::time::Instant;

    fn failing(attempt: usize) -> StepError {
        StepError::Transport(TransportError::remote("test", format!("attempt {attempt}")))
    }

    #[test]
    fn policy_validation() {
        assert!(RetryPolicy::new(0, 2.0, Duration::ZERO, None).is_err());
        assert!(RetryPolicy::new(3, 0.5, Duration::ZERO, None).is_err());
        assert!(RetryPolicy::new(3, 1.0, Duration::ZERO, Some(Duration::ZERO)).is_err());
        assert!(RetryPolicy::new(1, 1.0, Duration::ZERO, None).is_ok());
    }

    #[test]
    fn delays_grow_geometrically() {
        let policy = RetryPolicy::new(5, 1.5, Duration::from_millis(500), None).unwrap();
        assert_eq!(policy.delay_after(0), Duration::from_millis(500));
        assert_eq!(policy.delay_after(1), Duration::from_millis(750));
        assert_eq!(policy.delay_after(2), Duration::from_millis(1125));
    }

    #[test]
    fn policy_parses_from_seconds() {
        let yaml = "{max_attempts: 5, backoff_factor: 1.5, initial_delay: 0.5, timeout: 10.0}";
        let policy: RetryPolicy = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(policy.max_attempts(), 5);
        assert_eq!(policy.initial_delay(), Duration::from_millis(500));
        assert_eq!(policy.timeout(), Some(Duration::from_secs(10)));

        let bad: Result<RetryPolicy, _> = serde_yaml::from_str("{max_attempts: 0}");
        assert!(bad.is_err());
        let negative: Result<RetryPolicy, _> = serde_yaml::from_str("{initial_delay: -1.0}");
        assert!(negative.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_runs_every_attempt_and_returns_last_error() {
        let policy = RetryPolicy::new(4, 2.0, Duration::from_millis(100), None).unwrap();
        let stamps = Arc::new(Mutex::new(Vec::new()));

        let recorder = stamps.clone();
        let result: Result<(), StepError> = retry(&policy, "always_fails", || {
            let recorder = recorder.clone();
            async move {
                let mut stamps = recorder.lock();
                stamps.push(Instant::now());
                Err(failing(stamps.len()))
            }
        })
        .await;

        assert_eq!(result, Err(failing(4)));
        let stamps = stamps.lock();
        assert_eq!(stamps.len(), 4);
        for i in 1..stamps.len() {
            let gap = stamps[i] - stamps[i - 1];
            assert_eq!(gap, policy.delay_after(i as u32 - 1), "delay before attempt {i}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn success_on_third_attempt_stops_immediately() {
        let policy = RetryPolicy::new(5, 1.5, Duration::from_millis(500), None).unwrap();
        let calls = Arc::new(Mutex::new(0usize));
        let started = Instant::now();

        let counter = calls.clone();
        let value = retry(&policy, "flaky", || {
            let counter = counter.clone();
            async move {
                let mut calls = counter.lock();
                *calls += 1;
                if *calls < 3 {
                    Err(failing(*calls))
                } else {
                    Ok("done")
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(value, "done");
        assert_eq!(*calls.lock(), 3);
        assert_eq!(started.elapsed(), Duration::from_millis(500 + 750));
    }

    #[tokio::test(start_paused = true)]
    async fn validation_errors_are_not_retried() {
        let policy = RetryPolicy::new(5, 1.0, Duration::from_secs(1), None).unwrap();
        let calls = Arc::new(Mutex::new(0usize));

        let counter = calls.clone();
        let result: Result<(), StepError> = retry(&policy, "bad_request", || {
            let counter = counter.clone();
            async move {
                *counter.lock() += 1;
                Err(StepError::Validation("unknown sound".into()))
            }
        })
        .await;

        assert!(matches!(result, Err(StepError::Validation(_))));
        assert_eq!(*calls.lock(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_timeout_consumes_an_attempt() {
        let timeout = Some(Duration::from_secs(3));
        let policy = RetryPolicy::new(2, 1.0, Duration::from_millis(10), timeout).unwrap();
        let calls = Arc::new(Mutex::new(0usize));

        let counter = calls.clone();
        let result: Result<(), StepError> = retry(&policy, "hangs", || {
            let counter = counter.clone();
            async move {
                *counter.lock() += 1;
                std::future::pending().await
            }
        })
        .await;

        assert_eq!(*calls.lock(), 2);
        assert_eq!(
            result,
            Err(StepError::Transport(TransportError::timeout("hangs", Duration::from_secs(3))))
        );
    }
}
