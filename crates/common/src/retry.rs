use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::errors::BridgeError;

/// Jittered exponential backoff configuration (§4.A).
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// The delay that precedes the attempt numbered `attempt` (1-based),
    /// before jitter. Never panics regardless of how large `attempt` is:
    /// the exponent is capped well before it could overflow `f64::powi`.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let exponent = (attempt - 1).min(1000) as i32;
        let initial_ms = self.initial_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;
        if initial_ms <= 0.0 || max_ms <= 0.0 {
            return Duration::from_millis(0);
        }
        let factor = self.multiplier.max(1.0).powi(exponent);
        let delay_ms = if !factor.is_finite() || initial_ms * factor >= max_ms {
            max_ms
        } else {
            initial_ms * factor
        };
        Duration::from_millis(delay_ms as u64)
    }

    /// `next_delay` perturbed by +/-25% uniform jitter when enabled,
    /// still clamped to `max_delay`. Deterministic (equal to `next_delay`)
    /// when jitter is off.
    fn jittered_delay(&self, attempt: u32) -> Duration {
        let base = self.next_delay(attempt);
        if !self.jitter || base.is_zero() {
            return base;
        }
        let factor = jitter_factor();
        let ms = (base.as_millis() as f64 * factor).round().max(0.0);
        let capped_ms = ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped_ms as u64)
    }
}

/// Uniform factor in [0.75, 1.25], drawn from a cryptographically strong
/// source. Falls back to a time-derived factor only if that source is
/// unavailable (§4.A, §9).
fn jitter_factor() -> f64 {
    match std::panic::catch_unwind(|| {
        use rand::{Rng, TryRngCore};
        rand::rngs::OsRng.unwrap_err().random_range(0.75..=1.25)
    }) {
        Ok(factor) => factor,
        Err(_) => {
            tracing::warn!("OsRng unavailable, falling back to time-based jitter");
            time_based_jitter_factor()
        }
    }
}

fn time_based_jitter_factor() -> f64 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    0.75 + (nanos % 500) as f64 / 1000.0
}

/// Executes `op` up to `policy.max_attempts` times with jittered
/// exponential backoff between attempts, honoring `cancel` before each
/// attempt and during each sleep.
pub struct Retry;

impl Retry {
    pub async fn run<T, E, F, Fut>(
        policy: &RetryPolicy,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: From<BridgeError>,
    {
        Self::run_with_predicate(policy, cancel, |_| true, &mut op).await
    }

    /// Like `run`, but short-circuits immediately (no further retries) on
    /// any error for which `is_retryable` returns false.
    pub async fn run_with_predicate<T, E, F, Fut>(
        policy: &RetryPolicy,
        cancel: &CancellationToken,
        is_retryable: impl Fn(&E) -> bool,
        op: &mut F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: From<BridgeError>,
    {
        let attempts = policy.max_attempts.max(1);
        for attempt in 1..=attempts {
            if cancel.is_cancelled() {
                return Err(BridgeError::Cancelled.into());
            }

            match op().await {
                Ok(value) => {
                    tracing::debug!(attempt, "retry succeeded");
                    return Ok(value);
                }
                Err(error) => {
                    if !is_retryable(&error) {
                        return Err(error);
                    }
                    if attempt == attempts {
                        tracing::warn!(attempt, "retry attempts exhausted");
                        return Err(error);
                    }

                    let delay = policy.jittered_delay(attempt);
                    tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying after delay");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => {
                            return Err(BridgeError::Cancelled.into());
                        }
                    }
                }
            }
        }
        unreachable!("loop always returns before exhausting its range")
    }
}
