//! Bounded retry with exponential backoff.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry settings for gateway-wrapped operations.
///
/// ```toml
/// [resilience.retry]
/// max_attempts = 3
/// initial_backoff = "100ms"
/// multiplier = 2.0
/// max_backoff = "2s"
/// attempt_timeout = "2s"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,

    /// Delay before the second attempt.
    #[serde(with = "humantime_serde")]
    pub initial_backoff: Duration,

    /// Growth factor applied to the delay after each failed attempt.
    pub multiplier: f64,

    /// Upper bound for any single delay.
    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,

    /// Each attempt is abandoned after this long and counted as a transient failure.
    #[serde(with = "humantime_serde")]
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            multiplier: 2.0,
            max_backoff: Duration::from_secs(2),
            attempt_timeout: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait after the given (1-based) failed attempt.
    #[must_use]
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let factor = self.multiplier.powi(exponent);
        let millis = self.initial_backoff.as_secs_f64() * 1000.0 * factor;
        let capped = millis.min(self.max_backoff.as_secs_f64() * 1000.0);
        Duration::from_millis(capped.max(0.0) as u64)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("resilience.retry.max_attempts must be > 0".into());
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err("resilience.retry.multiplier must be >= 1.0".into());
        }
        if self.initial_backoff > self.max_backoff {
            return Err("resilience.retry.initial_backoff must be <= max_backoff".into());
        }
        if self.attempt_timeout.is_zero() {
            return Err("resilience.retry.attempt_timeout must be > 0".into());
        }
        Ok(())
    }
}
