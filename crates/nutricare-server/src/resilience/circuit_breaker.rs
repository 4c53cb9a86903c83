//! Count-based circuit breaker.
//!
//! The breaker keeps the outcomes of the last `sliding_window_size` recorded
//! calls. Once at least `minimum_number_of_calls` are buffered and the share
//! of failures reaches `failure_rate_threshold` percent, it opens. After
//! `wait_duration_in_open_state` it lets `permitted_calls_in_half_open`
//! trial calls through: all succeeding closes it, any failure reopens it.

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

// =============================================================================
// Configuration
// =============================================================================

/// Circuit breaker settings.
///
/// ```toml
/// [resilience.circuit_breaker]
/// sliding_window_size = 10
/// minimum_number_of_calls = 5
/// failure_rate_threshold = 50.0
/// wait_duration_in_open_state = "10s"
/// permitted_calls_in_half_open = 3
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub sliding_window_size: usize,
    pub minimum_number_of_calls: usize,
    /// Failure percentage (0-100] at which the breaker opens.
    pub failure_rate_threshold: f32,
    #[serde(with = "humantime_serde")]
    pub wait_duration_in_open_state: Duration,
    pub permitted_calls_in_half_open: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            sliding_window_size: 10,
            minimum_number_of_calls: 5,
            failure_rate_threshold: 50.0,
            wait_duration_in_open_state: Duration::from_secs(10),
            permitted_calls_in_half_open: 3,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.sliding_window_size == 0 {
            return Err("resilience.circuit_breaker.sliding_window_size must be > 0".into());
        }
        if self.minimum_number_of_calls == 0
            || self.minimum_number_of_calls > self.sliding_window_size
        {
            return Err(
                "resilience.circuit_breaker.minimum_number_of_calls must be in 1..=sliding_window_size"
                    .into(),
            );
        }
        if !(self.failure_rate_threshold > 0.0 && self.failure_rate_threshold <= 100.0) {
            return Err("resilience.circuit_breaker.failure_rate_threshold must be in (0, 100]".into());
        }
        if self.permitted_calls_in_half_open == 0 {
            return Err("resilience.circuit_breaker.permitted_calls_in_half_open must be > 0".into());
        }
        Ok(())
    }
}

// =============================================================================
// State
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Point-in-time view of a breaker, served by the health endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    /// `None` until `minimum_number_of_calls` outcomes are buffered.
    pub failure_rate: Option<f32>,
    pub buffered_calls: usize,
    pub failed_calls: usize,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    /// Bumped on every transition; outcomes of permits from an older epoch are dropped.
    epoch: u64,
    /// `true` marks a failed call.
    window: VecDeque<bool>,
    opened_at: Option<Instant>,
    half_open_in_flight: u32,
    half_open_successes: u32,
}

impl Inner {
    fn failed(&self) -> usize {
        self.window.iter().filter(|failed| **failed).count()
    }

    fn failure_rate(&self, minimum: usize) -> Option<f32> {
        if self.window.len() < minimum {
            return None;
        }
        Some(self.failed() as f32 * 100.0 / self.window.len() as f32)
    }
}

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Success,
    Failure,
    Ignored,
}

/// Admission to run one call through a [`CircuitBreaker`].
///
/// Settle it with [`success`](Self::success) or [`failure`](Self::failure).
/// A permit dropped unsettled (cancelled future, panic, permanent error)
/// releases its slot without recording an outcome.
#[derive(Debug)]
#[must_use = "dropping a permit releases it without recording an outcome"]
pub struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    epoch: u64,
    settled: bool,
}

impl Permit<'_> {
    pub fn success(mut self) {
        self.settle(Outcome::Success);
    }

    pub fn failure(mut self) {
        self.settle(Outcome::Failure);
    }

    fn settle(&mut self, outcome: Outcome) {
        self.settled = true;
        self.breaker.settle(self.epoch, outcome);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.settle(self.epoch, Outcome::Ignored);
        }
    }
}

/// Circuit breaker shared by all callers of one named operation.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let window = VecDeque::with_capacity(config.sliding_window_size);
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                epoch: 0,
                window,
                opened_at: None,
                half_open_in_flight: 0,
                half_open_successes: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Ask for permission to run one call.
    ///
    /// Moves an open breaker whose cooldown has elapsed to half-open.
    /// Returns `None` while open or when every half-open slot is taken.
    pub fn try_acquire(&self) -> Option<Permit<'_>> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {}
            CircuitState::Open => {
                let cooled_down = inner
                    .opened_at
                    .is_some_and(|at| at.elapsed() >= self.config.wait_duration_in_open_state);
                if !cooled_down {
                    return None;
                }
                self.transition(&mut inner, CircuitState::HalfOpen);
                inner.half_open_in_flight = 1;
            }
            CircuitState::HalfOpen => {
                if inner.half_open_in_flight + inner.half_open_successes
                    >= self.config.permitted_calls_in_half_open
                {
                    return None;
                }
                inner.half_open_in_flight += 1;
            }
        }
        Some(Permit {
            breaker: self,
            epoch: inner.epoch,
            settled: false,
        })
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock();
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failure_rate: inner.failure_rate(self.config.minimum_number_of_calls),
            buffered_calls: inner.window.len(),
            failed_calls: inner.failed(),
        }
    }

    fn settle(&self, epoch: u64, outcome: Outcome) {
        let mut inner = self.inner.lock();
        if inner.epoch != epoch {
            return;
        }
        match (inner.state, outcome) {
            (CircuitState::Closed, Outcome::Success) => self.record(&mut inner, false),
            (CircuitState::Closed, Outcome::Failure) => {
                self.record(&mut inner, true);
                if let Some(rate) = inner.failure_rate(self.config.minimum_number_of_calls)
                    && rate >= self.config.failure_rate_threshold
                {
                    tracing::warn!(
                        breaker = %self.name,
                        failure_rate = rate,
                        threshold = self.config.failure_rate_threshold,
                        "Failure rate exceeded threshold"
                    );
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            (CircuitState::HalfOpen, Outcome::Success) => {
                inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.permitted_calls_in_half_open {
                    self.transition(&mut inner, CircuitState::Closed);
                }
            }
            (CircuitState::HalfOpen, Outcome::Failure) => {
                self.transition(&mut inner, CircuitState::Open);
            }
            (CircuitState::HalfOpen, Outcome::Ignored) => {
                inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
            }
            (CircuitState::Closed, Outcome::Ignored) | (CircuitState::Open, _) => {}
        }
    }

    fn record(&self, inner: &mut Inner, failed: bool) {
        if inner.window.len() == self.config.sliding_window_size {
            inner.window.pop_front();
        }
        inner.window.push_back(failed);
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState) {
        let from = inner.state;
        inner.state = to;
        inner.epoch += 1;
        inner.half_open_in_flight = 0;
        inner.half_open_successes = 0;
        match to {
            CircuitState::Open => inner.opened_at = Some(Instant::now()),
            CircuitState::Closed => {
                inner.opened_at = None;
                inner.window.clear();
            }
            CircuitState::HalfOpen => {}
        }
        tracing::info!(breaker = %self.name, %from, %to, "Circuit breaker state changed");
    }
}
