//! Resilient call gateway.
//!
//! Wraps an async operation with a per-attempt timeout, bounded retries of
//! transient failures and a circuit breaker per operation name. When the
//! breaker is open or retries run out the caller gets
//! [`CallOutcome::Fallback`] instead of an error.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use nutricare_auth::AuthError;
use serde_json::json;

use super::circuit_breaker::{BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig};
use super::retry::RetryPolicy;

/// Message returned with every degraded response.
pub const FALLBACK_MESSAGE: &str = "The service is currently unavailable.";

/// Errors that can tell whether a retry might succeed.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for AuthError {
    fn is_transient(&self) -> bool {
        AuthError::is_transient(self)
    }
}

/// Why a call was answered with the fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Degraded {
    /// The breaker rejected the call without running it.
    CircuitOpen,
    /// Every attempt failed transiently or timed out.
    RetriesExhausted { attempts: u32 },
}

impl Degraded {
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::CircuitOpen => "circuit_open",
            Self::RetriesExhausted { .. } => "retries_exhausted",
        }
    }
}

impl fmt::Display for Degraded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CircuitOpen => write!(f, "circuit open"),
            Self::RetriesExhausted { attempts } => {
                write!(f, "retries exhausted after {attempts} attempts")
            }
        }
    }
}

impl IntoResponse for Degraded {
    fn into_response(self) -> Response {
        let body = json!({
            "status": "degraded",
            "reason": self.reason(),
            "message": FALLBACK_MESSAGE,
        });
        (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
    }
}

/// Result of a gateway call that did not fail permanently.
#[derive(Debug)]
pub enum CallOutcome<T> {
    Completed(T),
    Fallback(Degraded),
}

impl<T> CallOutcome<T> {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback(_))
    }

    /// Completed value, or the fallback as an error.
    pub fn into_result(self) -> Result<T, Degraded> {
        match self {
            Self::Completed(value) => Ok(value),
            Self::Fallback(degraded) => Err(degraded),
        }
    }
}

/// Retry + circuit breaker wrapper shared by all request handlers.
pub struct ResilientGateway {
    retry: RetryPolicy,
    breaker_config: CircuitBreakerConfig,
    breakers: DashMap<&'static str, Arc<CircuitBreaker>>,
}

impl ResilientGateway {
    #[must_use]
    pub fn new(retry: RetryPolicy, breaker_config: CircuitBreakerConfig) -> Self {
        Self {
            retry,
            breaker_config,
            breakers: DashMap::new(),
        }
    }

    /// Breaker for `operation`, created on first use.
    pub fn breaker(&self, operation: &'static str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(operation)
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(operation, self.breaker_config.clone()))
            })
            .clone()
    }

    /// Snapshots of every breaker created so far, ordered by name.
    pub fn snapshot(&self) -> Vec<BreakerSnapshot> {
        let mut snapshots: Vec<_> = self
            .breakers
            .iter()
            .map(|entry| entry.value().snapshot())
            .collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    /// Run `op` under the retry policy and the breaker for `operation`.
    ///
    /// # Errors
    ///
    /// Returns the operation's error unchanged when it is not transient.
    /// Such errors are not counted by the breaker.
    pub async fn call<T, E, F, Fut>(
        &self,
        operation: &'static str,
        mut op: F,
    ) -> Result<CallOutcome<T>, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Transient + fmt::Display,
    {
        let breaker = self.breaker(operation);
        let mut attempt = 0;

        loop {
            let Some(permit) = breaker.try_acquire() else {
                tracing::warn!(operation, "Circuit open, serving fallback");
                return Ok(CallOutcome::Fallback(Degraded::CircuitOpen));
            };
            attempt += 1;

            // Dropping `permit` unsettled releases its slot, including when
            // this future is cancelled mid-attempt.
            match tokio::time::timeout(self.retry.attempt_timeout, op()).await {
                Ok(Ok(value)) => {
                    permit.success();
                    return Ok(CallOutcome::Completed(value));
                }
                Ok(Err(e)) if !e.is_transient() => {
                    drop(permit);
                    return Err(e);
                }
                Ok(Err(e)) => {
                    permit.failure();
                    tracing::warn!(operation, attempt, error = %e, "Transient failure");
                }
                Err(_) => {
                    permit.failure();
                    tracing::warn!(
                        operation,
                        attempt,
                        timeout_ms = self.retry.attempt_timeout.as_millis() as u64,
                        "Attempt timed out"
                    );
                }
            }

            if attempt >= self.retry.max_attempts {
                tracing::error!(operation, attempts = attempt, "Retries exhausted, serving fallback");
                return Ok(CallOutcome::Fallback(Degraded::RetriesExhausted {
                    attempts: attempt,
                }));
            }

            let backoff = self.retry.backoff_for(attempt);
            tracing::debug!(operation, attempt, backoff_ms = backoff.as_millis() as u64, "Retrying");
            tokio::time::sleep(backoff).await;
        }
    }
}
