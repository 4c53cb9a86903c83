//! Retry, circuit breaker and the gateway combining them.

pub mod circuit_breaker;
pub mod gateway;
pub mod retry;

use serde::{Deserialize, Serialize};

pub use circuit_breaker::{BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use gateway::{CallOutcome, Degraded, FALLBACK_MESSAGE, ResilientGateway, Transient};
pub use retry::RetryPolicy;

/// `[resilience]` configuration section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub retry: RetryPolicy,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl ResilienceConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.retry.validate()?;
        self.circuit_breaker.validate()
    }

    /// Gateway built from this configuration.
    #[must_use]
    pub fn gateway(&self) -> ResilientGateway {
        ResilientGateway::new(self.retry.clone(), self.circuit_breaker.clone())
    }
}
