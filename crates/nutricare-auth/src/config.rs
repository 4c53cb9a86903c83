//! Authentication configuration.
//!
//! Token lifetimes, refresh token policy and signing key settings. The server
//! embeds [`AuthConfig`] as its `[auth]` section.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root authentication configuration.
///
/// # Example (TOML)
///
/// ```toml
/// [auth]
/// issuer = "nutricare"
/// access_token_lifetime = "15m"
/// refresh_token_lifetime = "7d"
/// refresh_token_rotation = false
/// session_policy = "multiple"
///
/// [auth.signing]
/// algorithm = "HS256"
/// secret = "change-me-to-a-long-random-value"
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Issuer written to and required in the `iss` claim.
    pub issuer: String,

    /// Access token lifetime.
    #[serde(with = "humantime_serde")]
    pub access_token_lifetime: Duration,

    /// Refresh token lifetime.
    #[serde(with = "humantime_serde")]
    pub refresh_token_lifetime: Duration,

    /// Issue a new refresh token on every refresh and invalidate the old one.
    /// Off by default: a refresh token is reused until it expires.
    pub refresh_token_rotation: bool,

    /// Whether a principal may hold several live refresh tokens.
    pub session_policy: SessionPolicy,

    /// Upper bound for each credential or refresh token store call.
    #[serde(with = "humantime_serde")]
    pub operation_timeout: Duration,

    /// Token signing configuration.
    pub signing: SigningConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer: "nutricare".to_string(),
            access_token_lifetime: Duration::from_secs(15 * 60),
            refresh_token_lifetime: Duration::from_secs(7 * 24 * 3600),
            refresh_token_rotation: false,
            session_policy: SessionPolicy::Multiple,
            operation_timeout: Duration::from_secs(5),
            signing: SigningConfig::default(),
        }
    }
}

/// Refresh token session policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPolicy {
    /// Every login adds a refresh token; earlier ones stay valid (multi-device).
    #[default]
    Multiple,
    /// A successful login revokes every other refresh token of the principal.
    Single,
}

/// Token signing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Signing algorithm.
    /// Supported: "HS256", "HS512" (shared secret), "RS256", "RS384", "ES384"
    /// (key pair generated at startup).
    pub algorithm: String,

    /// Shared secret for the HMAC algorithms.
    pub secret: Option<String>,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            algorithm: "RS256".to_string(),
            secret: None,
        }
    }
}

/// Minimum HMAC secret length in bytes.
pub const MIN_SECRET_LEN: usize = 32;

impl SigningConfig {
    /// Returns `true` if the configured algorithm uses a shared secret.
    #[must_use]
    pub fn is_hmac(&self) -> bool {
        matches!(self.algorithm.as_str(), "HS256" | "HS512")
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A configuration value is invalid.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),
}

impl AuthConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.issuer.is_empty() {
            return Err(ConfigError::InvalidValue(
                "issuer cannot be empty".to_string(),
            ));
        }

        if self.access_token_lifetime.is_zero() {
            return Err(ConfigError::InvalidValue(
                "access_token_lifetime must be > 0".to_string(),
            ));
        }

        if self.refresh_token_lifetime.is_zero() {
            return Err(ConfigError::InvalidValue(
                "refresh_token_lifetime must be > 0".to_string(),
            ));
        }

        if self.operation_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "operation_timeout must be > 0".to_string(),
            ));
        }

        match self.signing.algorithm.as_str() {
            "HS256" | "HS512" => match self.signing.secret.as_deref() {
                None | Some("") => {
                    return Err(ConfigError::Missing(format!(
                        "auth.signing.secret is required for {}",
                        self.signing.algorithm
                    )));
                }
                Some(secret) if secret.len() < MIN_SECRET_LEN => {
                    return Err(ConfigError::InvalidValue(format!(
                        "auth.signing.secret must be at least {} bytes",
                        MIN_SECRET_LEN
                    )));
                }
                Some(_) => {}
            },
            "RS256" | "RS384" | "ES384" => {}
            other => {
                return Err(ConfigError::InvalidValue(format!(
                    "Invalid signing algorithm: '{}'. Must be HS256, HS512, RS256, RS384, or ES384",
                    other
                )));
            }
        }

        Ok(())
    }
}
