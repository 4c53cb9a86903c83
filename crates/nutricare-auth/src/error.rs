//! Authentication error types.
//!
//! Every failure of the login/refresh lifecycle is a tagged variant so that
//! callers (HTTP layer, resilience gateway) can decide by type whether a
//! failure is terminal for the request or eligible for retry.

use std::fmt;

/// Errors that can occur during authentication operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Email or password did not match. Never says which one.
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// The request carried no bearer token.
    #[error("Missing bearer token")]
    TokenMissing,

    /// The access token could not be parsed or carries invalid claims.
    #[error("Malformed token: {message}")]
    TokenMalformed {
        /// Description of why the token is malformed.
        message: String,
    },

    /// The access token signature does not verify against the process key.
    #[error("Invalid token signature")]
    BadSignature,

    /// The access token is past its `exp` claim.
    #[error("Access token expired")]
    AccessTokenExpired,

    /// The refresh token is unknown (never issued, revoked or already deleted).
    #[error("Refresh token is not in database!")]
    TokenNotFound,

    /// The refresh token is past its expiry. It has been deleted.
    #[error("Refresh token was expired. Please make a new signin request")]
    TokenExpired,

    /// The authenticated principal may not perform the action.
    #[error("Forbidden: {message}")]
    Forbidden {
        /// Description of why access is forbidden.
        message: String,
    },

    /// The request body failed validation.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description of why the request is invalid.
        message: String,
    },

    /// A store or downstream call timed out or was temporarily unreachable.
    #[error("Service unavailable: {message}")]
    Unavailable {
        /// Description of the transient failure.
        message: String,
    },

    /// An error occurred while storing or retrieving auth data.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// The auth configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `TokenMalformed` error.
    #[must_use]
    pub fn token_malformed(message: impl Into<String>) -> Self {
        Self::TokenMalformed {
            message: message.into(),
        }
    }

    /// Creates a new `Forbidden` error.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates a new `Unavailable` error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a client error (4xx category).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidCredentials
                | Self::TokenMissing
                | Self::TokenMalformed { .. }
                | Self::BadSignature
                | Self::AccessTokenExpired
                | Self::TokenNotFound
                | Self::TokenExpired
                | Self::Forbidden { .. }
                | Self::InvalidRequest { .. }
        )
    }

    /// Returns `true` if this is a server error (5xx category).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Unavailable { .. }
                | Self::Storage { .. }
                | Self::Configuration { .. }
                | Self::Internal { .. }
        )
    }

    /// Returns `true` if retrying the same call may succeed.
    ///
    /// Only infrastructure failures qualify. Retrying a bad password or an
    /// unknown refresh token can never change the answer.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Storage { .. })
    }

    /// Returns `true` if this error concerns an access or refresh token.
    #[must_use]
    pub fn is_token_error(&self) -> bool {
        matches!(
            self,
            Self::TokenMissing
                | Self::TokenMalformed { .. }
                | Self::BadSignature
                | Self::AccessTokenExpired
                | Self::TokenNotFound
                | Self::TokenExpired
        )
    }

    /// Returns the error category for logging purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidCredentials => ErrorCategory::Authentication,
            Self::TokenMissing
            | Self::TokenMalformed { .. }
            | Self::BadSignature
            | Self::AccessTokenExpired => ErrorCategory::Token,
            Self::TokenNotFound | Self::TokenExpired => ErrorCategory::RefreshToken,
            Self::Forbidden { .. } => ErrorCategory::Authorization,
            Self::InvalidRequest { .. } => ErrorCategory::Validation,
            Self::Unavailable { .. } | Self::Storage { .. } => ErrorCategory::Infrastructure,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Returns the short machine-readable code used in error bodies.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "invalid_credentials",
            Self::TokenMissing => "token_missing",
            Self::TokenMalformed { .. } => "token_malformed",
            Self::BadSignature => "bad_signature",
            Self::AccessTokenExpired => "access_token_expired",
            Self::TokenNotFound => "refresh_token_not_found",
            Self::TokenExpired => "refresh_token_expired",
            Self::Forbidden { .. } => "forbidden",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::Unavailable { .. } => "unavailable",
            Self::Storage { .. } => "server_error",
            Self::Configuration { .. } => "server_error",
            Self::Internal { .. } => "server_error",
        }
    }
}

/// Categories of authentication errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Credential verification failures.
    Authentication,
    /// Access token validation failures.
    Token,
    /// Refresh token lookup/expiry failures.
    RefreshToken,
    /// Permission checks.
    Authorization,
    /// Request validation errors.
    Validation,
    /// Infrastructure/storage errors.
    Infrastructure,
    /// Configuration errors.
    Configuration,
    /// Internal server errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::Token => write!(f, "token"),
            Self::RefreshToken => write!(f, "refresh_token"),
            Self::Authorization => write!(f, "authorization"),
            Self::Validation => write!(f, "validation"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            AuthError::InvalidCredentials.to_string(),
            "Invalid email or password"
        );
        assert_eq!(
            AuthError::TokenNotFound.to_string(),
            "Refresh token is not in database!"
        );
        assert!(AuthError::TokenExpired.to_string().contains("expired"));
        assert_eq!(
            AuthError::token_malformed("bad base64").to_string(),
            "Malformed token: bad base64"
        );
    }

    #[test]
    fn test_error_predicates() {
        let err = AuthError::InvalidCredentials;
        assert!(err.is_client_error());
        assert!(!err.is_server_error());
        assert!(!err.is_transient());

        let err = AuthError::TokenExpired;
        assert!(err.is_client_error());
        assert!(err.is_token_error());
        assert!(!err.is_transient());

        let err = AuthError::storage("connection reset");
        assert!(!err.is_client_error());
        assert!(err.is_server_error());
        assert!(err.is_transient());

        let err = AuthError::unavailable("timed out");
        assert!(err.is_transient());

        let err = AuthError::configuration("missing secret");
        assert!(err.is_server_error());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            AuthError::InvalidCredentials.category(),
            ErrorCategory::Authentication
        );
        assert_eq!(AuthError::BadSignature.category(), ErrorCategory::Token);
        assert_eq!(
            AuthError::TokenNotFound.category(),
            ErrorCategory::RefreshToken
        );
        assert_eq!(
            AuthError::forbidden("staff only").category(),
            ErrorCategory::Authorization
        );
        assert_eq!(
            AuthError::storage("down").category(),
            ErrorCategory::Infrastructure
        );
    }

    #[test]
    fn test_error_code() {
        assert_eq!(
            AuthError::InvalidCredentials.error_code(),
            "invalid_credentials"
        );
        assert_eq!(
            AuthError::TokenNotFound.error_code(),
            "refresh_token_not_found"
        );
        assert_eq!(AuthError::internal("x").error_code(), "server_error");
    }

    #[test]
    fn test_error_category_display() {
        assert_eq!(ErrorCategory::Authentication.to_string(), "authentication");
        assert_eq!(ErrorCategory::RefreshToken.to_string(), "refresh_token");
        assert_eq!(ErrorCategory::Infrastructure.to_string(), "infrastructure");
    }
}
