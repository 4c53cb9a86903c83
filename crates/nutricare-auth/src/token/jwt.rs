//! JWT access token signing and validation.
//!
//! ## Supported Algorithms
//!
//! - **HS256 / HS512**: HMAC with a configured shared secret
//! - **RS256 / RS384**: RSA, key pair generated at startup
//! - **ES384**: ECDSA with P-384, key pair generated at startup
//!
//! The key is process-wide and never rotated while the process runs.
//! Restarting with a different key invalidates every outstanding access
//! token; refresh tokens are unaffected.
//!
//! ## Example
//!
//! ```ignore
//! use nutricare_auth::token::jwt::{JwtService, SigningKey, SigningAlgorithm};
//!
//! let key = SigningKey::generate_rsa(SigningAlgorithm::RS256)?;
//! let jwt = JwtService::new(key, "nutricare");
//!
//! let access = jwt.issue_access_token(&principal)?;
//! let claims = jwt.validate(&access.token)?;
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use p384::SecretKey as EcSecretKey;
use p384::ecdsa::SigningKey as EcSigningKey;
use p384::pkcs8::EncodePrivateKey as EcEncodePrivateKey;
use rand::rngs::OsRng;
use rsa::RsaPrivateKey;
use rsa::pkcs8::{EncodePublicKey, LineEnding};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::config::SigningConfig;
use crate::error::AuthError;
use crate::storage::principal::Principal;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during JWT operations.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// Failed to encode a token.
    #[error("Failed to encode token: {message}")]
    EncodingError {
        /// Description of the encoding error.
        message: String,
    },

    /// The token is not a well-formed JWT for this service.
    #[error("Malformed token: {message}")]
    Malformed {
        /// Description of the problem.
        message: String,
    },

    /// The token has expired.
    #[error("Token expired")]
    Expired,

    /// The token signature is invalid.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Failed to generate a cryptographic key.
    #[error("Key generation error: {message}")]
    KeyGenerationError {
        /// Description of the key generation error.
        message: String,
    },

    /// Invalid key format or data.
    #[error("Invalid key: {message}")]
    InvalidKey {
        /// Description of why the key is invalid.
        message: String,
    },
}

impl JwtError {
    /// Creates a new `EncodingError`.
    #[must_use]
    pub fn encoding_error(message: impl Into<String>) -> Self {
        Self::EncodingError {
            message: message.into(),
        }
    }

    /// Creates a new `Malformed` error.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Creates a new `KeyGenerationError`.
    #[must_use]
    pub fn key_generation_error(message: impl Into<String>) -> Self {
        Self::KeyGenerationError {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidKey` error.
    #[must_use]
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }

    /// Returns `true` if the token itself was rejected (as opposed to a key problem).
    #[must_use]
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            Self::Expired | Self::InvalidSignature | Self::Malformed { .. }
        )
    }
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidRsaKey(_) | ErrorKind::InvalidEcdsaKey | ErrorKind::InvalidKeyFormat => {
                Self::invalid_key(err.to_string())
            }
            _ => Self::malformed(err.to_string()),
        }
    }
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired => AuthError::AccessTokenExpired,
            JwtError::InvalidSignature => AuthError::BadSignature,
            JwtError::Malformed { message } => AuthError::token_malformed(message),
            JwtError::EncodingError { message } => AuthError::internal(message),
            JwtError::KeyGenerationError { message } | JwtError::InvalidKey { message } => {
                AuthError::configuration(message)
            }
        }
    }
}

// ============================================================================
// Signing Algorithm
// ============================================================================

/// Supported signing algorithms for access tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigningAlgorithm {
    /// HMAC with SHA-256.
    HS256,
    /// HMAC with SHA-512.
    HS512,
    /// RSA with SHA-256.
    RS256,
    /// RSA with SHA-384.
    RS384,
    /// ECDSA with P-384 curve.
    ES384,
}

impl SigningAlgorithm {
    /// Converts to the `jsonwebtoken` Algorithm type.
    #[must_use]
    pub fn to_jwt_algorithm(self) -> Algorithm {
        match self {
            Self::HS256 => Algorithm::HS256,
            Self::HS512 => Algorithm::HS512,
            Self::RS256 => Algorithm::RS256,
            Self::RS384 => Algorithm::RS384,
            Self::ES384 => Algorithm::ES384,
        }
    }

    /// Returns the algorithm name as used in JWT headers.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HS256 => "HS256",
            Self::HS512 => "HS512",
            Self::RS256 => "RS256",
            Self::RS384 => "RS384",
            Self::ES384 => "ES384",
        }
    }

    #[must_use]
    pub fn is_hmac(&self) -> bool {
        matches!(self, Self::HS256 | Self::HS512)
    }

    #[must_use]
    pub fn is_rsa(&self) -> bool {
        matches!(self, Self::RS256 | Self::RS384)
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SigningAlgorithm {
    type Err = JwtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HS256" => Ok(Self::HS256),
            "HS512" => Ok(Self::HS512),
            "RS256" => Ok(Self::RS256),
            "RS384" => Ok(Self::RS384),
            "ES384" => Ok(Self::ES384),
            other => Err(JwtError::invalid_key(format!(
                "Unsupported signing algorithm: {other}"
            ))),
        }
    }
}

// ============================================================================
// Token Claims
// ============================================================================

/// Claims carried by an access token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccessTokenClaims {
    /// Issuer.
    pub iss: String,

    /// Subject: the principal id.
    pub sub: String,

    /// Principal email at issuance time.
    pub email: String,

    /// Principal roles at issuance time.
    pub roles: Vec<String>,

    /// Issued at (Unix timestamp).
    pub iat: i64,

    /// Expiration time (Unix timestamp).
    pub exp: i64,

    /// JWT ID.
    pub jti: String,
}

impl AccessTokenClaims {
    /// Claims for `principal`, valid for `lifetime` from now.
    #[must_use]
    pub fn for_principal(issuer: &str, principal: &Principal, lifetime: Duration) -> Self {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        Self {
            iss: issuer.to_string(),
            sub: principal.id.to_string(),
            email: principal.email.clone(),
            roles: principal.roles.clone(),
            iat: now,
            exp: now + lifetime.as_secs() as i64,
            jti: Uuid::new_v4().to_string(),
        }
    }

    /// Parses `sub` as a principal id.
    ///
    /// # Errors
    ///
    /// Returns `JwtError::Malformed` if `sub` is not a UUID.
    pub fn principal_id(&self) -> Result<Uuid, JwtError> {
        Uuid::parse_str(&self.sub).map_err(|_| JwtError::malformed("sub is not a principal id"))
    }
}

/// A signed access token and the claims it carries.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub claims: AccessTokenClaims,
}

// ============================================================================
// Signing Key
// ============================================================================

/// Process-wide signing key.
pub struct SigningKey {
    /// Key ID, written to the JWT header.
    pub kid: String,
    pub algorithm: SigningAlgorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    pub created_at: OffsetDateTime,
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl SigningKey {
    /// Builds the key described by the signing configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the algorithm is unknown, an HMAC secret is
    /// missing, or key generation fails.
    pub fn from_config(config: &SigningConfig) -> Result<Self, JwtError> {
        let algorithm: SigningAlgorithm = config.algorithm.parse()?;
        if algorithm.is_hmac() {
            let secret = config
                .secret
                .as_deref()
                .ok_or_else(|| JwtError::invalid_key("HMAC signing requires a secret"))?;
            Self::from_secret(algorithm, secret.as_bytes())
        } else if algorithm.is_rsa() {
            Self::generate_rsa(algorithm)
        } else {
            Self::generate_ec()
        }
    }

    /// Creates an HMAC key from a shared secret.
    ///
    /// # Errors
    ///
    /// Returns an error if the algorithm is not HMAC-based or the secret is empty.
    pub fn from_secret(algorithm: SigningAlgorithm, secret: &[u8]) -> Result<Self, JwtError> {
        if !algorithm.is_hmac() {
            return Err(JwtError::invalid_key(format!(
                "Algorithm {} is not HMAC-based",
                algorithm
            )));
        }
        if secret.is_empty() {
            return Err(JwtError::invalid_key("HMAC secret is empty"));
        }

        Ok(Self {
            kid: Uuid::new_v4().to_string(),
            algorithm,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            created_at: OffsetDateTime::now_utc(),
        })
    }

    /// Generates a new RSA key pair (2048 bits).
    ///
    /// # Errors
    ///
    /// Returns an error if key generation fails or the algorithm is not RSA-based.
    pub fn generate_rsa(algorithm: SigningAlgorithm) -> Result<Self, JwtError> {
        if !algorithm.is_rsa() {
            return Err(JwtError::invalid_key(format!(
                "Algorithm {} is not RSA-based",
                algorithm
            )));
        }

        let private_key = RsaPrivateKey::new(&mut OsRng, 2048)
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;
        let public_key = private_key.to_public_key();

        let private_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;
        let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes())
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;

        let public_pem = public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;
        let decoding_key = DecodingKey::from_rsa_pem(public_pem.as_bytes())
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;

        Ok(Self {
            kid: Uuid::new_v4().to_string(),
            algorithm,
            encoding_key,
            decoding_key,
            created_at: OffsetDateTime::now_utc(),
        })
    }

    /// Generates a new EC key pair on the P-384 curve.
    ///
    /// # Errors
    ///
    /// Returns an error if key generation fails.
    pub fn generate_ec() -> Result<Self, JwtError> {
        let secret_key = EcSecretKey::random(&mut OsRng);
        let signing_key = EcSigningKey::from(&secret_key);
        let point = signing_key.verifying_key().to_encoded_point(false);

        let x = point
            .x()
            .ok_or_else(|| JwtError::key_generation_error("Missing x coordinate"))?;
        let y = point
            .y()
            .ok_or_else(|| JwtError::key_generation_error("Missing y coordinate"))?;

        // jsonwebtoken wants PKCS8 PEM for signing
        let private_pem = secret_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;
        let encoding_key = EncodingKey::from_ec_pem(private_pem.as_bytes())
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;

        let decoding_key = DecodingKey::from_ec_components(
            &URL_SAFE_NO_PAD.encode(x.as_slice()),
            &URL_SAFE_NO_PAD.encode(y.as_slice()),
        )
        .map_err(|e| JwtError::key_generation_error(e.to_string()))?;

        Ok(Self {
            kid: Uuid::new_v4().to_string(),
            algorithm: SigningAlgorithm::ES384,
            encoding_key,
            decoding_key,
            created_at: OffsetDateTime::now_utc(),
        })
    }
}

// ============================================================================
// JWT Service
// ============================================================================

/// Issues and validates access tokens.
///
/// `Send + Sync`; share it behind an `Arc`.
pub struct JwtService {
    signing_key: SigningKey,
    issuer: String,
    access_token_lifetime: Duration,
}

impl JwtService {
    /// Creates a new JWT service with a 15 minute access token lifetime.
    #[must_use]
    pub fn new(signing_key: SigningKey, issuer: impl Into<String>) -> Self {
        Self {
            signing_key,
            issuer: issuer.into(),
            access_token_lifetime: Duration::from_secs(15 * 60),
        }
    }

    /// Sets the lifetime of issued access tokens.
    #[must_use]
    pub fn with_access_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.access_token_lifetime = lifetime;
        self
    }

    /// Signs an access token for `principal`.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn issue_access_token(&self, principal: &Principal) -> Result<AccessToken, JwtError> {
        let claims =
            AccessTokenClaims::for_principal(&self.issuer, principal, self.access_token_lifetime);
        let token = self.encode(&claims)?;
        Ok(AccessToken { token, claims })
    }

    /// Validates signature, issuer and expiry, and returns the claims.
    ///
    /// # Errors
    ///
    /// `Malformed`, `Expired` or `InvalidSignature`.
    pub fn validate(&self, token: &str) -> Result<AccessTokenClaims, JwtError> {
        let mut validation = Validation::new(self.signing_key.algorithm.to_jwt_algorithm());
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.validate_exp = true;
        validation.validate_aud = false;

        let data = decode::<AccessTokenClaims>(token, &self.signing_key.decoding_key, &validation)
            .map_err(JwtError::from)?;
        data.claims.principal_id()?;
        Ok(data.claims)
    }

    /// Encodes claims into a JWT string.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn encode<T: Serialize>(&self, claims: &T) -> Result<String, JwtError> {
        let mut header = Header::new(self.signing_key.algorithm.to_jwt_algorithm());
        header.kid = Some(self.signing_key.kid.clone());
        encode(&header, claims, &self.signing_key.encoding_key)
            .map_err(|e| JwtError::encoding_error(e.to_string()))
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    #[must_use]
    pub fn algorithm(&self) -> SigningAlgorithm {
        self.signing_key.algorithm
    }

    #[must_use]
    pub fn access_token_lifetime(&self) -> Duration {
        self.access_token_lifetime
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::principal::ROLE_PATIENT;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    fn hmac_service() -> JwtService {
        JwtService::new(
            SigningKey::from_secret(SigningAlgorithm::HS256, SECRET).unwrap(),
            "nutricare",
        )
    }

    fn patient() -> Principal {
        Principal::new("a@x.com", "hash").with_roles(vec![ROLE_PATIENT.to_string()])
    }

    #[test]
    fn test_hmac_issue_and_validate() {
        let service = hmac_service();
        let principal = patient();

        let access = service.issue_access_token(&principal).unwrap();
        assert!(!access.token.is_empty());

        let claims = service.validate(&access.token).unwrap();
        assert_eq!(claims.sub, principal.id.to_string());
        assert_eq!(claims.principal_id().unwrap(), principal.id);
        assert_eq!(claims.roles, vec![ROLE_PATIENT.to_string()]);
        assert_eq!(claims.email, "a@x.com");
        assert_eq!(claims.iss, "nutricare");
        assert_eq!(claims.exp - claims.iat, 15 * 60);
    }

    #[test]
    fn test_rs256_issue_and_validate() {
        let key = SigningKey::generate_rsa(SigningAlgorithm::RS256).unwrap();
        let service = JwtService::new(key, "nutricare");
        let access = service.issue_access_token(&patient()).unwrap();
        assert!(service.validate(&access.token).is_ok());
    }

    #[test]
    fn test_es384_issue_and_validate() {
        let service = JwtService::new(SigningKey::generate_ec().unwrap(), "nutricare");
        let access = service.issue_access_token(&patient()).unwrap();
        assert!(service.validate(&access.token).is_ok());
    }

    #[test]
    fn test_expired_token_rejected() {
        let service = hmac_service();
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let claims = AccessTokenClaims {
            iss: "nutricare".to_string(),
            sub: Uuid::new_v4().to_string(),
            email: "a@x.com".to_string(),
            roles: Vec::new(),
            iat: now - 7200,
            exp: now - 3600, // Expired 1 hour ago
            jti: Uuid::new_v4().to_string(),
        };
        let token = service.encode(&claims).unwrap();

        let result = service.validate(&token);
        assert!(matches!(result.unwrap_err(), JwtError::Expired));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let issuer = hmac_service();
        let verifier = JwtService::new(
            SigningKey::from_secret(SigningAlgorithm::HS256, b"another-secret-another-secret-!!")
                .unwrap(),
            "nutricare",
        );
        let access = issuer.issue_access_token(&patient()).unwrap();

        let result = verifier.validate(&access.token);
        assert!(matches!(result.unwrap_err(), JwtError::InvalidSignature));
    }

    #[test]
    fn test_garbage_token_is_malformed() {
        let service = hmac_service();
        let err = service.validate("not.a.jwt").unwrap_err();
        assert!(matches!(err, JwtError::Malformed { .. }));
        assert!(matches!(
            AuthError::from(err),
            AuthError::TokenMalformed { .. }
        ));
    }

    #[test]
    fn test_wrong_issuer_is_malformed() {
        let other = JwtService::new(
            SigningKey::from_secret(SigningAlgorithm::HS256, SECRET).unwrap(),
            "someone-else",
        );
        let access = other.issue_access_token(&patient()).unwrap();
        let err = hmac_service().validate(&access.token).unwrap_err();
        assert!(matches!(err, JwtError::Malformed { .. }));
    }

    #[test]
    fn test_non_uuid_subject_is_malformed() {
        let service = hmac_service();
        let mut claims = AccessTokenClaims::for_principal(
            "nutricare",
            &patient(),
            Duration::from_secs(60),
        );
        claims.sub = "not-a-uuid".to_string();
        let token = service.encode(&claims).unwrap();
        assert!(matches!(
            service.validate(&token).unwrap_err(),
            JwtError::Malformed { .. }
        ));
    }

    #[test]
    fn test_from_config() {
        let config = SigningConfig {
            algorithm: "HS512".to_string(),
            secret: Some(String::from_utf8(SECRET.to_vec()).unwrap()),
        };
        let key = SigningKey::from_config(&config).unwrap();
        assert_eq!(key.algorithm, SigningAlgorithm::HS512);

        let missing = SigningConfig {
            algorithm: "HS256".to_string(),
            secret: None,
        };
        assert!(SigningKey::from_config(&missing).is_err());

        let unknown = SigningConfig {
            algorithm: "none".to_string(),
            secret: None,
        };
        assert!(SigningKey::from_config(&unknown).is_err());
    }

    #[test]
    fn test_algorithm_mismatch_rejected() {
        assert!(SigningKey::generate_rsa(SigningAlgorithm::ES384).is_err());
        assert!(SigningKey::from_secret(SigningAlgorithm::RS256, SECRET).is_err());
        assert!(SigningKey::from_secret(SigningAlgorithm::HS256, b"").is_err());
    }

    #[test]
    fn test_jwt_error_mapping() {
        assert!(matches!(
            AuthError::from(JwtError::Expired),
            AuthError::AccessTokenExpired
        ));
        assert!(matches!(
            AuthError::from(JwtError::InvalidSignature),
            AuthError::BadSignature
        ));
        assert!(JwtError::Expired.is_validation_error());
        assert!(!JwtError::invalid_key("x").is_validation_error());
    }
}
