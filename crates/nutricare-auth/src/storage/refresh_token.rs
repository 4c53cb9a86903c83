//! Refresh token record and storage trait.
//!
//! # Security Considerations
//!
//! - Tokens are stored as SHA-256 hashes only
//! - Revocation deletes the record, so a revoked token is indistinguishable
//!   from one that was never issued
//! - Expired tokens are deleted on touch and by a periodic sweep

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;

/// Refresh token stored by a backend.
///
/// The plaintext value is handed to the client once and never stored.
/// Validation hashes the incoming value and looks it up by hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshToken {
    /// Unique identifier for this refresh token record.
    pub id: Uuid,

    /// SHA-256 hash (hex) of the token value.
    pub token_hash: String,

    /// Principal this token was issued to.
    pub principal_id: Uuid,

    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// Always later than `created_at`.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl RefreshToken {
    /// Builds a record for `token` that expires at `expires_at`.
    #[must_use]
    pub fn new(token: &str, principal_id: Uuid, expires_at: OffsetDateTime) -> Self {
        Self::issued_at(token, principal_id, OffsetDateTime::now_utc(), expires_at)
    }

    /// Builds a record for `token` created at `created_at`.
    #[must_use]
    pub fn issued_at(
        token: &str,
        principal_id: Uuid,
        created_at: OffsetDateTime,
        expires_at: OffsetDateTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            token_hash: Self::hash_token(token),
            principal_id,
            created_at,
            expires_at,
        }
    }

    /// Returns `true` if this token has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(OffsetDateTime::now_utc())
    }

    /// Returns `true` if this token is expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }

    /// Hash a token value using SHA-256.
    #[must_use]
    pub fn hash_token(token: &str) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Generate a cryptographically secure random token.
    ///
    /// Returns a 256-bit random value encoded as base64url (43 characters).
    #[must_use]
    pub fn generate_token() -> String {
        use base64::Engine;
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;

        let mut bytes = [0u8; 32];
        rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }
}

/// Storage trait for refresh tokens.
///
/// Implementations must be safe under concurrent use and must never hold two
/// records with the same `token_hash`.
#[async_trait]
pub trait RefreshTokenStorage: Send + Sync {
    /// Stores a new refresh token.
    ///
    /// Returns `Ok(false)` without storing anything if a record with the same
    /// `token_hash` already exists.
    async fn create(&self, token: &RefreshToken) -> AuthResult<bool>;

    /// Finds a refresh token by its hash, regardless of expiry.
    async fn find_by_hash(&self, token_hash: &str) -> AuthResult<Option<RefreshToken>>;

    /// Deletes a refresh token. Returns `false` if it did not exist.
    async fn delete(&self, token_hash: &str) -> AuthResult<bool>;

    /// Deletes every refresh token of a principal.
    ///
    /// Returns the number of tokens deleted.
    async fn delete_by_principal(&self, principal_id: Uuid) -> AuthResult<u64>;

    /// Deletes every refresh token of a principal except the one with id `keep`.
    ///
    /// Returns the number of tokens deleted.
    async fn delete_by_principal_except(&self, principal_id: Uuid, keep: Uuid)
    -> AuthResult<u64>;

    /// Deletes tokens whose `expires_at` is not in the future.
    ///
    /// Returns the number of tokens deleted.
    async fn cleanup_expired(&self) -> AuthResult<u64>;

    /// Lists unexpired tokens of a principal, oldest first.
    async fn list_by_principal(&self, principal_id: Uuid) -> AuthResult<Vec<RefreshToken>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    #[test]
    fn test_hash_token() {
        let hash = RefreshToken::hash_token("test-token-value");

        // SHA-256 produces 64 hex characters
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, RefreshToken::hash_token("test-token-value"));
        assert_ne!(hash, RefreshToken::hash_token("other-token-value"));
    }

    #[test]
    fn test_generate_token() {
        let token = RefreshToken::generate_token();
        assert_eq!(token.len(), 43);
        assert_ne!(token, RefreshToken::generate_token());
    }

    #[test]
    fn test_new_stores_hash_not_plaintext() {
        let token = RefreshToken::generate_token();
        let record = RefreshToken::new(
            &token,
            Uuid::new_v4(),
            OffsetDateTime::now_utc() + Duration::hours(1),
        );
        assert_ne!(record.token_hash, token);
        assert_eq!(record.token_hash, RefreshToken::hash_token(&token));
        assert!(record.expires_at > record.created_at);
        assert!(!record.is_expired());
    }

    #[test]
    fn test_is_expired() {
        let record = RefreshToken::new(
            "t",
            Uuid::new_v4(),
            OffsetDateTime::now_utc() - Duration::seconds(1),
        );
        assert!(record.is_expired());
        assert!(!record.is_expired_at(record.expires_at - Duration::seconds(1)));
        assert!(record.is_expired_at(record.expires_at));
    }
}
