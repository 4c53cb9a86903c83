//! Refresh token lifecycle on top of a [`RefreshTokenStorage`] backend.
//!
//! Issues opaque values, looks them up by hash, and enforces expiry with
//! delete-on-touch.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::error::AuthError;
use crate::storage::bounded;
use crate::storage::refresh_token::{RefreshToken, RefreshTokenStorage};

/// Attempts to find an unused token value before giving up.
const MAX_CREATE_ATTEMPTS: usize = 3;

/// A freshly created refresh token.
///
/// `token` is the plaintext value; it exists only here and in the response
/// sent to the client.
#[derive(Debug, Clone)]
pub struct IssuedRefreshToken {
    pub token: String,
    pub record: RefreshToken,
}

/// Refresh token store.
#[derive(Clone)]
pub struct RefreshTokenStore {
    storage: Arc<dyn RefreshTokenStorage>,
    lifetime: Duration,
    operation_timeout: Duration,
}

impl RefreshTokenStore {
    #[must_use]
    pub fn new(
        storage: Arc<dyn RefreshTokenStorage>,
        lifetime: Duration,
        operation_timeout: Duration,
    ) -> Self {
        Self {
            storage,
            lifetime,
            operation_timeout,
        }
    }

    #[must_use]
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Creates a token for `principal_id` expiring after the configured lifetime.
    ///
    /// # Errors
    ///
    /// Storage failures, or `AuthError::Internal` if no unused value was
    /// found after a few attempts.
    pub async fn create(&self, principal_id: Uuid) -> AuthResult<IssuedRefreshToken> {
        let expires_at = OffsetDateTime::now_utc() + self.lifetime;
        self.create_expiring_at(principal_id, expires_at).await
    }

    /// Creates a token with an explicit expiry. Used by rotation to keep the
    /// original session deadline.
    ///
    /// # Errors
    ///
    /// See [`Self::create`]. `AuthError::TokenExpired` if `expires_at` is
    /// not in the future.
    pub async fn create_expiring_at(
        &self,
        principal_id: Uuid,
        expires_at: OffsetDateTime,
    ) -> AuthResult<IssuedRefreshToken> {
        let now = OffsetDateTime::now_utc();
        if expires_at <= now {
            return Err(AuthError::TokenExpired);
        }

        for attempt in 1..=MAX_CREATE_ATTEMPTS {
            let token = RefreshToken::generate_token();
            let record = RefreshToken::issued_at(&token, principal_id, now, expires_at);

            let stored = bounded(
                self.operation_timeout,
                "refresh token create",
                self.storage.create(&record),
            )
            .await?;

            if stored {
                tracing::debug!(
                    principal_id = %principal_id,
                    token_id = %record.id,
                    "Refresh token created"
                );
                return Ok(IssuedRefreshToken { token, record });
            }

            tracing::warn!(attempt, "Refresh token value collided, regenerating");
        }

        Err(AuthError::internal(
            "could not generate a unique refresh token",
        ))
    }

    /// Looks up a token by its plaintext value, regardless of expiry.
    pub async fn find_by_token(&self, token: &str) -> AuthResult<Option<RefreshToken>> {
        let hash = RefreshToken::hash_token(token);
        bounded(
            self.operation_timeout,
            "refresh token lookup",
            self.storage.find_by_hash(&hash),
        )
        .await
    }

    /// Passes an unexpired token through; deletes an expired one.
    ///
    /// # Errors
    ///
    /// `AuthError::TokenExpired` if the token is expired (after deleting it).
    pub async fn verify_expiration(&self, record: RefreshToken) -> AuthResult<RefreshToken> {
        if !record.is_expired() {
            return Ok(record);
        }

        bounded(
            self.operation_timeout,
            "refresh token delete",
            self.storage.delete(&record.token_hash),
        )
        .await?;
        tracing::info!(
            principal_id = %record.principal_id,
            token_id = %record.id,
            "Expired refresh token deleted"
        );
        Err(AuthError::TokenExpired)
    }

    /// Deletes a token by plaintext value. Returns `false` if it was unknown.
    pub async fn revoke(&self, token: &str) -> AuthResult<bool> {
        let hash = RefreshToken::hash_token(token);
        self.delete_record(&hash).await
    }

    pub(crate) async fn delete_record(&self, token_hash: &str) -> AuthResult<bool> {
        bounded(
            self.operation_timeout,
            "refresh token delete",
            self.storage.delete(token_hash),
        )
        .await
    }

    /// Deletes every token of a principal. Returns the number deleted.
    pub async fn revoke_all_for_principal(&self, principal_id: Uuid) -> AuthResult<u64> {
        bounded(
            self.operation_timeout,
            "refresh token revoke",
            self.storage.delete_by_principal(principal_id),
        )
        .await
    }

    /// Deletes every token of a principal except `keep`. Returns the number deleted.
    pub async fn revoke_others(&self, principal_id: Uuid, keep: Uuid) -> AuthResult<u64> {
        bounded(
            self.operation_timeout,
            "refresh token revoke",
            self.storage.delete_by_principal_except(principal_id, keep),
        )
        .await
    }

    /// Deletes all expired tokens. Returns the number deleted.
    pub async fn cleanup_expired(&self) -> AuthResult<u64> {
        bounded(
            self.operation_timeout,
            "refresh token cleanup",
            self.storage.cleanup_expired(),
        )
        .await
    }

    /// Lists unexpired tokens of a principal, oldest first.
    pub async fn list_for_principal(&self, principal_id: Uuid) -> AuthResult<Vec<RefreshToken>> {
        bounded(
            self.operation_timeout,
            "refresh token list",
            self.storage.list_by_principal(principal_id),
        )
        .await
    }
}
