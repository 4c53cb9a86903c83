//! Login session lifecycle.
//!
//! [`AuthService`] ties the credential store, the JWT signer and the refresh
//! token store together:
//!
//! - `login`: verify credentials, sign an access token, create a refresh token
//! - `refresh`: look up the refresh token, enforce expiry, re-load the
//!   principal, sign a new access token (optionally rotating the refresh token)
//! - `logout` / `revoke`: delete refresh tokens
//!
//! # Usage
//!
//! ```ignore
//! use nutricare_auth::{AuthConfig, AuthService};
//!
//! let service = AuthService::from_config(&config, principals, refresh_tokens)?;
//! let login = service.login("a@x.com", "correct").await?;
//! let refreshed = service.refresh(&login.refresh_token).await?;
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AuthResult;
use crate::config::{AuthConfig, SessionPolicy};
use crate::credentials::{CredentialStore, Registration};
use crate::error::AuthError;
use crate::middleware::types::AuthContext;
use crate::storage::principal::{Principal, PrincipalStorage};
use crate::storage::refresh_token::{RefreshToken, RefreshTokenStorage};
use crate::token::jwt::{AccessToken, JwtService, SigningKey};
use crate::token::refresh::RefreshTokenStore;

/// Token type reported to clients.
pub const BEARER: &str = "Bearer";

// =============================================================================
// Responses
// =============================================================================

/// Successful login.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(rename = "type")]
    pub token_type: String,
    pub id: Uuid,
    pub email: String,
    pub roles: Vec<String>,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
}

/// Successful refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRefreshResponse {
    pub access_token: String,
    /// Unchanged unless rotation is enabled.
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

// =============================================================================
// Auth Service
// =============================================================================

/// Authentication service.
pub struct AuthService {
    credentials: CredentialStore,
    jwt: Arc<JwtService>,
    refresh_tokens: RefreshTokenStore,
    rotate_refresh_tokens: bool,
    session_policy: SessionPolicy,
}

impl AuthService {
    /// Creates a service that reuses refresh tokens and allows several
    /// sessions per principal.
    #[must_use]
    pub fn new(
        credentials: CredentialStore,
        jwt: Arc<JwtService>,
        refresh_tokens: RefreshTokenStore,
    ) -> Self {
        Self {
            credentials,
            jwt,
            refresh_tokens,
            rotate_refresh_tokens: false,
            session_policy: SessionPolicy::Multiple,
        }
    }

    /// Builds the service, including the process-wide signing key, from
    /// configuration.
    ///
    /// # Errors
    ///
    /// `AuthError::Configuration` if the configuration is invalid or the
    /// signing key cannot be created.
    pub fn from_config(
        config: &AuthConfig,
        principals: Arc<dyn PrincipalStorage>,
        refresh_tokens: Arc<dyn RefreshTokenStorage>,
    ) -> AuthResult<Self> {
        config
            .validate()
            .map_err(|e| AuthError::configuration(e.to_string()))?;

        let key = SigningKey::from_config(&config.signing)?;
        tracing::info!(
            algorithm = %key.algorithm,
            kid = %key.kid,
            "Access token signing key initialized"
        );

        let jwt = JwtService::new(key, config.issuer.clone())
            .with_access_token_lifetime(config.access_token_lifetime);

        Ok(Self::new(
            CredentialStore::new(principals, config.operation_timeout),
            Arc::new(jwt),
            RefreshTokenStore::new(
                refresh_tokens,
                config.refresh_token_lifetime,
                config.operation_timeout,
            ),
        )
        .with_rotate_refresh_tokens(config.refresh_token_rotation)
        .with_session_policy(config.session_policy))
    }

    /// Sets whether refresh rotates the refresh token.
    #[must_use]
    pub fn with_rotate_refresh_tokens(mut self, rotate: bool) -> Self {
        self.rotate_refresh_tokens = rotate;
        self
    }

    #[must_use]
    pub fn with_session_policy(mut self, policy: SessionPolicy) -> Self {
        self.session_policy = policy;
        self
    }

    #[must_use]
    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    #[must_use]
    pub fn jwt(&self) -> &Arc<JwtService> {
        &self.jwt
    }

    #[must_use]
    pub fn refresh_tokens(&self) -> &RefreshTokenStore {
        &self.refresh_tokens
    }

    /// Authenticates a principal and issues an access/refresh token pair.
    ///
    /// Either both tokens are issued or none is.
    ///
    /// # Errors
    ///
    /// `AuthError::InvalidCredentials`, or a storage/signing failure.
    pub async fn login(&self, email: &str, password: &str) -> AuthResult<LoginResponse> {
        let principal = self.credentials.verify(email, password).await?;
        let access = self.sign(&principal).await?;
        let issued = self.refresh_tokens.create(principal.id).await?;

        if self.session_policy == SessionPolicy::Single {
            match self
                .refresh_tokens
                .revoke_others(principal.id, issued.record.id)
                .await
            {
                Ok(revoked) if revoked > 0 => {
                    tracing::info!(principal_id = %principal.id, revoked, "Previous sessions revoked");
                }
                Ok(_) => {}
                Err(e) => {
                    self.discard(&issued.record).await;
                    return Err(e);
                }
            }
        }

        tracing::info!(principal_id = %principal.id, "Login succeeded");

        Ok(LoginResponse {
            access_token: access.token,
            refresh_token: issued.token,
            token_type: BEARER.to_string(),
            id: principal.id,
            email: principal.email,
            roles: principal.roles,
            expires_in: self.jwt.access_token_lifetime().as_secs(),
        })
    }

    /// Exchanges a refresh token for a new access token.
    ///
    /// # Errors
    ///
    /// - `AuthError::TokenNotFound` if the token is unknown, revoked, or its
    ///   principal no longer exists or is inactive (the token is then deleted)
    /// - `AuthError::TokenExpired` if the token is expired (it is deleted)
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenRefreshResponse> {
        if refresh_token.trim().is_empty() {
            return Err(AuthError::invalid_request("refreshToken is required"));
        }

        let record = self
            .refresh_tokens
            .find_by_token(refresh_token)
            .await?
            .ok_or(AuthError::TokenNotFound)?;
        let record = self.refresh_tokens.verify_expiration(record).await?;

        let principal = match self.credentials.find_by_id(record.principal_id).await? {
            Some(principal) if principal.active => principal,
            _ => {
                tracing::warn!(
                    principal_id = %record.principal_id,
                    "Refresh token references a missing or inactive principal"
                );
                self.refresh_tokens
                    .delete_record(&record.token_hash)
                    .await?;
                return Err(AuthError::TokenNotFound);
            }
        };

        let access = self.sign(&principal).await?;

        let refresh_token = if self.rotate_refresh_tokens {
            let issued = match self
                .refresh_tokens
                .create_expiring_at(principal.id, record.expires_at)
                .await
            {
                Err(AuthError::TokenExpired) => {
                    // Deadline passed after the expiry check.
                    self.refresh_tokens
                        .delete_record(&record.token_hash)
                        .await?;
                    return Err(AuthError::TokenExpired);
                }
                issued => issued?,
            };
            // Only one concurrent rotation of the same token may succeed.
            if !self.refresh_tokens.delete_record(&record.token_hash).await? {
                self.discard(&issued.record).await;
                return Err(AuthError::TokenNotFound);
            }
            tracing::debug!(
                principal_id = %principal.id,
                old_token_id = %record.id,
                new_token_id = %issued.record.id,
                "Refresh token rotated"
            );
            issued.token
        } else {
            refresh_token.to_string()
        };

        Ok(TokenRefreshResponse {
            access_token: access.token,
            refresh_token,
            token_type: BEARER.to_string(),
            expires_in: self.jwt.access_token_lifetime().as_secs(),
        })
    }

    /// Validates an access token and returns the caller's context.
    ///
    /// # Errors
    ///
    /// `TokenMissing`, `TokenMalformed`, `BadSignature` or `AccessTokenExpired`.
    pub fn authenticate(&self, bearer: &str) -> AuthResult<AuthContext> {
        let bearer = bearer.trim();
        if bearer.is_empty() {
            return Err(AuthError::TokenMissing);
        }
        let claims = self.jwt.validate(bearer)?;
        AuthContext::from_claims(claims)
    }

    /// Revokes every refresh token of the principal. Returns the number revoked.
    pub async fn logout(&self, principal_id: Uuid) -> AuthResult<u64> {
        let revoked = self
            .refresh_tokens
            .revoke_all_for_principal(principal_id)
            .await?;
        tracing::info!(principal_id = %principal_id, revoked, "Logged out");
        Ok(revoked)
    }

    /// Revokes a single refresh token. Returns `false` if it was unknown.
    pub async fn revoke(&self, refresh_token: &str) -> AuthResult<bool> {
        self.refresh_tokens.revoke(refresh_token).await
    }

    /// Deletes expired refresh tokens. Returns the number deleted.
    pub async fn cleanup_expired(&self) -> AuthResult<u64> {
        self.refresh_tokens.cleanup_expired().await
    }

    /// Lists the live refresh tokens (sessions) of a principal.
    pub async fn list_sessions(&self, principal_id: Uuid) -> AuthResult<Vec<RefreshToken>> {
        self.refresh_tokens.list_for_principal(principal_id).await
    }

    /// Creates a principal.
    pub async fn register(&self, registration: Registration) -> AuthResult<Principal> {
        self.credentials.register(registration).await
    }

    /// Changes a password and revokes every session of the principal.
    pub async fn change_password(&self, principal_id: Uuid, new_password: &str) -> AuthResult<()> {
        self.credentials
            .change_password(principal_id, new_password)
            .await?;
        self.logout(principal_id).await?;
        Ok(())
    }

    /// Revokes a principal's refresh tokens, then deletes the principal.
    ///
    /// Returns `false` if the principal did not exist.
    pub async fn delete_principal(&self, principal_id: Uuid) -> AuthResult<bool> {
        self.refresh_tokens
            .revoke_all_for_principal(principal_id)
            .await?;
        self.credentials.delete(principal_id).await
    }

    async fn sign(&self, principal: &Principal) -> AuthResult<AccessToken> {
        if self.jwt.algorithm().is_hmac() {
            return Ok(self.jwt.issue_access_token(principal)?);
        }
        let jwt = Arc::clone(&self.jwt);
        let principal = principal.clone();
        tokio::task::spawn_blocking(move || jwt.issue_access_token(&principal))
            .await
            .map_err(|e| AuthError::internal(format!("token signing task failed: {e}")))?
            .map_err(AuthError::from)
    }

    async fn discard(&self, record: &RefreshToken) {
        if let Err(e) = self.refresh_tokens.delete_record(&record.token_hash).await {
            tracing::error!(
                token_id = %record.id,
                error = %e,
                "Failed to discard refresh token after aborted operation"
            );
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
