//! Bearer token authentication extractor.
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, routing::get};
//! use nutricare_auth::middleware::{AuthState, BearerAuth};
//!
//! async fn protected_handler(BearerAuth(auth): BearerAuth) -> String {
//!     format!("Hello, {}!", auth.email())
//! }
//!
//! let app = Router::new()
//!     .route("/protected", get(protected_handler))
//!     .with_state(auth_state);
//! ```

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};

use crate::error::AuthError;
use crate::service::AuthService;

use super::types::AuthContext;

// =============================================================================
// Auth State
// =============================================================================

/// State required by the auth extractors and handlers.
#[derive(Clone)]
pub struct AuthState {
    pub service: Arc<AuthService>,
}

impl AuthState {
    pub fn new(service: Arc<AuthService>) -> Self {
        Self { service }
    }
}

// =============================================================================
// Bearer Auth Extractor
// =============================================================================

/// Requires a valid access token in `Authorization: Bearer <token>`.
pub struct BearerAuth(pub AuthContext);

impl<S> FromRequestParts<S> for BearerAuth
where
    S: Send + Sync,
    AuthState: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth_state = AuthState::from_ref(state);
        let token = bearer_token(parts)?;

        let auth_context = auth_state.service.authenticate(token).map_err(|e| {
            tracing::debug!(error = %e, "Bearer token rejected");
            e
        })?;

        tracing::debug!(
            principal_id = %auth_context.principal_id,
            jti = %auth_context.jti(),
            "Token validated successfully"
        );

        Ok(BearerAuth(auth_context))
    }
}

/// Extracts the raw token from the `Authorization` header.
fn bearer_token(parts: &Parts) -> Result<&str, AuthError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::TokenMissing)?
        .to_str()
        .map_err(|_| AuthError::token_malformed("Authorization header is not valid ASCII"))?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AuthError::token_malformed("Authorization scheme must be Bearer"))?
        .trim();

    if token.is_empty() {
        return Err(AuthError::TokenMissing);
    }
    Ok(token)
}

// =============================================================================
// Staff Extractor
// =============================================================================

/// Like [`BearerAuth`], but also requires a staff role.
pub struct StaffAuth(pub AuthContext);

impl<S> FromRequestParts<S> for StaffAuth
where
    S: Send + Sync,
    AuthState: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let BearerAuth(auth_context) = BearerAuth::from_request_parts(parts, state).await?;
        auth_context.require_staff()?;
        Ok(StaffAuth(auth_context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with(header: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/patient/all");
        if let Some(value) = header {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_bearer_token_extracted() {
        let parts = parts_with(Some("Bearer abc.def.ghi"));
        assert_eq!(bearer_token(&parts).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn test_missing_header() {
        let parts = parts_with(None);
        assert!(matches!(
            bearer_token(&parts).unwrap_err(),
            AuthError::TokenMissing
        ));
    }

    #[test]
    fn test_empty_bearer() {
        let parts = parts_with(Some("Bearer   "));
        assert!(matches!(
            bearer_token(&parts).unwrap_err(),
            AuthError::TokenMissing
        ));
    }

    #[test]
    fn test_wrong_scheme() {
        let parts = parts_with(Some("Basic dXNlcjpwYXNz"));
        assert!(matches!(
            bearer_token(&parts).unwrap_err(),
            AuthError::TokenMalformed { .. }
        ));
    }
}
