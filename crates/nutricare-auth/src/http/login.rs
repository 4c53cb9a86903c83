//! Login and logout handlers.
//!
//! # Request Format
//!
//! ```text
//! POST /patient/login
//! Content-Type: application/json
//!
//! {"email": "a@x.com", "password": "correct"}
//! ```
//!
//! # Response
//!
//! `200` with `{accessToken, refreshToken, type: "Bearer", id, email, roles, expiresIn}`,
//! or `401` for any credential mismatch.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use crate::AuthResult;
use crate::error::AuthError;
use crate::middleware::{AuthState, BearerAuth};
use crate::service::LoginResponse;

/// Login request body.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

impl LoginRequest {
    /// # Errors
    ///
    /// `AuthError::InvalidRequest` if a field is blank.
    pub fn validate(&self) -> AuthResult<()> {
        if self.email.trim().is_empty() {
            return Err(AuthError::invalid_request("email is required"));
        }
        if self.password.is_empty() {
            return Err(AuthError::invalid_request("password is required"));
        }
        Ok(())
    }
}

/// `POST /login`
pub async fn login_handler(
    State(state): State<AuthState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, AuthError> {
    let Json(request) = body.map_err(|e| AuthError::invalid_request(e.body_text()))?;
    request.validate()?;

    let response = state
        .service
        .login(&request.email, &request.password)
        .await
        .map_err(|e| {
            if e.is_client_error() {
                tracing::info!(category = %e.category(), "Login rejected");
            }
            e
        })?;
    Ok(Json(response))
}

/// `POST /logout`
///
/// Revokes every refresh token of the caller. Outstanding access tokens stay
/// valid until they expire.
pub async fn logout_handler(
    State(state): State<AuthState>,
    BearerAuth(auth): BearerAuth,
) -> Result<impl IntoResponse, AuthError> {
    state.service.logout(auth.principal_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_request_validation() {
        let ok = LoginRequest {
            email: "a@x.com".into(),
            password: "correct".into(),
        };
        assert!(ok.validate().is_ok());

        let no_email = LoginRequest {
            email: " ".into(),
            password: "correct".into(),
        };
        assert!(matches!(
            no_email.validate(),
            Err(AuthError::InvalidRequest { .. })
        ));

        let no_password = LoginRequest {
            email: "a@x.com".into(),
            password: String::new(),
        };
        assert!(no_password.validate().is_err());
    }

    #[test]
    fn test_login_request_deserializes_missing_fields() {
        let request: LoginRequest = serde_json::from_str(r#"{"email":"a@x.com"}"#).unwrap();
        assert!(request.password.is_empty());
        assert!(request.validate().is_err());
    }
}
