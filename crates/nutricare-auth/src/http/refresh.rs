//! Refresh token exchange handler.
//!
//! ```text
//! POST /patient/refreshtoken
//! Content-Type: application/json
//!
//! {"refreshToken": "<opaque value>"}
//! ```
//!
//! `200 {accessToken, refreshToken, tokenType, expiresIn}`; `403` if the token
//! is unknown or expired.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use serde::Deserialize;

use crate::error::AuthError;
use crate::middleware::AuthState;
use crate::service::TokenRefreshResponse;

/// Refresh request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRefreshRequest {
    #[serde(default)]
    pub refresh_token: String,
}

/// `POST /refreshtoken`
pub async fn refresh_token_handler(
    State(state): State<AuthState>,
    body: Result<Json<TokenRefreshRequest>, JsonRejection>,
) -> Result<Json<TokenRefreshResponse>, AuthError> {
    let Json(request) = body.map_err(|e| AuthError::invalid_request(e.body_text()))?;
    let response = state.service.refresh(&request.refresh_token).await?;
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_uses_camel_case() {
        let request: TokenRefreshRequest =
            serde_json::from_str(r#"{"refreshToken":"abc"}"#).unwrap();
        assert_eq!(request.refresh_token, "abc");
    }
}
