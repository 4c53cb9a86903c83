//! Error response handling for authentication.
//!
//! Implements `IntoResponse` for `AuthError`. Bodies are
//! `{"error": <code>, "message": <text>}`; 401 responses carry a
//! `WWW-Authenticate: Bearer` challenge.

use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::error::AuthError;

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = status_code(&self);
        let code = self.error_code();

        // Never leak storage or configuration details to clients.
        let message = if status.is_server_error() && !matches!(self, AuthError::Unavailable { .. })
        {
            tracing::error!(error = %self, category = %self.category(), "Auth request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let mut headers = HeaderMap::new();
        if status == StatusCode::UNAUTHORIZED {
            let www_auth = build_www_authenticate_header(code, &message);
            if let Ok(value) = HeaderValue::from_str(&www_auth) {
                headers.insert(header::WWW_AUTHENTICATE, value);
            }
        }

        (status, headers, Json(error_body(code, &message))).into_response()
    }
}

/// HTTP status for an auth error.
#[must_use]
pub fn status_code(error: &AuthError) -> StatusCode {
    match error {
        AuthError::InvalidCredentials
        | AuthError::TokenMissing
        | AuthError::TokenMalformed { .. }
        | AuthError::BadSignature
        | AuthError::AccessTokenExpired => StatusCode::UNAUTHORIZED,
        AuthError::TokenNotFound | AuthError::TokenExpired | AuthError::Forbidden { .. } => {
            StatusCode::FORBIDDEN
        }
        AuthError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
        AuthError::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        AuthError::Storage { .. } | AuthError::Configuration { .. } | AuthError::Internal { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Standard error body.
#[must_use]
pub fn error_body(code: &str, message: &str) -> serde_json::Value {
    json!({
        "error": code,
        "message": message,
    })
}

/// Builds the WWW-Authenticate header value for 401 responses.
///
/// Format: `Bearer realm="nutricare", error="...", error_description="..."`
fn build_www_authenticate_header(error: &str, description: &str) -> String {
    let escaped_desc = description.replace('"', "\\\"");
    format!(
        "Bearer realm=\"nutricare\", error=\"{}\", error_description=\"{}\"",
        error, escaped_desc
    )
}
