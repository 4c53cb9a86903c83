use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use nutricare_auth::AuthError;
use nutricare_auth::middleware::error_body;

use super::repository::RepositoryError;
use crate::resilience::Degraded;

/// Error returned by the patient handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("{0}")]
    Degraded(Degraded),
}

impl From<Degraded> for ApiError {
    fn from(degraded: Degraded) -> Self {
        Self::Degraded(degraded)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Auth(e) => e.into_response(),
            Self::Degraded(d) => d.into_response(),
            Self::Repository(e) => {
                let (status, code) = match &e {
                    RepositoryError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
                    RepositoryError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
                    RepositoryError::Unavailable(_) => {
                        (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
                    }
                };
                (status, Json(error_body(code, &e.to_string()))).into_response()
            }
        }
    }
}
