//! HTTP handlers for the authentication endpoints.
//!
//! # Available Handlers
//!
//! - [`login_handler`] - credential login
//! - [`refresh_token_handler`] - refresh token exchange
//! - [`logout_handler`] - revoke the caller's refresh tokens

pub mod login;
pub mod refresh;

use axum::{Router, extract::FromRef, routing::post};

use crate::middleware::AuthState;

pub use login::{LoginRequest, login_handler, logout_handler};
pub use refresh::{TokenRefreshRequest, refresh_token_handler};

/// Routes for `/login`, `/refreshtoken` and `/logout`, to be nested by the caller.
pub fn auth_routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    AuthState: FromRef<S>,
{
    Router::new()
        .route("/login", post(login_handler))
        .route("/refreshtoken", post(refresh_token_handler))
        .route("/logout", post(logout_handler))
}
