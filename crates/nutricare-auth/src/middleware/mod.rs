//! HTTP middleware for authentication and authorization.
//!
//! This module provides Axum extractors for:
//!
//! - Bearer token extraction and validation
//! - Staff-only endpoints
//! - JSON error responses with `WWW-Authenticate` challenges
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
//! let auth_state = AuthState::new(auth_service);
//!
//! let app = Router::new()
//!     .route("/protected", get(protected_handler))
//!     .with_state(auth_state);
//! ```

pub mod auth;
pub mod error;
pub mod types;

pub use auth::{AuthState, BearerAuth, StaffAuth};
pub use error::{error_body, status_code};
pub use types::AuthContext;
