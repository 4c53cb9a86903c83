//! # nutricare-auth
//!
//! Authentication for the NutriCare patient service.
//!
//! This crate provides:
//! - Argon2id credential verification
//! - JWT access token signing and validation
//! - Opaque, hashed refresh tokens with expiry and revocation
//! - The login/refresh/logout session lifecycle
//! - Axum extractors and handlers for the auth endpoints
//!
//! ## Modules
//!
//! - [`config`] - Token lifetimes, session policy, signing key settings
//! - [`credentials`] - Password hashing and the credential store
//! - [`token`] - Access token signer and refresh token store
//! - [`service`] - The [`AuthService`] tying them together
//! - [`storage`] - Storage traits and the in-memory backend
//! - [`middleware`] - Bearer extractors and error responses
//! - [`http`] - Axum handlers for login, refresh and logout

pub mod config;
pub mod credentials;
pub mod error;
pub mod http;
pub mod middleware;
pub mod service;
pub mod storage;
pub mod token;

pub use config::{AuthConfig, ConfigError, SessionPolicy, SigningConfig};
pub use credentials::{CredentialStore, Registration, hash_password, verify_password};
pub use error::{AuthError, ErrorCategory};
pub use http::{auth_routes, login_handler, logout_handler, refresh_token_handler};
pub use middleware::{AuthContext, AuthState, BearerAuth, StaffAuth};
pub use service::{AuthService, LoginResponse, TokenRefreshResponse};
pub use storage::{
    InMemoryPrincipalStorage, InMemoryRefreshTokenStorage, Principal, PrincipalStorage,
    RefreshToken, RefreshTokenStorage,
};
pub use token::{AccessTokenClaims, JwtError, JwtService, RefreshTokenStore, SigningKey};

/// Type alias for authentication results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use nutricare_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::config::{AuthConfig, ConfigError, SessionPolicy};
    pub use crate::error::{AuthError, ErrorCategory};
    pub use crate::middleware::{AuthContext, AuthState, BearerAuth, StaffAuth};
    pub use crate::service::AuthService;
    pub use crate::storage::{
        Principal, PrincipalStorage, ROLE_ADMIN, ROLE_NUTRITIONIST, ROLE_PATIENT,
        RefreshTokenStorage,
    };
}
