//! Storage traits for authentication data.
//!
//! This module defines storage interfaces for:
//!
//! - Principals (accounts with password hashes and roles)
//! - Refresh tokens
//!
//! # Implementations
//!
//! - [`memory`] - `DashMap` backed, in-process
//! - `nutricare-auth-postgres` - PostgreSQL storage backend

pub mod memory;
pub mod principal;
pub mod refresh_token;

pub use memory::{InMemoryPrincipalStorage, InMemoryRefreshTokenStorage};
pub use principal::{
    Principal, PrincipalStorage, ROLE_ADMIN, ROLE_NUTRITIONIST, ROLE_PATIENT, STAFF_ROLES,
    normalize_email,
};
pub use refresh_token::{RefreshToken, RefreshTokenStorage};

use std::future::Future;
use std::time::Duration;

use crate::AuthResult;
use crate::error::AuthError;

/// Runs a storage call with an upper bound on its duration.
///
/// Exceeding `timeout` yields `AuthError::Unavailable`, which is transient.
pub(crate) async fn bounded<T, F>(timeout: Duration, operation: &'static str, fut: F) -> AuthResult<T>
where
    F: Future<Output = AuthResult<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                operation,
                timeout_ms = timeout.as_millis() as u64,
                "Storage call timed out"
            );
            Err(AuthError::unavailable(format!(
                "{operation} timed out after {}ms",
                timeout.as_millis()
            )))
        }
    }
}
