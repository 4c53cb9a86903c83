//! Token issuance and validation.
//!
//! This module provides:
//!
//! - Access token signing and validation (JWT)
//! - Refresh token creation, lookup and expiry handling

pub mod jwt;
pub mod refresh;

pub use jwt::{AccessToken, AccessTokenClaims, JwtError, JwtService, SigningAlgorithm, SigningKey};
pub use refresh::{IssuedRefreshToken, RefreshTokenStore};
