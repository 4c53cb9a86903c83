//! Authentication context types.
//!
//! An [`AuthContext`] is built from a validated access token and passed
//! explicitly to handlers and services. Nothing is stored in task-local or
//! global state.

use std::sync::Arc;

use uuid::Uuid;

use crate::AuthResult;
use crate::error::AuthError;
use crate::storage::principal::STAFF_ROLES;
use crate::token::jwt::AccessTokenClaims;

/// Authenticated caller, derived from a validated access token.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Principal id parsed from `sub`.
    pub principal_id: Uuid,

    /// Validated claims.
    pub token_claims: Arc<AccessTokenClaims>,
}

impl AuthContext {
    /// Builds a context from validated claims.
    ///
    /// # Errors
    ///
    /// `AuthError::TokenMalformed` if `sub` is not a principal id.
    pub fn from_claims(claims: AccessTokenClaims) -> AuthResult<Self> {
        let principal_id = claims.principal_id()?;
        Ok(Self {
            principal_id,
            token_claims: Arc::new(claims),
        })
    }

    #[must_use]
    pub fn email(&self) -> &str {
        &self.token_claims.email
    }

    #[must_use]
    pub fn roles(&self) -> &[String] {
        &self.token_claims.roles
    }

    #[must_use]
    pub fn jti(&self) -> &str {
        &self.token_claims.jti
    }

    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.token_claims.roles.iter().any(|r| r == role)
    }

    #[must_use]
    pub fn has_any_role(&self, roles: &[&str]) -> bool {
        roles.iter().any(|role| self.has_role(role))
    }

    /// Returns `true` if the caller is an administrator or nutritionist.
    #[must_use]
    pub fn is_staff(&self) -> bool {
        self.has_any_role(STAFF_ROLES)
    }

    /// Returns `true` if the caller is `owner_id` or staff.
    #[must_use]
    pub fn can_access(&self, owner_id: Uuid) -> bool {
        self.principal_id == owner_id || self.is_staff()
    }

    /// # Errors
    ///
    /// `AuthError::Forbidden` unless the caller is staff.
    pub fn require_staff(&self) -> AuthResult<()> {
        if self.is_staff() {
            Ok(())
        } else {
            Err(AuthError::forbidden("Staff role required"))
        }
    }

    /// # Errors
    ///
    /// `AuthError::Forbidden` unless the caller is `owner_id` or staff.
    pub fn require_owner_or_staff(&self, owner_id: Uuid) -> AuthResult<()> {
        if self.can_access(owner_id) {
            Ok(())
        } else {
            Err(AuthError::forbidden("Not allowed to access this record"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::principal::{ROLE_NUTRITIONIST, ROLE_PATIENT};

    fn context(roles: &[&str]) -> AuthContext {
        let claims = AccessTokenClaims {
            iss: "nutricare".to_string(),
            sub: Uuid::new_v4().to_string(),
            email: "a@x.com".to_string(),
            roles: roles.iter().map(ToString::to_string).collect(),
            iat: 0,
            exp: 0,
            jti: "jti".to_string(),
        };
        AuthContext::from_claims(claims).unwrap()
    }

    #[test]
    fn test_patient_can_only_access_self() {
        let ctx = context(&[ROLE_PATIENT]);
        assert!(!ctx.is_staff());
        assert!(ctx.can_access(ctx.principal_id));
        assert!(!ctx.can_access(Uuid::new_v4()));
        assert!(ctx.require_owner_or_staff(ctx.principal_id).is_ok());
        assert!(matches!(
            ctx.require_staff(),
            Err(AuthError::Forbidden { .. })
        ));
    }

    #[test]
    fn test_staff_can_access_anyone() {
        let ctx = context(&[ROLE_NUTRITIONIST]);
        assert!(ctx.is_staff());
        assert!(ctx.can_access(Uuid::new_v4()));
        assert!(ctx.require_staff().is_ok());
    }

    #[test]
    fn test_from_claims_rejects_non_uuid_subject() {
        let claims = AccessTokenClaims {
            iss: "nutricare".to_string(),
            sub: "client-42".to_string(),
            email: String::new(),
            roles: Vec::new(),
            iat: 0,
            exp: 0,
            jti: String::new(),
        };
        assert!(matches!(
            AuthContext::from_claims(claims),
            Err(AuthError::TokenMalformed { .. })
        ));
    }
}
