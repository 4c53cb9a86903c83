//! Principal storage trait.
//!
//! A principal is the identity that logs in: the account record with its
//! email, password hash and roles. Implementations are provided by storage
//! backends (in-memory here, PostgreSQL in `nutricare-auth-postgres`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;

/// Administrator role.
pub const ROLE_ADMIN: &str = "ADMIN";
/// Nutritionist role.
pub const ROLE_NUTRITIONIST: &str = "NUTRITIONIST";
/// Patient role.
pub const ROLE_PATIENT: &str = "PATIENT";

/// Roles that may manage records other than their own.
pub const STAFF_ROLES: &[&str] = &[ROLE_ADMIN, ROLE_NUTRITIONIST];

// =============================================================================
// Principal Type
// =============================================================================

/// An account that can authenticate.
///
/// The `id` never changes once created; it is the `sub` of every access
/// token issued to this principal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub id: Uuid,

    /// Login name. Stored lowercased.
    pub email: String,

    /// Argon2id PHC string. Never serialized.
    #[serde(skip_serializing, default)]
    pub password_hash: String,

    #[serde(default)]
    pub roles: Vec<String>,

    pub active: bool,

    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Principal {
    /// Creates an active principal with a fresh id.
    #[must_use]
    pub fn new(email: impl Into<String>, password_hash: impl Into<String>) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            email: normalize_email(&email.into()),
            password_hash: password_hash.into(),
            roles: Vec::new(),
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the id. Used when the principal mirrors an existing record.
    #[must_use]
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    #[must_use]
    pub fn with_roles(mut self, roles: Vec<String>) -> Self {
        self.roles = roles;
        self
    }

    #[must_use]
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Returns `true` if the principal holds any staff role.
    #[must_use]
    pub fn is_staff(&self) -> bool {
        STAFF_ROLES.iter().any(|role| self.has_role(role))
    }
}

/// Canonical form of an email used for lookup and uniqueness.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

// =============================================================================
// Principal Storage Trait
// =============================================================================

#[async_trait]
pub trait PrincipalStorage: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<Principal>>;

    /// Looks up by normalized email.
    async fn find_by_email(&self, email: &str) -> AuthResult<Option<Principal>>;

    /// Inserts a new principal.
    ///
    /// # Errors
    ///
    /// Fails with `AuthError::InvalidRequest` if the email or id is taken.
    async fn create(&self, principal: &Principal) -> AuthResult<()>;

    /// Replaces the password hash and bumps `updated_at`.
    ///
    /// Returns `false` if the principal does not exist.
    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> AuthResult<bool>;

    /// Returns `false` if the principal does not exist.
    async fn set_active(&self, id: Uuid, active: bool) -> AuthResult<bool>;

    /// Returns `false` if the principal does not exist.
    async fn delete(&self, id: Uuid) -> AuthResult<bool>;

    async fn count(&self) -> AuthResult<u64>;
}
