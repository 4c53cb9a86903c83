//! Password hashing and the credential store.
//!
//! # Security
//!
//! - Hashing uses Argon2id with default parameters and a random salt (OsRng)
//! - Hashes are stored as PHC strings
//! - Verification of an unknown email still runs Argon2 against a fixed
//!   dummy hash, so response time does not reveal which half was wrong
//! - Argon2 runs on the blocking thread pool

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use uuid::Uuid;

use crate::AuthResult;
use crate::error::AuthError;
use crate::storage::bounded;
use crate::storage::principal::{Principal, PrincipalStorage, normalize_email};

/// Minimum accepted password length in characters.
pub const MIN_PASSWORD_LEN: usize = 6;

// =============================================================================
// Password Hashing
// =============================================================================

/// Hash a password for storage using Argon2id.
///
/// # Errors
///
/// Returns `argon2::password_hash::Error` if hashing fails (rare).
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a stored Argon2 hash.
///
/// Returns `Ok(false)` on mismatch and `Err` only if the hash is not a valid
/// PHC string.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, argon2::password_hash::Error> {
    let parsed_hash = PasswordHash::new(hash)?;
    let result = Argon2::default().verify_password(password.as_bytes(), &parsed_hash);
    Ok(result.is_ok())
}

fn dummy_hash() -> &'static str {
    static DUMMY: OnceLock<String> = OnceLock::new();
    DUMMY.get_or_init(|| hash_password("nutricare-timing-equalizer").unwrap_or_default())
}

async fn hash_blocking(password: String) -> AuthResult<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AuthError::internal(format!("password hashing task failed: {e}")))?
        .map_err(|e| AuthError::internal(format!("password hashing failed: {e}")))
}

async fn verify_blocking(password: String, hash: String) -> AuthResult<bool> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| AuthError::internal(format!("password verification task failed: {e}")))?
        .map_err(|e| AuthError::internal(format!("stored password hash is invalid: {e}")))
}

// =============================================================================
// Registration Request
// =============================================================================

/// Input for creating a principal.
#[derive(Debug, Clone)]
pub struct Registration {
    /// Fixed id, e.g. to mirror an existing patient record. Random if `None`.
    pub id: Option<Uuid>,
    pub email: String,
    pub password: String,
    pub roles: Vec<String>,
}

impl Registration {
    #[must_use]
    pub fn new(email: impl Into<String>, password: impl Into<String>, roles: Vec<String>) -> Self {
        Self {
            id: None,
            email: email.into(),
            password: password.into(),
            roles,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }

    /// Checks the request shape.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidRequest` naming the first offending field.
    pub fn validate(&self) -> AuthResult<()> {
        validate_email(&self.email)?;
        validate_password(&self.password)?;
        if self.roles.is_empty() {
            return Err(AuthError::invalid_request("at least one role is required"));
        }
        Ok(())
    }
}

/// Rejects blank or obviously malformed emails.
pub fn validate_email(email: &str) -> AuthResult<()> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(AuthError::invalid_request("email must be a valid address")),
    }
}

/// Rejects passwords shorter than [`MIN_PASSWORD_LEN`].
pub fn validate_password(password: &str) -> AuthResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::invalid_request(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

// =============================================================================
// Credential Store
// =============================================================================

/// Verifies email/password pairs and manages principals.
#[derive(Clone)]
pub struct CredentialStore {
    principals: Arc<dyn PrincipalStorage>,
    operation_timeout: Duration,
}

impl CredentialStore {
    #[must_use]
    pub fn new(principals: Arc<dyn PrincipalStorage>, operation_timeout: Duration) -> Self {
        Self {
            principals,
            operation_timeout,
        }
    }

    /// Verifies a password for an email.
    ///
    /// # Errors
    ///
    /// `AuthError::InvalidCredentials` for an unknown email, a wrong password
    /// or an inactive principal. Storage failures propagate unchanged.
    pub async fn verify(&self, email: &str, password: &str) -> AuthResult<Principal> {
        let email = normalize_email(email);
        let found = bounded(
            self.operation_timeout,
            "principal lookup",
            self.principals.find_by_email(&email),
        )
        .await?;

        let Some(principal) = found else {
            let _ = verify_blocking(password.to_string(), dummy_hash().to_string()).await;
            tracing::debug!("Login attempt for unknown email");
            return Err(AuthError::InvalidCredentials);
        };

        let matches =
            verify_blocking(password.to_string(), principal.password_hash.clone()).await?;
        if !matches {
            tracing::debug!(principal_id = %principal.id, "Password mismatch");
            return Err(AuthError::InvalidCredentials);
        }

        if !principal.active {
            tracing::debug!(principal_id = %principal.id, "Login attempt for inactive principal");
            return Err(AuthError::InvalidCredentials);
        }

        Ok(principal)
    }

    /// Creates a principal.
    ///
    /// # Errors
    ///
    /// `AuthError::InvalidRequest` if validation fails or the email is taken.
    pub async fn register(&self, registration: Registration) -> AuthResult<Principal> {
        registration.validate()?;

        let email = normalize_email(&registration.email);
        let existing = bounded(
            self.operation_timeout,
            "principal lookup",
            self.principals.find_by_email(&email),
        )
        .await?;
        if existing.is_some() {
            return Err(AuthError::invalid_request("Email is already in use"));
        }

        let hash = hash_blocking(registration.password).await?;
        let mut principal = Principal::new(email, hash).with_roles(registration.roles);
        if let Some(id) = registration.id {
            principal = principal.with_id(id);
        }

        bounded(
            self.operation_timeout,
            "principal create",
            self.principals.create(&principal),
        )
        .await?;

        tracing::info!(principal_id = %principal.id, roles = ?principal.roles, "Principal registered");
        Ok(principal)
    }

    /// Replaces a principal's password.
    ///
    /// # Errors
    ///
    /// `AuthError::InvalidRequest` if the password is too short or the
    /// principal does not exist.
    pub async fn change_password(&self, id: Uuid, new_password: &str) -> AuthResult<()> {
        validate_password(new_password)?;
        let hash = hash_blocking(new_password.to_string()).await?;
        let updated = bounded(
            self.operation_timeout,
            "principal update",
            self.principals.update_password_hash(id, &hash),
        )
        .await?;
        if !updated {
            return Err(AuthError::invalid_request("Principal not found"));
        }
        tracing::info!(principal_id = %id, "Password changed");
        Ok(())
    }

    pub async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<Principal>> {
        bounded(
            self.operation_timeout,
            "principal lookup",
            self.principals.find_by_id(id),
        )
        .await
    }

    pub async fn find_by_email(&self, email: &str) -> AuthResult<Option<Principal>> {
        let email = normalize_email(email);
        bounded(
            self.operation_timeout,
            "principal lookup",
            self.principals.find_by_email(&email),
        )
        .await
    }

    /// Deletes a principal. Returns `false` if it did not exist.
    pub async fn delete(&self, id: Uuid) -> AuthResult<bool> {
        bounded(
            self.operation_timeout,
            "principal delete",
            self.principals.delete(id),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::InMemoryPrincipalStorage;
    use crate::storage::principal::ROLE_PATIENT;

    fn store() -> CredentialStore {
        CredentialStore::new(
            Arc::new(InMemoryPrincipalStorage::new()),
            Duration::from_secs(5),
        )
    }

    fn patient(email: &str, password: &str) -> Registration {
        Registration::new(email, password, vec![ROLE_PATIENT.to_string()])
    }

    #[test]
    fn test_hash_password_format() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("wrong horse", &hash).unwrap());
    }

    #[test]
    fn test_hash_password_uses_random_salt() {
        let first = hash_password("same").unwrap();
        let second = hash_password("same").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_verify_password_invalid_hash() {
        assert!(verify_password("x", "not-a-phc-string").is_err());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("a@x.com").is_ok());
        assert!(validate_email("").is_err());
        assert!(validate_email("@x.com").is_err());
        assert!(validate_email("a@localhost").is_err());
    }

    #[test]
    fn test_registration_requires_role() {
        let registration = Registration::new("a@x.com", "correct", Vec::new());
        assert!(matches!(
            registration.validate(),
            Err(AuthError::InvalidRequest { .. })
        ));
    }

    #[tokio::test]
    async fn test_verify_valid_credentials() {
        let store = store();
        let registered = store.register(patient("a@x.com", "correct")).await.unwrap();

        let principal = store.verify("A@x.com", "correct").await.unwrap();
        assert_eq!(principal.id, registered.id);
        assert_eq!(principal.roles, vec![ROLE_PATIENT.to_string()]);
    }

    #[tokio::test]
    async fn test_verify_wrong_password_and_unknown_email_look_the_same() {
        let store = store();
        store.register(patient("a@x.com", "correct")).await.unwrap();

        let wrong_password = store.verify("a@x.com", "incorrect").await.unwrap_err();
        let unknown_email = store.verify("b@x.com", "correct").await.unwrap_err();
        assert!(matches!(wrong_password, AuthError::InvalidCredentials));
        assert!(matches!(unknown_email, AuthError::InvalidCredentials));
        assert_eq!(wrong_password.to_string(), unknown_email.to_string());
    }

    #[tokio::test]
    async fn test_verify_inactive_principal() {
        let principals = Arc::new(InMemoryPrincipalStorage::new());
        let store = CredentialStore::new(principals.clone(), Duration::from_secs(5));
        let principal = store.register(patient("a@x.com", "correct")).await.unwrap();
        principals.set_active(principal.id, false).await.unwrap();

        let err = store.verify("a@x.com", "correct").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_register_duplicate_email() {
        let store = store();
        store.register(patient("a@x.com", "correct")).await.unwrap();
        let err = store
            .register(patient("A@X.com", "another"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidRequest { .. }));
    }

    #[tokio::test]
    async fn test_register_with_fixed_id() {
        let store = store();
        let id = Uuid::new_v4();
        let principal = store
            .register(patient("a@x.com", "correct").with_id(id))
            .await
            .unwrap();
        assert_eq!(principal.id, id);
        assert!(store.find_by_id(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_change_password() {
        let store = store();
        let principal = store.register(patient("a@x.com", "correct")).await.unwrap();

        store.change_password(principal.id, "brand-new").await.unwrap();
        assert!(store.verify("a@x.com", "correct").await.is_err());
        assert!(store.verify("a@x.com", "brand-new").await.is_ok());

        let err = store
            .change_password(Uuid::new_v4(), "brand-new")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidRequest { .. }));
    }
}
