//! In-memory storage backend.
//!
//! Backed by `DashMap`, so every operation takes only shard-level locks and
//! the uniqueness checks are done through the entry API. Used for tests and
//! single-node deployments without a database.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::error::AuthError;
use crate::storage::principal::{Principal, PrincipalStorage, normalize_email};
use crate::storage::refresh_token::{RefreshToken, RefreshTokenStorage};

// =============================================================================
// Principals
// =============================================================================

/// In-memory principal store.
#[derive(Debug, Default)]
pub struct InMemoryPrincipalStorage {
    by_id: DashMap<Uuid, Principal>,
    /// normalized email -> id
    by_email: DashMap<String, Uuid>,
}

impl InMemoryPrincipalStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PrincipalStorage for InMemoryPrincipalStorage {
    async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<Principal>> {
        Ok(self.by_id.get(&id).map(|p| p.value().clone()))
    }

    async fn find_by_email(&self, email: &str) -> AuthResult<Option<Principal>> {
        let Some(id) = self.by_email.get(&normalize_email(email)).map(|e| *e.value()) else {
            return Ok(None);
        };
        self.find_by_id(id).await
    }

    async fn create(&self, principal: &Principal) -> AuthResult<()> {
        let email = normalize_email(&principal.email);
        match self.by_email.entry(email) {
            Entry::Occupied(_) => Err(AuthError::invalid_request("Email is already in use")),
            Entry::Vacant(slot) => {
                match self.by_id.entry(principal.id) {
                    Entry::Occupied(_) => {
                        return Err(AuthError::invalid_request("Principal id is already in use"));
                    }
                    Entry::Vacant(id_slot) => {
                        id_slot.insert(principal.clone());
                    }
                }
                slot.insert(principal.id);
                Ok(())
            }
        }
    }

    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> AuthResult<bool> {
        Ok(match self.by_id.get_mut(&id) {
            Some(mut principal) => {
                principal.password_hash = password_hash.to_string();
                principal.updated_at = OffsetDateTime::now_utc();
                true
            }
            None => false,
        })
    }

    async fn set_active(&self, id: Uuid, active: bool) -> AuthResult<bool> {
        Ok(match self.by_id.get_mut(&id) {
            Some(mut principal) => {
                principal.active = active;
                principal.updated_at = OffsetDateTime::now_utc();
                true
            }
            None => false,
        })
    }

    async fn delete(&self, id: Uuid) -> AuthResult<bool> {
        match self.by_id.remove(&id) {
            Some((_, principal)) => {
                self.by_email.remove(&normalize_email(&principal.email));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn count(&self) -> AuthResult<u64> {
        Ok(self.by_id.len() as u64)
    }
}

// =============================================================================
// Refresh Tokens
// =============================================================================

/// In-memory refresh token store keyed by token hash.
#[derive(Debug, Default)]
pub struct InMemoryRefreshTokenStorage {
    tokens: DashMap<String, RefreshToken>,
}

impl InMemoryRefreshTokenStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    fn delete_matching(&self, predicate: impl Fn(&RefreshToken) -> bool) -> u64 {
        let keys: Vec<String> = self
            .tokens
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.key().clone())
            .collect();

        keys.into_iter()
            .filter(|key| self.tokens.remove_if(key, |_, t| predicate(t)).is_some())
            .count() as u64
    }
}

#[async_trait]
impl RefreshTokenStorage for InMemoryRefreshTokenStorage {
    async fn create(&self, token: &RefreshToken) -> AuthResult<bool> {
        match self.tokens.entry(token.token_hash.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(token.clone());
                Ok(true)
            }
        }
    }

    async fn find_by_hash(&self, token_hash: &str) -> AuthResult<Option<RefreshToken>> {
        Ok(self.tokens.get(token_hash).map(|t| t.value().clone()))
    }

    async fn delete(&self, token_hash: &str) -> AuthResult<bool> {
        Ok(self.tokens.remove(token_hash).is_some())
    }

    async fn delete_by_principal(&self, principal_id: Uuid) -> AuthResult<u64> {
        Ok(self.delete_matching(|t| t.principal_id == principal_id))
    }

    async fn delete_by_principal_except(
        &self,
        principal_id: Uuid,
        keep: Uuid,
    ) -> AuthResult<u64> {
        Ok(self.delete_matching(|t| t.principal_id == principal_id && t.id != keep))
    }

    async fn cleanup_expired(&self) -> AuthResult<u64> {
        let now = OffsetDateTime::now_utc();
        Ok(self.delete_matching(|t| t.is_expired_at(now)))
    }

    async fn list_by_principal(&self, principal_id: Uuid) -> AuthResult<Vec<RefreshToken>> {
        let now = OffsetDateTime::now_utc();
        let mut tokens: Vec<RefreshToken> = self
            .tokens
            .iter()
            .filter(|t| t.principal_id == principal_id && !t.is_expired_at(now))
            .map(|t| t.value().clone())
            .collect();
        tokens.sort_by_key(|t| t.created_at);
        Ok(tokens)
    }
}
