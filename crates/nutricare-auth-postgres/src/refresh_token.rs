//! Refresh token storage.
//!
//! Only the SHA-256 hash of a token is stored. Inserts use
//! `ON CONFLICT DO NOTHING` so a hash collision surfaces as `Ok(false)`
//! instead of an error.

use std::sync::Arc;

use async_trait::async_trait;
use nutricare_auth::AuthResult;
use nutricare_auth::storage::{RefreshToken, RefreshTokenStorage};
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{PgPool, StorageError};

type TokenTuple = (Uuid, String, Uuid, OffsetDateTime, OffsetDateTime);

fn from_tuple(row: TokenTuple) -> RefreshToken {
    RefreshToken {
        id: row.0,
        token_hash: row.1,
        principal_id: row.2,
        created_at: row.3,
        expires_at: row.4,
    }
}

/// PostgreSQL-backed [`RefreshTokenStorage`].
#[derive(Clone)]
pub struct PostgresRefreshTokenStorage {
    pool: Arc<PgPool>,
}

impl PostgresRefreshTokenStorage {
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RefreshTokenStorage for PostgresRefreshTokenStorage {
    async fn create(&self, token: &RefreshToken) -> AuthResult<bool> {
        let result = query(
            r#"
            INSERT INTO refresh_token (id, token_hash, principal_id, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (token_hash) DO NOTHING
            "#,
        )
        .bind(token.id)
        .bind(&token.token_hash)
        .bind(token.principal_id)
        .bind(token.created_at)
        .bind(token.expires_at)
        .execute(&*self.pool)
        .await
        .map_err(StorageError::from)?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_by_hash(&self, token_hash: &str) -> AuthResult<Option<RefreshToken>> {
        let row: Option<TokenTuple> = query_as(
            r#"
            SELECT id, token_hash, principal_id, created_at, expires_at
            FROM refresh_token
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&*self.pool)
        .await
        .map_err(StorageError::from)?;

        Ok(row.map(from_tuple))
    }

    async fn delete(&self, token_hash: &str) -> AuthResult<bool> {
        let result = query("DELETE FROM refresh_token WHERE token_hash = $1")
            .bind(token_hash)
            .execute(&*self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_by_principal(&self, principal_id: Uuid) -> AuthResult<u64> {
        let result = query("DELETE FROM refresh_token WHERE principal_id = $1")
            .bind(principal_id)
            .execute(&*self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(result.rows_affected())
    }

    async fn delete_by_principal_except(
        &self,
        principal_id: Uuid,
        keep: Uuid,
    ) -> AuthResult<u64> {
        let result = query("DELETE FROM refresh_token WHERE principal_id = $1 AND id <> $2")
            .bind(principal_id)
            .bind(keep)
            .execute(&*self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(result.rows_affected())
    }

    async fn cleanup_expired(&self) -> AuthResult<u64> {
        let result = query("DELETE FROM refresh_token WHERE expires_at <= NOW()")
            .execute(&*self.pool)
            .await
            .map_err(StorageError::from)?;

        let removed = result.rows_affected();
        if removed > 0 {
            tracing::debug!(removed, "Removed expired refresh tokens");
        }
        Ok(removed)
    }

    async fn list_by_principal(&self, principal_id: Uuid) -> AuthResult<Vec<RefreshToken>> {
        let rows: Vec<TokenTuple> = query_as(
            r#"
            SELECT id, token_hash, principal_id, created_at, expires_at
            FROM refresh_token
            WHERE principal_id = $1
              AND expires_at > NOW()
            ORDER BY created_at ASC
            "#,
        )
        .bind(principal_id)
        .fetch_all(&*self.pool)
        .await
        .map_err(StorageError::from)?;

        Ok(rows.into_iter().map(from_tuple).collect())
    }
}
