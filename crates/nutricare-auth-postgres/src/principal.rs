//! Principal storage.
//!
//! Emails are stored and looked up normalized. The `UNIQUE` constraint on
//! `email` is the source of truth for duplicate detection.

use std::sync::Arc;

use async_trait::async_trait;
use nutricare_auth::storage::{Principal, PrincipalStorage, normalize_email};
use nutricare_auth::AuthResult;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_core::query_scalar::query_scalar;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{PgPool, StorageError};

type PrincipalTuple = (
    Uuid,
    String,
    String,
    Vec<String>,
    bool,
    OffsetDateTime,
    OffsetDateTime,
);

fn from_tuple(row: PrincipalTuple) -> Principal {
    Principal {
        id: row.0,
        email: row.1,
        password_hash: row.2,
        roles: row.3,
        active: row.4,
        created_at: row.5,
        updated_at: row.6,
    }
}

/// PostgreSQL-backed [`PrincipalStorage`].
#[derive(Clone)]
pub struct PostgresPrincipalStorage {
    pool: Arc<PgPool>,
}

impl PostgresPrincipalStorage {
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PrincipalStorage for PostgresPrincipalStorage {
    async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<Principal>> {
        let row: Option<PrincipalTuple> = query_as(
            r#"
            SELECT id, email, password_hash, roles, active, created_at, updated_at
            FROM principal
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(StorageError::from)?;

        Ok(row.map(from_tuple))
    }

    async fn find_by_email(&self, email: &str) -> AuthResult<Option<Principal>> {
        let row: Option<PrincipalTuple> = query_as(
            r#"
            SELECT id, email, password_hash, roles, active, created_at, updated_at
            FROM principal
            WHERE email = $1
            "#,
        )
        .bind(normalize_email(email))
        .fetch_optional(&*self.pool)
        .await
        .map_err(StorageError::from)?;

        Ok(row.map(from_tuple))
    }

    async fn create(&self, principal: &Principal) -> AuthResult<()> {
        query(
            r#"
            INSERT INTO principal (id, email, password_hash, roles, active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(principal.id)
        .bind(&principal.email)
        .bind(&principal.password_hash)
        .bind(&principal.roles)
        .bind(principal.active)
        .bind(principal.created_at)
        .bind(principal.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| StorageError::from_insert(e, || "Email is already in use".to_string()))?;

        Ok(())
    }

    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> AuthResult<bool> {
        let result = query(
            r#"
            UPDATE principal
            SET password_hash = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(password_hash)
        .execute(&*self.pool)
        .await
        .map_err(StorageError::from)?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_active(&self, id: Uuid, active: bool) -> AuthResult<bool> {
        let result = query(
            r#"
            UPDATE principal
            SET active = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(active)
        .execute(&*self.pool)
        .await
        .map_err(StorageError::from)?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: Uuid) -> AuthResult<bool> {
        let result = query("DELETE FROM principal WHERE id = $1")
            .bind(id)
            .execute(&*self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(result.rows_affected() > 0)
    }

    async fn count(&self) -> AuthResult<u64> {
        let count: i64 = query_scalar("SELECT COUNT(*) FROM principal")
            .fetch_one(&*self.pool)
            .await
            .map_err(StorageError::from)?;

        let count = u64::try_from(count)
            .map_err(|_| StorageError::corrupt_row(format!("principal count {count}")))?;
        Ok(count)
    }
}
