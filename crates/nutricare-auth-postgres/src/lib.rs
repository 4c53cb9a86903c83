//! PostgreSQL storage backend for NutriCare auth.
//!
//! Provides persistent storage for:
//!
//! - Principals (login identities with password hash and roles)
//! - Refresh tokens (stored by SHA-256 hash, never in plain text)
//!
//! # Example
//!
//! ```ignore
//! use nutricare_auth_postgres::PostgresAuthStorage;
//!
//! let storage = PostgresAuthStorage::connect("postgres://localhost/nutricare").await?;
//! storage.migrate().await?;
//!
//! let service = AuthService::from_config(&config, storage.principals(), storage.refresh_tokens())?;
//! ```

pub mod principal;
pub mod refresh_token;

use std::sync::Arc;

use nutricare_auth::AuthError;
use sqlx_core::pool::Pool;
use sqlx_core::query::query;
use sqlx_postgres::Postgres;

/// PostgreSQL connection pool type alias.
pub type PgPool = Pool<Postgres>;

pub use principal::PostgresPrincipalStorage;
pub use refresh_token::PostgresRefreshTokenStorage;

// =============================================================================
// Error Types
// =============================================================================

/// Failure of a PostgreSQL auth storage call.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx_core::Error),

    /// An insert hit a unique constraint.
    #[error("duplicate record: {0}")]
    Conflict(String),

    /// A stored value does not map back to the domain type.
    #[error("corrupt row: {0}")]
    CorruptRow(String),
}

impl StorageError {
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    #[must_use]
    pub fn corrupt_row(message: impl Into<String>) -> Self {
        Self::CorruptRow(message.into())
    }

    /// Maps an insert failure, turning unique violations into `Conflict`.
    pub(crate) fn from_insert(err: sqlx_core::Error, conflict: impl FnOnce() -> String) -> Self {
        match err {
            sqlx_core::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                Self::Conflict(conflict())
            }
            other => Self::Database(other),
        }
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Pool exhaustion and lost connections; constraint and data errors are permanent.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Database(
                sqlx_core::Error::PoolTimedOut
                    | sqlx_core::Error::PoolClosed
                    | sqlx_core::Error::Io(_)
                    | sqlx_core::Error::WorkerCrashed
            )
        )
    }
}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Conflict(message) => AuthError::invalid_request(message),
            err if err.is_transient() => AuthError::unavailable(err.to_string()),
            err => AuthError::storage(err.to_string()),
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

// =============================================================================
// Schema
// =============================================================================

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS principal (
        id UUID PRIMARY KEY,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        roles TEXT[] NOT NULL DEFAULT '{}',
        active BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS refresh_token (
        id UUID PRIMARY KEY,
        token_hash TEXT NOT NULL,
        principal_id UUID NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        expires_at TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS refresh_token_hash_idx ON refresh_token (token_hash)",
    "CREATE INDEX IF NOT EXISTS refresh_token_principal_idx ON refresh_token (principal_id)",
    "CREATE INDEX IF NOT EXISTS refresh_token_expires_idx ON refresh_token (expires_at)",
];

// =============================================================================
// Combined Storage
// =============================================================================

/// PostgreSQL auth storage.
///
/// Owns the pool and hands out `Arc<dyn ...>` storages for the auth service.
#[derive(Clone)]
pub struct PostgresAuthStorage {
    pool: Arc<PgPool>,
}

impl PostgresAuthStorage {
    /// Create a new storage instance with the given connection pool.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Create a new storage instance by connecting to the database.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        use sqlx_core::pool::PoolOptions;
        let pool = PoolOptions::<Postgres>::new().connect(database_url).await?;
        Ok(Self::new(Arc::new(pool)))
    }

    /// Create the auth tables and indexes if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if any DDL statement fails.
    pub async fn migrate(&self) -> StorageResult<()> {
        for statement in SCHEMA {
            query(statement).execute(&*self.pool).await?;
        }
        tracing::info!("Auth schema is up to date");
        Ok(())
    }

    /// Get a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // -------------------------------------------------------------------------
    // Storage Accessors
    // -------------------------------------------------------------------------

    /// Principal storage backed by this pool.
    #[must_use]
    pub fn principals(&self) -> Arc<PostgresPrincipalStorage> {
        Arc::new(PostgresPrincipalStorage::new(Arc::clone(&self.pool)))
    }

    /// Refresh token storage backed by this pool.
    #[must_use]
    pub fn refresh_tokens(&self) -> Arc<PostgresRefreshTokenStorage> {
        Arc::new(PostgresRefreshTokenStorage::new(Arc::clone(&self.pool)))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_maps_to_invalid_request() {
        let err = StorageError::conflict("Email is already in use");
        assert!(err.is_conflict());
        assert!(!err.is_transient());

        let auth: AuthError = err.into();
        assert!(matches!(auth, AuthError::InvalidRequest { .. }));
        assert_eq!(auth.to_string(), "Invalid request: Email is already in use");
    }

    #[test]
    fn pool_timeout_is_transient() {
        let err = StorageError::from(sqlx_core::Error::PoolTimedOut);
        assert!(err.is_transient());

        let auth: AuthError = err.into();
        assert!(matches!(auth, AuthError::Unavailable { .. }));
        assert!(auth.is_transient());
    }

    #[test]
    fn permanent_failures_become_storage_errors() {
        for err in [
            StorageError::from(sqlx_core::Error::RowNotFound),
            StorageError::corrupt_row("negative count"),
        ] {
            assert!(!err.is_transient());
            let auth: AuthError = err.into();
            assert!(matches!(auth, AuthError::Storage { .. }));
            assert!(auth.is_server_error());
        }
    }

    #[test]
    fn schema_statements_are_idempotent() {
        for statement in SCHEMA {
            assert!(statement.contains("IF NOT EXISTS"), "{statement}");
        }
    }
}
