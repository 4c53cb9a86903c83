//! Patient collection handlers.
//!
//! Reads go through the [`ResilientGateway`](crate::resilience::ResilientGateway)
//! and answer `503` with the degraded body when it falls back. Writes call
//! the repository directly.

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection, rejection::PathRejection},
    http::StatusCode,
    response::IntoResponse,
};
use nutricare_auth::AuthError;
use nutricare_auth::middleware::{BearerAuth, StaffAuth};
use uuid::Uuid;

use super::error::ApiError;
use super::model::{Patient, PatientUpdate, RegisterPatientRequest};
use super::repository::RepositoryError;
use crate::server::AppState;

fn path_id(path: Result<Path<Uuid>, PathRejection>) -> Result<Uuid, ApiError> {
    let Path(id) = path.map_err(|e| AuthError::invalid_request(e.body_text()))?;
    Ok(id)
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    let Json(value) = body.map_err(|e| AuthError::invalid_request(e.body_text()))?;
    Ok(value)
}

/// `GET /all` (staff)
pub async fn list_patients(
    State(state): State<AppState>,
    StaffAuth(_auth): StaffAuth,
) -> Result<Json<Vec<Patient>>, ApiError> {
    let patients = &state.patients;
    let list = state
        .gateway
        .call("patient.list", move || patients.list())
        .await?
        .into_result()?;
    Ok(Json(list))
}

/// `GET /{id}` (owner or staff)
pub async fn get_patient(
    State(state): State<AppState>,
    BearerAuth(auth): BearerAuth,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Patient>, ApiError> {
    let id = path_id(path)?;
    auth.require_owner_or_staff(id)?;

    let patients = &state.patients;
    let patient = state
        .gateway
        .call("patient.get", move || patients.find_by_id(id))
        .await?
        .into_result()?
        .ok_or(RepositoryError::NotFound(id))?;
    Ok(Json(patient))
}

/// `GET /diet-groups/{groupId}` (staff)
pub async fn list_by_diet_group(
    State(state): State<AppState>,
    StaffAuth(_auth): StaffAuth,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Vec<Patient>>, ApiError> {
    let group_id = path_id(path)?;

    let patients = &state.patients;
    let list = state
        .gateway
        .call("patient.by_diet_group", move || {
            patients.find_by_diet_group(group_id)
        })
        .await?
        .into_result()?;
    Ok(Json(list))
}

/// `POST /register` (staff)
///
/// Creates the login principal (role `PATIENT`) and the patient record under
/// one id. If the record cannot be stored the principal is removed again.
pub async fn register_patient(
    State(state): State<AppState>,
    StaffAuth(auth): StaffAuth,
    body: Result<Json<RegisterPatientRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let request = json_body(body)?;
    request.validate()?;

    let id = Uuid::new_v4();
    let service = &state.auth.service;
    let principal = service.register(request.registration(id)).await?;
    let patient = request.into_patient(principal.id, principal.email);

    let created = match state.patients.create(patient).await {
        Ok(created) => created,
        Err(e) => {
            if let Err(cleanup) = service.delete_principal(id).await {
                tracing::error!(patient.id = %id, error = %cleanup, "Failed to remove principal of unsaved patient");
            }
            return Err(e.into());
        }
    };

    tracing::info!(patient.id = %created.id, registered_by = %auth.principal_id, "Patient registered");
    Ok((StatusCode::CREATED, Json(created)))
}

/// `PUT /` (owner or staff)
pub async fn update_patient(
    State(state): State<AppState>,
    BearerAuth(auth): BearerAuth,
    body: Result<Json<PatientUpdate>, JsonRejection>,
) -> Result<Json<Patient>, ApiError> {
    let update = json_body(body)?;
    update.validate()?;
    auth.require_owner_or_staff(update.id)?;

    let mut patient = state
        .patients
        .find_by_id(update.id)
        .await?
        .ok_or(RepositoryError::NotFound(update.id))?;
    patient.apply(update);

    Ok(Json(state.patients.update(patient).await?))
}

/// `DELETE /{id}` (owner or staff)
///
/// Removes the principal together with its refresh tokens, then the record.
/// A failure before the record is gone leaves the request retryable.
pub async fn delete_patient(
    State(state): State<AppState>,
    BearerAuth(auth): BearerAuth,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let id = path_id(path)?;
    auth.require_owner_or_staff(id)?;

    if state.patients.find_by_id(id).await?.is_none() {
        return Err(RepositoryError::NotFound(id).into());
    }
    state.auth.service.delete_principal(id).await?;
    if !state.patients.delete(id).await? {
        tracing::debug!(patient.id = %id, "Patient record already removed");
    }

    tracing::info!(patient.id = %id, deleted_by = %auth.principal_id, "Patient deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use nutricare_auth::middleware::AuthState;
    use nutricare_auth::{
        AuthConfig, AuthResult, AuthService, InMemoryPrincipalStorage,
        InMemoryRefreshTokenStorage, RefreshToken, RefreshTokenStorage,
    };
    use serde_json::json;

    use super::*;
    use crate::patient::repository::InMemoryPatientRepository;
    use crate::resilience::ResilienceConfig;

    /// Refresh token storage whose bulk revocation fails while `failing` is set.
    struct FlakyRevokeStorage {
        inner: InMemoryRefreshTokenStorage,
        failing: AtomicBool,
    }

    #[async_trait]
    impl RefreshTokenStorage for FlakyRevokeStorage {
        async fn create(&self, token: &RefreshToken) -> AuthResult<bool> {
            self.inner.create(token).await
        }
        async fn find_by_hash(&self, h: &str) -> AuthResult<Option<RefreshToken>> {
            self.inner.find_by_hash(h).await
        }
        async fn delete(&self, h: &str) -> AuthResult<bool> {
            self.inner.delete(h).await
        }
        async fn delete_by_principal(&self, id: Uuid) -> AuthResult<u64> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(AuthError::storage("connection reset"));
            }
            self.inner.delete_by_principal(id).await
        }
        async fn delete_by_principal_except(&self, id: Uuid, keep: Uuid) -> AuthResult<u64> {
            self.inner.delete_by_principal_except(id, keep).await
        }
        async fn cleanup_expired(&self) -> AuthResult<u64> {
            self.inner.cleanup_expired().await
        }
        async fn list_by_principal(&self, id: Uuid) -> AuthResult<Vec<RefreshToken>> {
            self.inner.list_by_principal(id).await
        }
    }

    fn hmac_config() -> AuthConfig {
        let mut config = AuthConfig::default();
        config.signing.algorithm = "HS256".to_string();
        config.signing.secret = Some("handler-test-secret-0123456789abcdef".to_string());
        config
    }

    #[tokio::test]
    async fn failed_principal_removal_keeps_the_record_for_a_retry() {
        let tokens = Arc::new(FlakyRevokeStorage {
            inner: InMemoryRefreshTokenStorage::new(),
            failing: AtomicBool::new(false),
        });
        let service = Arc::new(
            AuthService::from_config(
                &hmac_config(),
                Arc::new(InMemoryPrincipalStorage::new()),
                tokens.clone(),
            )
            .unwrap(),
        );
        let state = AppState {
            auth: AuthState::new(Arc::clone(&service)),
            patients: Arc::new(InMemoryPatientRepository::new()),
            gateway: Arc::new(ResilienceConfig::default().gateway()),
        };

        let request: RegisterPatientRequest = serde_json::from_value(json!({
            "name": "Ana",
            "email": "a@x.com",
            "password": "correct",
        }))
        .unwrap();
        let id = Uuid::new_v4();
        let principal = service.register(request.registration(id)).await.unwrap();
        state
            .patients
            .create(request.into_patient(principal.id, principal.email))
            .await
            .unwrap();

        let login = service.login("a@x.com", "correct").await.unwrap();
        let owner = || BearerAuth(service.authenticate(&login.access_token).unwrap());

        tokens.failing.store(true, Ordering::SeqCst);
        let err = delete_patient(State(state.clone()), owner(), Ok(Path(id)))
            .await
            .unwrap_err();
        assert!(err.into_response().status().is_server_error());
        assert!(state.patients.find_by_id(id).await.unwrap().is_some());
        assert!(service.refresh(&login.refresh_token).await.is_ok());

        tokens.failing.store(false, Ordering::SeqCst);
        let status = delete_patient(State(state.clone()), owner(), Ok(Path(id)))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(state.patients.find_by_id(id).await.unwrap().is_none());
        assert!(service.login("a@x.com", "correct").await.is_err());
        assert!(matches!(
            service.refresh(&login.refresh_token).await,
            Err(AuthError::TokenNotFound)
        ));
    }
}
