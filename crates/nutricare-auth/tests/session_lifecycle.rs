use std::collections::HashSet;
use std::sync::Arc;

use nutricare_auth::storage::ROLE_PATIENT;
use nutricare_auth::{
    AuthConfig, AuthError, AuthService, InMemoryPrincipalStorage, InMemoryRefreshTokenStorage,
    Registration, SessionPolicy,
};

fn hmac_config() -> AuthConfig {
    let mut config = AuthConfig::default();
    config.signing.algorithm = "HS256".to_string();
    config.signing.secret = Some("integration-test-secret-0123456789abcdef".to_string());
    config
}

async fn service_with_patient(config: &AuthConfig) -> (Arc<AuthService>, uuid::Uuid) {
    let service = AuthService::from_config(
        config,
        Arc::new(InMemoryPrincipalStorage::new()),
        Arc::new(InMemoryRefreshTokenStorage::new()),
    )
    .expect("build service");
    let principal = service
        .register(Registration::new(
            "a@x.com",
            "correct",
            vec![ROLE_PATIENT.to_string()],
        ))
        .await
        .expect("register");
    (Arc::new(service), principal.id)
}

#[tokio::test]
async fn concurrent_logins_never_share_a_refresh_token() {
    let (service, principal_id) = service_with_patient(&hmac_config()).await;

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.login("a@x.com", "correct").await })
        })
        .collect();

    let mut tokens = HashSet::new();
    for handle in handles {
        let login = handle.await.expect("join").expect("login");
        assert!(tokens.insert(login.refresh_token));
    }

    assert_eq!(tokens.len(), 16);
    assert_eq!(
        service.list_sessions(principal_id).await.unwrap().len(),
        16
    );
}

#[tokio::test]
async fn concurrent_refreshes_of_one_token_all_succeed_without_rotation() {
    let (service, principal_id) = service_with_patient(&hmac_config()).await;
    let login = service.login("a@x.com", "correct").await.unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = Arc::clone(&service);
            let token = login.refresh_token.clone();
            tokio::spawn(async move { service.refresh(&token).await })
        })
        .collect();

    for handle in handles {
        let refreshed = handle.await.unwrap().unwrap();
        let claims = service.jwt().validate(&refreshed.access_token).unwrap();
        assert_eq!(claims.principal_id().unwrap(), principal_id);
    }
}

#[tokio::test]
async fn concurrent_rotation_of_one_token_has_a_single_winner() {
    let mut config = hmac_config();
    config.refresh_token_rotation = true;
    let (service, principal_id) = service_with_patient(&config).await;
    let login = service.login("a@x.com", "correct").await.unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = Arc::clone(&service);
            let token = login.refresh_token.clone();
            tokio::spawn(async move { service.refresh(&token).await })
        })
        .collect();

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(AuthError::TokenNotFound) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(winners, 1);
    assert_eq!(service.list_sessions(principal_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn full_session_lifecycle() {
    let mut config = hmac_config();
    config.session_policy = SessionPolicy::Single;
    let (service, principal_id) = service_with_patient(&config).await;

    // Anonymous -> Authenticated
    let login = service.login("a@x.com", "correct").await.unwrap();
    let ctx = service.authenticate(&login.access_token).unwrap();
    assert_eq!(ctx.principal_id, principal_id);
    assert_eq!(ctx.roles(), &[ROLE_PATIENT.to_string()]);

    // Refreshing
    let refreshed = service.refresh(&login.refresh_token).await.unwrap();
    assert_eq!(refreshed.refresh_token, login.refresh_token);

    // New login on another device replaces the session
    let second = service.login("a@x.com", "correct").await.unwrap();
    assert!(matches!(
        service.refresh(&login.refresh_token).await,
        Err(AuthError::TokenNotFound)
    ));

    // Revoked -> Anonymous
    assert_eq!(service.logout(principal_id).await.unwrap(), 1);
    assert!(matches!(
        service.refresh(&second.refresh_token).await,
        Err(AuthError::TokenNotFound)
    ));
    assert_eq!(service.cleanup_expired().await.unwrap(), 0);
}
