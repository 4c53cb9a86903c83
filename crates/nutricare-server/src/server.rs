use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{FromRef, State},
    routing::get,
};
use nutricare_auth::storage::ROLE_ADMIN;
use nutricare_auth::{
    AuthService, AuthState, InMemoryPrincipalStorage, InMemoryRefreshTokenStorage,
    PrincipalStorage, RefreshTokenStorage, Registration, auth_routes,
};
use nutricare_auth_postgres::PostgresAuthStorage;
use serde_json::{Value, json};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::{AppConfig, StorageBackend};
use crate::patient::{InMemoryPatientRepository, PatientRepository, patient_routes};
use crate::resilience::ResilientGateway;

// =============================================================================
// Application State
// =============================================================================

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthState,
    pub patients: Arc<dyn PatientRepository>,
    pub gateway: Arc<ResilientGateway>,
}

impl FromRef<AppState> for AuthState {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

/// Build the state for `cfg`: storage backend, auth service, seeded admin.
pub async fn build_state(cfg: &AppConfig) -> anyhow::Result<AppState> {
    let (principals, refresh_tokens) = match cfg.storage.backend {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory auth storage; sessions are lost on restart");
            let principals: Arc<dyn PrincipalStorage> = Arc::new(InMemoryPrincipalStorage::new());
            let refresh_tokens: Arc<dyn RefreshTokenStorage> =
                Arc::new(InMemoryRefreshTokenStorage::new());
            (principals, refresh_tokens)
        }
        StorageBackend::Postgres => {
            let pg = cfg
                .storage
                .postgres
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("storage.postgres config is required"))?;
            let storage = PostgresAuthStorage::connect(&pg.url).await?;
            if pg.run_migrations {
                storage.migrate().await?;
            }
            tracing::info!("Connected to PostgreSQL auth storage");
            let principals: Arc<dyn PrincipalStorage> = storage.principals();
            let refresh_tokens: Arc<dyn RefreshTokenStorage> = storage.refresh_tokens();
            (principals, refresh_tokens)
        }
    };

    let service = Arc::new(AuthService::from_config(
        &cfg.auth,
        principals,
        refresh_tokens,
    )?);
    bootstrap_admin(&service, cfg).await?;

    Ok(AppState {
        auth: AuthState::new(service),
        patients: Arc::new(InMemoryPatientRepository::new()),
        gateway: Arc::new(cfg.resilience.gateway()),
    })
}

/// Register the configured admin principal unless it already exists.
async fn bootstrap_admin(service: &AuthService, cfg: &AppConfig) -> anyhow::Result<()> {
    let Some((email, password)) = cfg.bootstrap.admin() else {
        return Ok(());
    };
    if service.credentials().find_by_email(email).await?.is_some() {
        tracing::debug!(email, "Bootstrap admin already present");
        return Ok(());
    }
    let admin = service
        .register(Registration::new(
            email,
            password,
            vec![ROLE_ADMIN.to_string()],
        ))
        .await?;
    tracing::info!(principal.id = %admin.id, email = %admin.email, "Bootstrap admin created");
    Ok(())
}

// =============================================================================
// Router
// =============================================================================

pub fn build_router(state: AppState, cfg: &AppConfig) -> Router {
    let body_limit = cfg.server.body_limit_bytes;
    let patient = auth_routes::<AppState>().merge(patient_routes());

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/patient", patient)
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(|req: &axum::http::Request<_>| {
                            tracing::info_span!(
                                "http.request",
                                http.method = %req.method(),
                                http.target = %req.uri(),
                                http.status_code = tracing::field::Empty,
                            )
                        })
                        .on_response(
                            |res: &axum::http::Response<_>,
                             latency: Duration,
                             span: &tracing::Span| {
                                span.record(
                                    "http.status_code",
                                    tracing::field::display(res.status().as_u16()),
                                );
                                tracing::info!(
                                    http.status = %res.status().as_u16(),
                                    elapsed_ms = %latency.as_millis(),
                                    "request handled"
                                );
                            },
                        ),
                )
                .layer(CorsLayer::permissive())
                .layer(axum::extract::DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state)
}

/// Build the full application for `cfg`. Does not start background tasks.
pub async fn build_app(cfg: &AppConfig) -> anyhow::Result<Router> {
    let state = build_state(cfg).await?;
    Ok(build_router(state, cfg))
}

async fn healthz(State(state): State<AppState>) -> Json<Value> {
    let breakers = state.gateway.snapshot();
    Json(json!({
        "status": "ok",
        "breakers": breakers,
    }))
}

// =============================================================================
// Background Tasks
// =============================================================================

/// Periodically delete expired refresh tokens.
pub fn start_cleanup_task(
    service: Arc<AuthService>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // The first tick completes immediately.
        interval.tick().await;

        loop {
            interval.tick().await;

            match service.cleanup_expired().await {
                Ok(deleted) if deleted > 0 => {
                    tracing::info!(deleted, "Expired refresh tokens removed");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Refresh token cleanup failed");
                }
                _ => {}
            }
        }
    })
}

// =============================================================================
// Server
// =============================================================================

pub struct NutricareServer {
    addr: SocketAddr,
    app: Router,
    state: AppState,
    cleanup_interval: Duration,
}

#[derive(Default)]
pub struct ServerBuilder {
    addr: Option<SocketAddr>,
    config: AppConfig,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = Some(addr);
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.config = cfg;
        self
    }

    pub async fn build(self) -> anyhow::Result<NutricareServer> {
        let state = build_state(&self.config).await?;
        let app = build_router(state.clone(), &self.config);

        Ok(NutricareServer {
            addr: self.addr.unwrap_or_else(|| self.config.addr()),
            app,
            state,
            cleanup_interval: self.config.server.cleanup_interval,
        })
    }
}

impl NutricareServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let cleanup = start_cleanup_task(
            Arc::clone(&self.state.auth.service),
            self.cleanup_interval,
        );

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        let served = axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await;

        cleanup.abort();
        served?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
