//! The `/patient` resource.

pub mod error;
pub mod handlers;
pub mod model;
pub mod repository;

use axum::{
    Router,
    routing::{get, post, put},
};

use crate::server::AppState;

pub use error::ApiError;
pub use model::{Patient, PatientUpdate, RegisterPatientRequest};
pub use repository::{InMemoryPatientRepository, PatientRepository, RepositoryError};

/// Patient collection routes, to be nested under `/patient` next to the auth routes.
pub fn patient_routes() -> Router<AppState> {
    Router::new()
        .route("/all", get(handlers::list_patients))
        .route("/register", post(handlers::register_patient))
        .route("/diet-groups/{group_id}", get(handlers::list_by_diet_group))
        .route("/", put(handlers::update_patient))
        .route(
            "/{id}",
            get(handlers::get_patient).delete(handlers::delete_patient),
        )
}
