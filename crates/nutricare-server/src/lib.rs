pub mod config;
pub mod observability;
pub mod patient;
pub mod resilience;
pub mod server;

pub use config::AppConfig;
pub use server::{AppState, NutricareServer, ServerBuilder, build_app, build_router, build_state};
