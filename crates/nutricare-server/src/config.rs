use std::net::SocketAddr;
use std::time::Duration;

use nutricare_auth::AuthConfig;
use serde::{Deserialize, Serialize};

use crate::resilience::ResilienceConfig;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// Authentication: token lifetimes, session policy, signing key
    #[serde(default)]
    pub auth: AuthConfig,
    /// Retry and circuit breaker settings for patient reads
    #[serde(default)]
    pub resilience: ResilienceConfig,
    /// Admin principal created at startup when missing
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

impl AppConfig {
    pub fn addr(&self) -> SocketAddr {
        let ip: std::net::IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(std::net::IpAddr::from([0, 0, 0, 0]));
        SocketAddr::new(ip, self.server.port)
    }

    pub fn validate(&self) -> Result<(), String> {
        // Server validations
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.body_limit_bytes == 0 {
            return Err("server.body_limit_bytes must be > 0".into());
        }
        if self.server.cleanup_interval.is_zero() {
            return Err("server.cleanup_interval must be > 0".into());
        }
        // Logging validation
        crate::observability::parse_filter(&self.logging.level)?;
        // Storage validation
        if self.storage.backend == StorageBackend::Postgres {
            let url = self
                .storage
                .postgres
                .as_ref()
                .map(|pg| pg.url.as_str())
                .unwrap_or("");
            if url.is_empty() {
                return Err("storage.backend = \"postgres\" requires storage.postgres.url".into());
            }
        }
        self.auth.validate().map_err(|e| format!("auth: {e}"))?;
        self.resilience.validate()?;
        self.bootstrap.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
    /// How often expired refresh tokens are swept.
    #[serde(default = "default_cleanup_interval", with = "humantime_serde")]
    pub cleanup_interval: Duration,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}
fn default_body_limit() -> usize {
    1024 * 1024
}
fn default_cleanup_interval() -> Duration {
    Duration::from_secs(10 * 60)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
            cleanup_interval: default_cleanup_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local maps; everything is lost on restart.
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default)]
    pub postgres: Option<PostgresStorageConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresStorageConfig {
    #[serde(default)]
    pub url: String,
    /// Create the auth tables on startup if missing.
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BootstrapConfig {
    #[serde(default)]
    pub admin_email: Option<String>,
    #[serde(default)]
    pub admin_password: Option<String>,
}

impl BootstrapConfig {
    /// Email and password when both are set.
    pub fn admin(&self) -> Option<(&str, &str)> {
        match (&self.admin_email, &self.admin_password) {
            (Some(email), Some(password)) => Some((email.as_str(), password.as_str())),
            _ => None,
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.admin_email.is_some() != self.admin_password.is_some() {
            return Err(
                "bootstrap.admin_email and bootstrap.admin_password must be set together".into(),
            );
        }
        Ok(())
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    /// Default configuration file, read when no path is given.
    pub const DEFAULT_CONFIG_FILE: &str = "nutricare.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        } else if path.is_some() {
            tracing::warn!(path = %pathbuf.display(), "Config file not found, using defaults");
        }
        // Environment variable overrides, e.g., NUTRICARE__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("NUTRICARE")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}
