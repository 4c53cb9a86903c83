use std::env;

use nutricare_server::ServerBuilder;
use nutricare_server::config::loader::{DEFAULT_CONFIG_FILE, load_config};

/// How the configuration path was determined.
#[derive(Debug, Clone, Copy)]
enum ConfigSource {
    /// From --config CLI argument
    CliArgument,
    /// From NUTRICARE_CONFIG environment variable
    EnvironmentVariable,
    /// Default path (nutricare.toml)
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CliArgument => write!(f, "CLI argument (--config)"),
            Self::EnvironmentVariable => write!(f, "environment variable (NUTRICARE_CONFIG)"),
            Self::Default => write!(f, "default"),
        }
    }
}

#[tokio::main]
async fn main() {
    // .env is optional; only report files that exist but cannot be read.
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    let logging = nutricare_server::observability::init_tracing();

    let (config_path, source) = resolve_config_path();
    let cfg = match load_config(Some(&config_path)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };
    tracing::info!(
        path = %config_path,
        source = %source,
        "Configuration loaded"
    );
    if let Err(e) = logging.apply(&cfg.logging) {
        eprintln!("Configuration error: {e}");
        std::process::exit(2);
    }

    if env::args().any(|arg| arg == "--print-config") {
        let mut printable = cfg.clone();
        if printable.auth.signing.secret.is_some() {
            printable.auth.signing.secret = Some("<redacted>".into());
        }
        if printable.bootstrap.admin_password.is_some() {
            printable.bootstrap.admin_password = Some("<redacted>".into());
        }
        match toml::to_string_pretty(&printable) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                eprintln!("Failed to render configuration: {e}");
                std::process::exit(2);
            }
        }
        return;
    }

    let server = match ServerBuilder::new().with_config(cfg).build().await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Server initialization failed: {e:#}");
            std::process::exit(2);
        }
    };

    if let Err(err) = server.run().await {
        eprintln!("Server error: {err:#}");
        std::process::exit(1);
    }
}

/// Resolve the configuration file path.
///
/// Priority order:
/// 1. CLI argument: --config <path>
/// 2. Environment variable: NUTRICARE_CONFIG
/// 3. Default: nutricare.toml
fn resolve_config_path() -> (String, ConfigSource) {
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config"
            && let Some(path) = args.next()
        {
            return (path, ConfigSource::CliArgument);
        }
    }

    if let Ok(path) = env::var("NUTRICARE_CONFIG")
        && !path.is_empty()
    {
        return (path, ConfigSource::EnvironmentVariable);
    }

    (DEFAULT_CONFIG_FILE.to_string(), ConfigSource::Default)
}
