//! Tracing setup.
//!
//! Logging starts at `info` before the configuration is read, then
//! [`LogHandle::apply`] swaps in `logging.level`. `RUST_LOG` always wins.

use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

use crate::config::LoggingConfig;

const BOOT_LEVEL: &str = "info";

/// sqlx logs every statement at `info`.
const DEPENDENCY_DIRECTIVES: &[(&str, &str)] = &[("sqlx", "sqlx=warn")];

/// Directive string for `level`, with noisy dependencies turned down unless
/// `level` already names them.
pub fn filter_directives(level: &str) -> String {
    let mut directives = level.trim().to_string();
    for (target, directive) in DEPENDENCY_DIRECTIVES {
        if !directives.contains(target) {
            directives.push(',');
            directives.push_str(directive);
        }
    }
    directives
}

/// Parse `level` as an `EnvFilter` directive list.
///
/// # Errors
///
/// Returns a message naming `logging.level` when a directive is invalid.
pub fn parse_filter(level: &str) -> Result<EnvFilter, String> {
    EnvFilter::try_new(filter_directives(level))
        .map_err(|e| format!("logging.level {level:?} is not a valid filter: {e}"))
}

/// Handle to the installed filter.
pub struct LogHandle {
    filter: reload::Handle<EnvFilter, Registry>,
    env_override: bool,
}

impl LogHandle {
    /// Switch to `config.level`. A no-op when `RUST_LOG` is set.
    ///
    /// # Errors
    ///
    /// Invalid directives, or a subscriber that has been dropped.
    pub fn apply(&self, config: &LoggingConfig) -> Result<(), String> {
        if self.env_override {
            tracing::debug!("RUST_LOG is set, ignoring logging.level");
            return Ok(());
        }
        let filter = parse_filter(&config.level)?;
        self.filter
            .modify(|current| *current = filter)
            .map_err(|e| format!("failed to update log filter: {e}"))
    }
}

/// Install the global subscriber: reloadable filter plus fmt output.
///
/// Calling it again keeps the first subscriber.
pub fn init_tracing() -> LogHandle {
    let from_env = std::env::var_os("RUST_LOG")
        .is_some()
        .then(|| EnvFilter::try_from_default_env().ok())
        .flatten();
    let env_override = from_env.is_some();
    let filter = from_env.unwrap_or_else(|| EnvFilter::new(filter_directives(BOOT_LEVEL)));

    let (filter_layer, filter) = reload::Layer::new(filter);
    let _ = tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::layer().with_target(true))
        .try_init();

    LogHandle {
        filter,
        env_override,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependency_directives_are_appended() {
        assert_eq!(filter_directives("debug"), "debug,sqlx=warn");
        assert_eq!(
            filter_directives("info,sqlx=debug"),
            "info,sqlx=debug",
            "explicit sqlx level is kept"
        );
    }

    #[test]
    fn invalid_level_is_rejected() {
        assert!(parse_filter("info").is_ok());
        assert!(parse_filter("nutricare_server=trace").is_ok());

        let err = parse_filter("nutricare_server=loudest").unwrap_err();
        assert!(err.contains("logging.level"));
    }

    #[test]
    fn handle_applies_configured_level() {
        let handle = init_tracing();
        let config = LoggingConfig {
            level: "warn".into(),
        };
        assert!(handle.apply(&config).is_ok());
    }
}
