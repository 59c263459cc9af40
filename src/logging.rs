//! Tracing subscriber setup for the binary
//!
//! The library only emits `tracing` events; installing a subscriber is
//! left to the application.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};
use crate::{Error, Result};

/// Filter built from `RUST_LOG`, falling back to `config.level`.
///
/// # Errors
///
/// Returns `Error::Configuration` if neither is a valid filter directive.
pub fn env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.trim().is_empty() => EnvFilter::try_new(directives),
        _ => EnvFilter::try_new(&config.level),
    }
    .map_err(|e| Error::Configuration(format!("invalid log filter: {e}")))
}

/// Install the global subscriber. Logs go to stderr so stdout stays free
/// for command output.
///
/// # Errors
///
/// Returns `Error::Configuration` for an invalid filter or if a global
/// subscriber is already installed.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = env_filter(config)?;
    let registry = tracing_subscriber::registry().with(filter);
    match config.format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    }
    .map_err(|e| Error::Configuration(format!("cannot install log subscriber: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_level_is_configuration_error() {
        if std::env::var(EnvFilter::DEFAULT_ENV).is_ok() {
            return;
        }
        let config = LoggingConfig {
            level: "mlflow_migrate=loud".to_string(),
            ..LoggingConfig::default()
        };
        assert!(matches!(env_filter(&config), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_default_level_parses() {
        assert!(env_filter(&LoggingConfig::default()).is_ok());
    }
}
