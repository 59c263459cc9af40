//! Migration configuration
//!
//! Every section is optional; missing keys take their defaults and CLI
//! flags override whatever the file sets.
//!
//! ```toml
//! [source]
//! tracking_uri = "http://mlflow-old:5000"
//!
//! [destination]
//! tracking_uri = "https://mlflow-new.internal"
//! token = "dapi..."
//!
//! [export]
//! stages = ["Production", "Staging"]
//! latest_only = true
//!
//! [import]
//! delete_model = true
//! sleep_time_ms = 2000
//!
//! [bulk]
//! workers = 4
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::bulk::BulkOptions;
use crate::model::{ExportOptions, ImportOptions};
use crate::{Error, Result};

/// Connection settings for one tracking server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URI of the tracking server
    pub tracking_uri: String,
    /// Bearer token, if the server requires one
    pub token: Option<String>,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Maximum entries per `log-batch` request
    pub batch_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tracking_uri: "http://localhost:5000".to_string(),
            token: None,
            timeout_secs: 30,
            batch_size: 1000,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    /// Output format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Complete migration configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Server exports read from
    pub source: ServerConfig,
    /// Server imports write to
    pub destination: ServerConfig,
    /// Model export defaults
    pub export: ExportOptions,
    /// Model import defaults
    pub import: ImportOptions,
    /// Bulk execution
    pub bulk: BulkOptions,
    /// Logging
    pub logging: LoggingConfig,
}

impl MigrationConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if the file can't be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("failed to read config file {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` on malformed TOML or unknown values.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::Configuration(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if export stages and versions are
    /// both set, or a count is zero.
    pub fn validate(&self) -> Result<()> {
        if !self.export.stages.is_empty() && !self.export.versions.is_empty() {
            return Err(Error::Configuration(
                "[export] stages and versions cannot both be set".to_string(),
            ));
        }
        if self.bulk.workers == 0 {
            return Err(Error::Configuration("[bulk] workers must be at least 1".to_string()));
        }
        for (section, server) in [("source", &self.source), ("destination", &self.destination)] {
            if server.batch_size == 0 {
                return Err(Error::Configuration(format!(
                    "[{section}] batch_size must be at least 1"
                )));
            }
        }
        Ok(())
    }

    /// Render the configuration as TOML.
    #[must_use]
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}
