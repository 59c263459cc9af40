//! Export records - the on-disk contract between exporter and importer
//!
//! An export record is a self-describing JSON document:
//!
//! ```text
//! {
//!   "info": { schema_version, export_tool, source_server, export_time,
//!             attempted, succeeded, failed, failures: [...], <attributes> },
//!   "<payload key>": { ... }            // e.g. "registered_model", "run"
//! }
//! ```
//!
//! Exporter and importer may run at different times against different
//! servers, so the header carries everything needed to interpret the
//! payload. Writes are atomic (temp file + rename): a reader never sees a
//! half-written record.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::FailureClass;
use crate::{Error, Result};

/// Record layout version written by this build.
pub const SCHEMA_VERSION: &str = "2";

/// Tool identity written into every header.
pub const EXPORT_TOOL: &str = "mlflow-migrate";

/// Model-level record file name.
pub const MODEL_FILE: &str = "model.json";

/// Run-level record file name.
pub const RUN_FILE: &str = "run.json";

/// Experiment-level record file name.
pub const EXPERIMENT_FILE: &str = "experiment.json";

/// A failure recorded against one entity; never fatal by itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDescriptor {
    /// Identifier of the failing entity (version number, run id, ...)
    pub entity_id: String,
    /// Error message
    pub message: String,
    /// Coarse classification
    pub classification: FailureClass,
}

impl FailureDescriptor {
    /// Create a failure descriptor.
    #[must_use]
    pub fn new(
        entity_id: impl Into<String>,
        message: impl Into<String>,
        classification: FailureClass,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            message: message.into(),
            classification,
        }
    }

    /// Describe `err` as a failure of `entity_id`.
    #[must_use]
    pub fn from_error(entity_id: impl Into<String>, err: &Error) -> Self {
        Self::new(entity_id, err.to_string(), err.failure_class())
    }
}

/// Record header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportInfo {
    /// Record layout version
    pub schema_version: String,
    /// Tool that wrote the record
    pub export_tool: String,
    /// Version of the tool
    pub tool_version: String,
    /// Source server identity
    pub source_server: String,
    /// When the record was written
    pub export_time: DateTime<Utc>,
    /// Items attempted
    #[serde(default)]
    pub attempted: usize,
    /// Items that succeeded
    #[serde(default)]
    pub succeeded: usize,
    /// Items that failed
    #[serde(default)]
    pub failed: usize,
    /// Detail for each failed item
    #[serde(default)]
    pub failures: Vec<FailureDescriptor>,
    /// Record-specific summary attributes (e.g. `num_target_stages`)
    #[serde(default, flatten)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl ExportInfo {
    /// Header stamped with the current time and this tool's identity.
    #[must_use]
    pub fn new(source_server: impl Into<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            export_tool: EXPORT_TOOL.to_string(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            source_server: source_server.into(),
            export_time: Utc::now(),
            attempted: 0,
            succeeded: 0,
            failed: 0,
            failures: Vec::new(),
            attributes: BTreeMap::new(),
        }
    }

    /// Set the success/failure tallies.
    #[must_use]
    pub fn tally(mut self, succeeded: usize, failures: Vec<FailureDescriptor>) -> Self {
        self.succeeded = succeeded;
        self.failed = failures.len();
        self.attempted = succeeded + failures.len();
        self.failures = failures;
        self
    }

    /// Add a summary attribute.
    #[must_use]
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Look up a numeric summary attribute.
    #[must_use]
    pub fn attribute_u64(&self, key: &str) -> Option<u64> {
        self.attributes.get(key).and_then(serde_json::Value::as_u64)
    }
}

/// Header plus entity payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRecord<T> {
    /// Header
    pub info: ExportInfo,
    /// Entity payload, flattened beside the header
    #[serde(flatten)]
    pub payload: T,
}

impl<T> ExportRecord<T> {
    /// Create a record.
    #[must_use]
    pub const fn new(info: ExportInfo, payload: T) -> Self {
        Self { info, payload }
    }
}

/// Map a tracking-server path to a local filesystem path.
///
/// Databricks `dbfs:/...` locations are reachable through the `/dbfs`
/// FUSE mount; every other path is used as is.
#[must_use]
pub fn local_path(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    match path.to_str().and_then(|s| s.strip_prefix("dbfs:")) {
        Some(rest) => PathBuf::from(format!("/dbfs{rest}")),
        None => path.to_path_buf(),
    }
}

/// Write `record` to `<dir>/<file_name>` atomically.
///
/// # Errors
///
/// Returns `Error::Io` if the directory cannot be created or the file
/// cannot be written, and `Error::Json` if serialization fails.
pub fn write_record<T: Serialize>(
    dir: impl AsRef<Path>,
    file_name: &str,
    record: &ExportRecord<T>,
) -> Result<PathBuf> {
    let dir = local_path(dir);
    fs::create_dir_all(&dir)?;

    let path = dir.join(file_name);
    let tmp = dir.join(format!(".{file_name}.tmp"));
    let body = serde_json::to_vec_pretty(record)?;
    fs::write(&tmp, body)?;
    fs::rename(&tmp, &path)?;

    tracing::debug!(path = %path.display(), "wrote export record");
    Ok(path)
}

/// Read `<dir>/<file_name>` back.
///
/// # Errors
///
/// Returns `Error::Record` if the file is missing or was written with an
/// incompatible schema version, `Error::Json` if it is malformed.
pub fn read_record<T: DeserializeOwned>(
    dir: impl AsRef<Path>,
    file_name: &str,
) -> Result<ExportRecord<T>> {
    let path = local_path(dir).join(file_name);
    let body = fs::read(&path).map_err(|e| {
        Error::Record(format!("cannot read '{}': {e}", path.display()))
    })?;
    let record: ExportRecord<T> = serde_json::from_slice(&body)?;

    if record.info.schema_version != SCHEMA_VERSION {
        return Err(Error::Record(format!(
            "'{}' has schema version {}, expected {SCHEMA_VERSION}",
            path.display(),
            record.info.schema_version
        )));
    }
    Ok(record)
}
