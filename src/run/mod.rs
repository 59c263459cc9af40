//! Run export and import
//!
//! A run is exported to its own directory:
//!
//! ```text
//! <dir>/run.json        ExportRecord<RunPayload>
//! <dir>/artifacts/...   artifact files (if an ArtifactTransfer copies them)
//! ```
//!
//! On import the destination assigns a new run id; that id is the datum
//! model import needs to re-link versions to their runs.

mod export;
mod import;

pub use export::RunExporter;
pub use import::RunImporter;

use serde::{Deserialize, Serialize};

use crate::entities::Run;

/// Sub-directory of a run export holding artifact files.
pub const ARTIFACTS_DIR: &str = "artifacts";

/// A run as written to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedRun {
    /// Run metadata and data, verbatim from the source server
    #[serde(flatten)]
    pub run: Run,
    /// Name of the run's experiment on the source server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experiment_name: Option<String>,
    /// Artifact files exported alongside the record, relative to `artifacts/`
    #[serde(default)]
    pub artifacts: Vec<String>,
}

/// Payload of `run.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunPayload {
    /// The exported run
    pub run: ExportedRun,
}
