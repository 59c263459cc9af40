//! Registered model export and import
//!
//! ```text
//! <output_dir>/model.json          ExportRecord<ModelPayload>
//! <output_dir>/<run_id>/run.json   one per distinct run behind a version
//! ```
//!
//! Run directories are keyed by run id rather than version number, so
//! versions that share a run share one export.

mod export;
mod import;
mod source;

pub use export::{ExportOptions, ModelExporter};
pub use import::{ImportOptions, ImportedModel, ModelImporter};
pub use source::{extract_model_path, rewrite_source};

use serde::{Deserialize, Serialize};

use crate::entities::{ModelVersion, RegisteredModel};

/// A model version as written to disk, with run details denormalized so
/// the importer needs no extra round trip to the source server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedVersion {
    /// Version metadata, verbatim from the source server
    #[serde(flatten)]
    pub version: ModelVersion,
    /// Artifact URI of the backing run on the source server
    #[serde(rename = "_run_artifact_uri", default)]
    pub run_artifact_uri: String,
    /// Experiment of the backing run on the source server
    #[serde(rename = "_experiment_name", default)]
    pub experiment_name: String,
}

/// A registered model and its exported versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedModel {
    /// Model metadata; `latest_versions` is always empty on disk
    #[serde(flatten)]
    pub model: RegisteredModel,
    /// Exported versions, ascending by version number
    #[serde(default)]
    pub versions: Vec<ExportedVersion>,
}

/// Payload of `model.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelPayload {
    /// The exported model
    pub registered_model: ExportedModel,
}
