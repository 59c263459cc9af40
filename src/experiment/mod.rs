//! Experiment export and import
//!
//! ```text
//! <output_dir>/experiment.json       ExportRecord<ExperimentPayload>
//! <output_dir>/<run_id>/run.json     one per exported run
//! ```
//!
//! The experiment's artifact location is recorded but never replayed: the
//! destination assigns its own.

mod export;
mod import;

pub use export::ExperimentExporter;
pub use import::{ExperimentImporter, ImportedExperiment};

use serde::{Deserialize, Serialize};

use crate::entities::Experiment;

/// Payload of `experiment.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentPayload {
    /// Experiment metadata, verbatim from the source server
    pub experiment: Experiment,
    /// Source ids of the runs exported alongside
    #[serde(default)]
    pub runs: Vec<String>,
}
