//! Bulk migration of many models or experiments
//!
//! Each top-level entity is an independent task with its own client
//! handle and its own sub-directory, `<dir>/<entity>/`. Tasks run on a
//! dedicated rayon pool; one worker means strictly sequential. A failing
//! task never affects its siblings.

use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::client::TrackingClient;
use crate::experiment::{ExperimentExporter, ExperimentImporter, ExperimentPayload};
use crate::model::{ExportOptions, ImportOptions, ModelExporter, ModelImporter, ModelPayload};
use crate::record::{self, ExportRecord, EXPERIMENT_FILE, MODEL_FILE};
use crate::{Error, Result};

/// The `[bulk]` config section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkOptions {
    /// Worker threads; 1 runs tasks sequentially
    pub workers: usize,
}

impl Default for BulkOptions {
    fn default() -> Self {
        Self { workers: 1 }
    }
}

/// Per-entity outcome of a bulk operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkSummary {
    /// Entities migrated, sorted by name
    pub succeeded: Vec<String>,
    /// Entities that failed, sorted by name
    pub failed: Vec<String>,
}

impl BulkSummary {
    fn from_outcomes(outcomes: Vec<(String, bool)>) -> Self {
        let mut summary = Self::default();
        for (name, ok) in outcomes {
            if ok {
                summary.succeeded.push(name);
            } else {
                summary.failed.push(name);
            }
        }
        summary.succeeded.sort();
        summary.failed.sort();
        summary
    }

    /// Whether every task succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Total number of tasks.
    #[must_use]
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

/// Directory name for an entity.
///
/// Registry names may contain path separators and other characters a
/// file system rejects. Those bytes are percent-encoded, so distinct
/// names always get distinct directories, and `.`/`..` never escape the
/// output directory.
#[must_use]
pub fn entity_dir_name(name: &str) -> String {
    match name {
        "" => "%".to_string(),
        "." => "%2E".to_string(),
        ".." => "%2E%2E".to_string(),
        _ => urlencoding::encode(name).into_owned(),
    }
}

fn run_tasks<T, F>(workers: usize, items: Vec<T>, task: F) -> Result<BulkSummary>
where
    T: Send,
    F: Fn(T) -> (String, bool) + Sync + Send,
{
    if workers <= 1 {
        return Ok(BulkSummary::from_outcomes(items.into_iter().map(task).collect()));
    }
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("migrate-{i}"))
        .build()
        .map_err(|e| Error::Configuration(format!("cannot start {workers} workers: {e}")))?;
    let outcomes = pool.install(|| items.into_par_iter().map(&task).collect());
    Ok(BulkSummary::from_outcomes(outcomes))
}

/// Sub-directories of `input_dir` holding a `file` record, sorted.
fn record_dirs(input_dir: &Path, file: &str) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(input_dir)? {
        let path = entry?.path();
        if path.join(file).is_file() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Export every model in `names` to `<output_dir>/<name>/`.
///
/// # Errors
///
/// Returns `Error::Configuration` for invalid export options or worker
/// count. Per-model failures are reported in the summary.
pub fn export_models<C: TrackingClient + Clone>(
    client: &C,
    names: &[String],
    output_dir: impl AsRef<Path>,
    options: &ExportOptions,
    workers: usize,
) -> Result<BulkSummary> {
    let output_dir = record::local_path(output_dir);
    // Validates the filter once, before any task starts.
    ModelExporter::new(client.clone(), options)?;
    tracing::info!(models = names.len(), workers, "exporting models");
    run_tasks(workers, names.to_vec(), |name| {
        let exporter = match ModelExporter::new(client.clone(), options) {
            Ok(exporter) => exporter,
            Err(e) => {
                tracing::error!(model = %name, error = %e, "cannot build exporter");
                return (name, false);
            }
        };
        let (ok, name) = exporter.export_model(&name, output_dir.join(entity_dir_name(&name)));
        (name, ok)
    })
}

/// Import every model exported under `input_dir`.
///
/// Models keep their exported names; runs go to the experiment their
/// first version's run came from, or an experiment named after the model.
///
/// # Errors
///
/// Returns an error if `input_dir` can't be listed or the worker pool
/// can't start.
pub fn import_models<C: TrackingClient + Clone>(
    client: &C,
    input_dir: impl AsRef<Path>,
    options: &ImportOptions,
    workers: usize,
) -> Result<BulkSummary> {
    let input_dir = record::local_path(input_dir);
    let dirs = record_dirs(&input_dir, MODEL_FILE)?;
    tracing::info!(models = dirs.len(), workers, "importing models");
    run_tasks(workers, dirs, |dir| {
        let label = dir.display().to_string();
        let record: ExportRecord<ModelPayload> = match record::read_record(&dir, MODEL_FILE) {
            Ok(record) => record,
            Err(e) => {
                tracing::error!(dir = %label, error = %e, "unreadable model record");
                return (label, false);
            }
        };
        let exported = record.payload.registered_model;
        let name = exported.model.name;
        let experiment_name = exported
            .versions
            .first()
            .map(|v| v.experiment_name.clone())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| name.clone());

        let importer = ModelImporter::new(client.clone(), options.clone());
        match importer.import_model(&name, &dir, &experiment_name, options.delete_model) {
            Ok(imported) => (name, imported.failures.is_empty()),
            Err(e) => {
                tracing::error!(model = %name, error = %e, "model import failed");
                (name, false)
            }
        }
    })
}

/// Export every experiment in `names` (names or ids) to
/// `<output_dir>/<name>/`.
///
/// # Errors
///
/// Returns an error if the worker pool can't start.
pub fn export_experiments<C: TrackingClient + Clone>(
    client: &C,
    names: &[String],
    output_dir: impl AsRef<Path>,
    workers: usize,
) -> Result<BulkSummary> {
    let output_dir = record::local_path(output_dir);
    tracing::info!(experiments = names.len(), workers, "exporting experiments");
    run_tasks(workers, names.to_vec(), |name| {
        let (ok, name) = ExperimentExporter::new(client.clone())
            .export_experiment(&name, output_dir.join(entity_dir_name(&name)));
        (name, ok)
    })
}

/// Import every experiment exported under `input_dir`, keeping exported
/// names.
///
/// # Errors
///
/// Returns an error if `input_dir` can't be listed or the worker pool
/// can't start.
pub fn import_experiments<C: TrackingClient + Clone>(
    client: &C,
    input_dir: impl AsRef<Path>,
    import_source_tags: bool,
    workers: usize,
) -> Result<BulkSummary> {
    let input_dir = record::local_path(input_dir);
    let dirs = record_dirs(&input_dir, EXPERIMENT_FILE)?;
    tracing::info!(experiments = dirs.len(), workers, "importing experiments");
    run_tasks(workers, dirs, |dir| {
        let label = dir.display().to_string();
        let record: ExportRecord<ExperimentPayload> =
            match record::read_record(&dir, EXPERIMENT_FILE) {
                Ok(record) => record,
                Err(e) => {
                    tracing::error!(dir = %label, error = %e, "unreadable experiment record");
                    return (label, false);
                }
            };
        let name = record.payload.experiment.name;
        match ExperimentImporter::new(client.clone(), import_source_tags)
            .import_experiment(&name, &dir)
        {
            Ok(imported) => (name, imported.failures.is_empty()),
            Err(e) => {
                tracing::error!(experiment = %name, error = %e, "experiment import failed");
                (name, false)
            }
        }
    })
}
