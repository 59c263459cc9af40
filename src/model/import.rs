//! Registered model importer

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::{rewrite_source, ExportedVersion, ModelPayload};
use crate::artifacts::ArtifactTransfer;
use crate::client::TrackingClient;
use crate::entities::{ModelVersion, RegisteredModel};
use crate::record::{self, ExportRecord, FailureDescriptor, MODEL_FILE};
use crate::run::RunImporter;
use crate::tags::{strip_provenance, Provenance};
use crate::Result;

/// Knobs for model import; also the `[import]` config section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportOptions {
    /// Delete an existing destination model before importing
    pub delete_model: bool,
    /// Tag imported runs and versions with their origin
    pub import_source_tags: bool,
    /// Pause between version creation and stage transition, in
    /// milliseconds
    pub sleep_time_ms: u64,
}

impl ImportOptions {
    /// Pause before each stage transition.
    #[must_use]
    pub const fn sleep_time(&self) -> Duration {
        Duration::from_millis(self.sleep_time_ms)
    }
}

/// Outcome of a model import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedModel {
    /// The destination model, re-fetched after import
    pub model: RegisteredModel,
    /// Versions created on the destination, in import order
    pub succeeded: Vec<ModelVersion>,
    /// Versions that could not be imported, by source version number
    pub failures: Vec<FailureDescriptor>,
}

impl ImportedModel {
    /// Whether every exported version was imported.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Recreates an exported registered model on a destination server.
#[derive(Clone)]
pub struct ModelImporter<C> {
    runs: RunImporter<C>,
    options: ImportOptions,
}

impl<C: TrackingClient> ModelImporter<C> {
    /// Create an importer writing to `client`.
    #[must_use]
    pub fn new(client: C, options: ImportOptions) -> Self {
        Self {
            runs: RunImporter::new(client).import_source_tags(options.import_source_tags),
            options,
        }
    }

    /// Use `artifacts` to upload run artifacts.
    #[must_use]
    pub fn with_artifacts(mut self, artifacts: Arc<dyn ArtifactTransfer>) -> Self {
        self.runs = self.runs.with_artifacts(artifacts);
        self
    }

    /// Options in effect.
    #[must_use]
    pub const fn options(&self) -> &ImportOptions {
        &self.options
    }

    /// Import the model exported in `input_dir` as `model_name`, placing
    /// its runs in experiment `experiment_name`.
    ///
    /// With `delete_model`, an existing destination model of that name is
    /// deleted first, so re-running an import yields the same model.
    ///
    /// # Errors
    ///
    /// Returns model-level errors: unreadable `model.json`, or the
    /// destination model or experiment cannot be established. Version
    /// failures are returned in `ImportedModel::failures`.
    pub fn import_model(
        &self,
        model_name: &str,
        input_dir: impl AsRef<Path>,
        experiment_name: &str,
        delete_model: bool,
    ) -> Result<ImportedModel> {
        let input_dir = record::local_path(input_dir);
        let record: ExportRecord<ModelPayload> = record::read_record(&input_dir, MODEL_FILE)?;
        let source_server = record.info.source_server;
        let exported = record.payload.registered_model;
        let client = self.runs.client();

        let exists = client.registered_model_exists(model_name)?;
        if exists && delete_model {
            tracing::info!(model = model_name, "deleting existing destination model");
            client.delete_registered_model(model_name)?;
        }
        if exists && !delete_model {
            tracing::info!(model = model_name, "adding versions to existing model");
        } else {
            let mut tags = exported.model.tags.clone();
            strip_provenance(&mut tags);
            if self.options.import_source_tags {
                Provenance {
                    source_server: source_server.clone(),
                    model_name: Some(exported.model.name.clone()),
                    ..Provenance::default()
                }
                .apply(&mut tags);
            }
            client.create_registered_model(
                model_name,
                exported.model.description.as_deref(),
                &tags,
            )?;
        }

        let experiment_id = client.get_or_create_experiment(experiment_name, &BTreeMap::new())?;

        let mut succeeded = Vec::with_capacity(exported.versions.len());
        let mut failures = Vec::new();
        // Source run id -> (destination run id, artifact uri)
        let mut imported_runs = FxHashMap::default();
        for version in &exported.versions {
            match self.import_version(
                model_name,
                version,
                &input_dir,
                &experiment_id,
                &source_server,
                &mut imported_runs,
            ) {
                Ok(created) => succeeded.push(created),
                Err(e) => {
                    tracing::error!(
                        model = model_name,
                        version = %version.version.version,
                        run_id = %version.version.run_id,
                        error = ?e,
                        "version import failed"
                    );
                    failures.push(FailureDescriptor::from_error(
                        version.version.version.clone(),
                        &e,
                    ));
                }
            }
        }

        let model = client.get_registered_model(model_name)?;
        tracing::info!(
            model = model_name,
            imported = succeeded.len(),
            failed = failures.len(),
            "imported model"
        );
        Ok(ImportedModel {
            model,
            succeeded,
            failures,
        })
    }

    fn import_version(
        &self,
        model_name: &str,
        exported: &ExportedVersion,
        input_dir: &Path,
        experiment_id: &str,
        source_server: &str,
        imported_runs: &mut FxHashMap<String, (String, String)>,
    ) -> Result<ModelVersion> {
        let client = self.runs.client();
        let src = &exported.version;

        let (new_run_id, artifact_uri) = match imported_runs.get(&src.run_id) {
            Some(known) => known.clone(),
            None => {
                let new_run_id = self
                    .runs
                    .import_run(input_dir.join(&src.run_id), experiment_id)?;
                let new_run = client.get_run(&new_run_id)?;
                let entry = (new_run_id, new_run.info.artifact_uri);
                imported_runs.insert(src.run_id.clone(), entry.clone());
                entry
            }
        };
        let source = rewrite_source(&src.source, &src.run_id, &artifact_uri)?;

        let mut tags = src.tags.clone();
        strip_provenance(&mut tags);
        if self.options.import_source_tags {
            Provenance::for_version(source_server, src).apply(&mut tags);
        }
        let created = client.create_model_version(
            model_name,
            &source,
            &new_run_id,
            src.description.as_deref(),
            &tags,
        )?;

        if !src.current_stage.needs_transition() {
            return Ok(created);
        }
        let pause = self.options.sleep_time();
        if !pause.is_zero() {
            std::thread::sleep(pause);
        }
        let transitioned =
            client.transition_model_version_stage(model_name, &created.version, src.current_stage)?;
        tracing::debug!(
            model = model_name,
            src_version = %src.version,
            dst_version = %transitioned.version,
            stage = %src.current_stage,
            "imported version"
        );
        Ok(transitioned)
    }
}
