//! Registered model exporter

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use super::{ExportedModel, ExportedVersion, ModelPayload};
use crate::artifacts::ArtifactTransfer;
use crate::client::TrackingClient;
use crate::entities::ModelVersion;
use crate::record::{self, ExportInfo, ExportRecord, FailureDescriptor, MODEL_FILE};
use crate::run::RunExporter;
use crate::selector::{self, StagePolicy, VersionFilter};
use crate::Result;

/// Knobs for model export; also the `[export]` config section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// Stage names to export (case-insensitive)
    pub stages: Vec<String>,
    /// Version numbers to export
    pub versions: Vec<String>,
    /// Only the latest version of each stage
    pub latest_only: bool,
    /// Export the run behind each version
    pub export_run: bool,
    /// Treatment of unknown stage names
    pub stage_policy: StagePolicy,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            stages: Vec::new(),
            versions: Vec::new(),
            latest_only: false,
            export_run: true,
            stage_policy: StagePolicy::Lenient,
        }
    }
}

/// Exports a registered model and a selected subset of its versions.
#[derive(Clone)]
pub struct ModelExporter<C> {
    runs: RunExporter<C>,
    filter: VersionFilter,
    export_run: bool,
}

impl<C: TrackingClient> ModelExporter<C> {
    /// Create an exporter reading from `client`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if both stages and versions are set,
    /// and `Error::InvalidStage` for an unknown stage under
    /// `StagePolicy::Strict`. Nothing is read from the server.
    pub fn new(client: C, options: &ExportOptions) -> Result<Self> {
        let filter = VersionFilter::new(
            &options.stages,
            &options.versions,
            options.latest_only,
            options.stage_policy,
        )?;
        Ok(Self {
            runs: RunExporter::new(client),
            filter,
            export_run: options.export_run,
        })
    }

    /// Use `artifacts` to copy run artifacts.
    #[must_use]
    pub fn with_artifacts(mut self, artifacts: Arc<dyn ArtifactTransfer>) -> Self {
        self.runs = self.runs.with_artifacts(artifacts);
        self
    }

    /// The version filter in effect.
    #[must_use]
    pub const fn filter(&self) -> &VersionFilter {
        &self.filter
    }

    /// Export `model_name` into `output_dir`, logging rather than returning
    /// any error.
    ///
    /// Returns `(true, model_name)` on success and `(false, model_name)` if
    /// the model-level export failed. Per-version failures don't count
    /// against success; they are listed in the record.
    pub fn export_model(&self, model_name: &str, output_dir: impl AsRef<Path>) -> (bool, String) {
        match self.try_export_model(model_name, output_dir) {
            Ok(record) => {
                tracing::info!(
                    model = model_name,
                    exported = record.info.succeeded,
                    failed = record.info.failed,
                    "exported model"
                );
                (true, model_name.to_string())
            }
            Err(e) => {
                tracing::error!(model = model_name, error = %e, "model export failed");
                (false, model_name.to_string())
            }
        }
    }

    /// Export `model_name` into `output_dir`.
    ///
    /// # Errors
    ///
    /// Returns model-level errors only: the model can't be listed or read,
    /// or `model.json` can't be written.
    pub fn try_export_model(
        &self,
        model_name: &str,
        output_dir: impl AsRef<Path>,
    ) -> Result<ExportRecord<ModelPayload>> {
        let output_dir = record::local_path(output_dir);
        let client = self.runs.client();

        let all = client.list_model_versions(model_name)?;
        let selected = selector::select(&all, &self.filter);
        tracing::info!(
            model = model_name,
            found = all.len(),
            selected = selected.len(),
            stages = ?self.filter.stages(),
            versions = ?self.filter.versions(),
            "selected versions"
        );

        let mut exported = Vec::with_capacity(selected.len());
        let mut failures = Vec::new();
        let mut exported_runs = FxHashSet::default();
        for version in &selected {
            match self.export_version(version, &output_dir, &mut exported_runs) {
                Ok(ev) => exported.push(ev),
                Err(e) => {
                    if e.is_run_not_found() {
                        tracing::warn!(
                            model = model_name,
                            version = %version.version,
                            run_id = %version.run_id,
                            error = %e,
                            "skipping version with missing run"
                        );
                    } else {
                        tracing::error!(
                            model = model_name,
                            version = %version.version,
                            run_id = %version.run_id,
                            error = ?e,
                            "version export failed"
                        );
                    }
                    failures.push(FailureDescriptor::new(
                        version.version.clone(),
                        format!("run '{}': {e}", version.run_id),
                        e.failure_class(),
                    ));
                }
            }
        }
        exported.sort_by(|a, b| a.version.cmp_version(&b.version));

        let mut model = client.get_registered_model(model_name)?;
        model.latest_versions.clear();

        let failed_versions: Vec<String> = failures.iter().map(|f| f.entity_id.clone()).collect();
        let info = ExportInfo::new(client.server_id())
            .tally(exported.len(), failures)
            .attribute("num_target_stages", self.filter.num_target_stages())
            .attribute("num_target_versions", self.filter.num_target_versions())
            .attribute("num_src_versions", all.len())
            .attribute("num_dst_versions", exported.len())
            .attribute("failed_versions", failed_versions)
            .attribute("latest_only", self.filter.latest_only())
            .attribute("export_run", self.export_run);
        let record = ExportRecord::new(
            info,
            ModelPayload {
                registered_model: ExportedModel {
                    model,
                    versions: exported,
                },
            },
        );
        record::write_record(&output_dir, MODEL_FILE, &record)?;
        Ok(record)
    }

    fn export_version(
        &self,
        version: &ModelVersion,
        output_dir: &Path,
        exported_runs: &mut FxHashSet<String>,
    ) -> Result<ExportedVersion> {
        let client = self.runs.client();
        let run_dir: PathBuf = output_dir.join(&version.run_id);

        let run = if self.export_run && !exported_runs.contains(&version.run_id) {
            let record = self.runs.export_run(&version.run_id, &run_dir)?;
            exported_runs.insert(version.run_id.clone());
            record.payload.run.run
        } else {
            client.get_run(&version.run_id)?
        };
        let experiment = client.get_experiment(run.experiment_id())?;

        tracing::debug!(
            model = %version.name,
            version = %version.version,
            stage = %version.current_stage,
            run_id = %version.run_id,
            "exported version"
        );
        Ok(ExportedVersion {
            version: version.clone(),
            run_artifact_uri: run.info.artifact_uri,
            experiment_name: experiment.name,
        })
    }
}
