//! Experiment importer

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use super::ExperimentPayload;
use crate::artifacts::ArtifactTransfer;
use crate::client::TrackingClient;
use crate::entities::Experiment;
use crate::record::{self, ExportRecord, FailureDescriptor, EXPERIMENT_FILE};
use crate::run::RunImporter;
use crate::tags::{strip_provenance, Provenance};
use crate::Result;

/// Outcome of an experiment import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedExperiment {
    /// The destination experiment, re-fetched after import
    pub experiment: Experiment,
    /// Source run id to destination run id
    pub runs: BTreeMap<String, String>,
    /// Runs that could not be imported, by source run id
    pub failures: Vec<FailureDescriptor>,
}

/// Recreates an exported experiment and its runs.
#[derive(Clone)]
pub struct ExperimentImporter<C> {
    runs: RunImporter<C>,
    import_source_tags: bool,
}

impl<C: TrackingClient> ExperimentImporter<C> {
    /// Create an importer writing to `client`.
    #[must_use]
    pub fn new(client: C, import_source_tags: bool) -> Self {
        Self {
            runs: RunImporter::new(client).import_source_tags(import_source_tags),
            import_source_tags,
        }
    }

    /// Use `artifacts` to upload run artifacts.
    #[must_use]
    pub fn with_artifacts(mut self, artifacts: Arc<dyn ArtifactTransfer>) -> Self {
        self.runs = self.runs.with_artifacts(artifacts);
        self
    }

    /// Import the experiment exported in `input_dir` as
    /// `experiment_name`. An existing experiment of that name is reused.
    ///
    /// # Errors
    ///
    /// Returns an error if `experiment.json` is unreadable or the
    /// destination experiment cannot be established. Run failures are
    /// returned in `ImportedExperiment::failures`.
    pub fn import_experiment(
        &self,
        experiment_name: &str,
        input_dir: impl AsRef<Path>,
    ) -> Result<ImportedExperiment> {
        let input_dir = record::local_path(input_dir);
        let record: ExportRecord<ExperimentPayload> =
            record::read_record(&input_dir, EXPERIMENT_FILE)?;
        let exported = record.payload;
        let client = self.runs.client();

        let mut tags = exported.experiment.tags.clone();
        strip_provenance(&mut tags);
        if self.import_source_tags {
            Provenance {
                source_server: record.info.source_server.clone(),
                experiment_name: Some(exported.experiment.name.clone()),
                ..Provenance::default()
            }
            .apply(&mut tags);
        }
        let experiment_id = client.get_or_create_experiment(experiment_name, &tags)?;

        let mut runs = BTreeMap::new();
        let mut failures = Vec::new();
        for src_run_id in &exported.runs {
            match self.runs.import_run(input_dir.join(src_run_id), &experiment_id) {
                Ok(new_run_id) => {
                    runs.insert(src_run_id.clone(), new_run_id);
                }
                Err(e) => {
                    tracing::error!(run_id = %src_run_id, error = ?e, "run import failed");
                    failures.push(FailureDescriptor::from_error(src_run_id.clone(), &e));
                }
            }
        }

        let experiment = client.get_experiment(&experiment_id)?;
        tracing::info!(
            experiment = experiment_name,
            experiment_id = %experiment_id,
            runs = runs.len(),
            failed = failures.len(),
            "imported experiment"
        );
        Ok(ImportedExperiment {
            experiment,
            runs,
            failures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MemoryTrackingServer;
    use crate::experiment::ExperimentExporter;

    #[test]
    fn test_round_trip_keeps_tags_not_location() {
        let src = MemoryTrackingServer::new("http://src:5000");
        let mut tags = BTreeMap::new();
        tags.insert("team".to_string(), "search".to_string());
        let id = src.create_experiment("ranking", &tags).unwrap();
        src.create_run(&id, Some("a"), 1, &BTreeMap::new()).unwrap();
        src.create_run(&id, Some("b"), 2, &BTreeMap::new()).unwrap();

        let dir = tempfile::tempdir().unwrap();
        ExperimentExporter::new(src.clone())
            .try_export_experiment("ranking", dir.path())
            .unwrap();

        let dst = MemoryTrackingServer::new("http://dst:5000");
        let imported = ExperimentImporter::new(dst.clone(), false)
            .import_experiment("ranking", dir.path())
            .unwrap();

        let original = src.get_experiment(&id).unwrap();
        assert_eq!(imported.experiment.name, original.name);
        assert_eq!(imported.experiment.lifecycle_stage, original.lifecycle_stage);
        assert_eq!(imported.experiment.tags, original.tags);
        assert_ne!(imported.experiment.artifact_location, original.artifact_location);
        assert_eq!(imported.runs.len(), 2);
        assert_eq!(dst.run_count(), 2);
    }

    #[test]
    fn test_source_tags_on_experiment() {
        let src = MemoryTrackingServer::new("http://src:5000");
        src.create_experiment("e", &BTreeMap::new()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        ExperimentExporter::new(src)
            .try_export_experiment("e", dir.path())
            .unwrap();

        let imported = ExperimentImporter::new(MemoryTrackingServer::new("d"), true)
            .import_experiment("e-copy", dir.path())
            .unwrap();
        let provenance = Provenance::decode(&imported.experiment.tags).unwrap().unwrap();
        assert_eq!(provenance.experiment_name.as_deref(), Some("e"));
    }
}
