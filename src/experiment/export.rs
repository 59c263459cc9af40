//! Experiment exporter

use std::path::Path;
use std::sync::Arc;

use super::ExperimentPayload;
use crate::artifacts::ArtifactTransfer;
use crate::client::TrackingClient;
use crate::entities::Experiment;
use crate::error::EntityKind;
use crate::record::{self, ExportInfo, ExportRecord, FailureDescriptor, EXPERIMENT_FILE};
use crate::run::RunExporter;
use crate::{Error, Result};

/// Exports an experiment and all of its runs.
#[derive(Clone)]
pub struct ExperimentExporter<C> {
    runs: RunExporter<C>,
}

impl<C: TrackingClient> ExperimentExporter<C> {
    /// Create an exporter reading from `client`.
    #[must_use]
    pub fn new(client: C) -> Self {
        Self {
            runs: RunExporter::new(client),
        }
    }

    /// Use `artifacts` to copy run artifacts.
    #[must_use]
    pub fn with_artifacts(mut self, artifacts: Arc<dyn ArtifactTransfer>) -> Self {
        self.runs = self.runs.with_artifacts(artifacts);
        self
    }

    /// Export the experiment named (or with id) `name_or_id`, logging
    /// rather than returning any error.
    pub fn export_experiment(&self, name_or_id: &str, output_dir: impl AsRef<Path>) -> (bool, String) {
        match self.try_export_experiment(name_or_id, output_dir) {
            Ok(record) => {
                tracing::info!(
                    experiment = %record.payload.experiment.name,
                    runs = record.info.succeeded,
                    failed = record.info.failed,
                    "exported experiment"
                );
                (true, name_or_id.to_string())
            }
            Err(e) => {
                tracing::error!(experiment = name_or_id, error = %e, "experiment export failed");
                (false, name_or_id.to_string())
            }
        }
    }

    /// Export the experiment named (or with id) `name_or_id`.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if no experiment matches, and any error
    /// listing its runs or writing `experiment.json`. Individual run
    /// failures are recorded instead.
    pub fn try_export_experiment(
        &self,
        name_or_id: &str,
        output_dir: impl AsRef<Path>,
    ) -> Result<ExportRecord<ExperimentPayload>> {
        let output_dir = record::local_path(output_dir);
        let client = self.runs.client();
        let experiment = self.resolve(name_or_id)?;
        let runs = client.search_runs(&experiment.experiment_id)?;

        let mut exported = Vec::with_capacity(runs.len());
        let mut failures = Vec::new();
        for run in &runs {
            let run_id = run.run_id();
            match self.runs.export_run(run_id, output_dir.join(run_id)) {
                Ok(_) => exported.push(run_id.to_string()),
                Err(e) => {
                    tracing::error!(run_id, error = ?e, "run export failed");
                    failures.push(FailureDescriptor::from_error(run_id, &e));
                }
            }
        }

        let info = ExportInfo::new(client.server_id())
            .tally(exported.len(), failures)
            .attribute("num_src_runs", runs.len());
        let record = ExportRecord::new(
            info,
            ExperimentPayload {
                experiment,
                runs: exported,
            },
        );
        record::write_record(&output_dir, EXPERIMENT_FILE, &record)?;
        Ok(record)
    }

    fn resolve(&self, name_or_id: &str) -> Result<Experiment> {
        let client = self.runs.client();
        if let Some(experiment) = client.get_experiment_by_name(name_or_id)? {
            return Ok(experiment);
        }
        client.get_experiment(name_or_id).map_err(|e| {
            if e.is_not_found() {
                Error::not_found(EntityKind::Experiment, name_or_id)
            } else {
                e
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::client::MemoryTrackingServer;
    use crate::record::RUN_FILE;

    #[test]
    fn test_export_by_name_and_id() {
        let server = MemoryTrackingServer::new("http://src:5000");
        let id = server.create_experiment("exp", &BTreeMap::new()).unwrap();
        for _ in 0..3 {
            server.create_run(&id, None, 0, &BTreeMap::new()).unwrap();
        }
        let exporter = ExperimentExporter::new(server);

        let dir = tempfile::tempdir().unwrap();
        let by_name = exporter.try_export_experiment("exp", dir.path()).unwrap();
        assert_eq!(by_name.payload.runs.len(), 3);
        for run_id in &by_name.payload.runs {
            assert!(dir.path().join(run_id).join(RUN_FILE).exists());
        }

        let dir = tempfile::tempdir().unwrap();
        let by_id = exporter.try_export_experiment(&id, dir.path()).unwrap();
        assert_eq!(by_id.payload.experiment.name, "exp");
    }

    #[test]
    fn test_faulty_run_is_recorded_not_fatal() {
        let server = MemoryTrackingServer::new("s");
        let id = server.create_experiment("exp", &BTreeMap::new()).unwrap();
        let good = server.create_run(&id, None, 0, &BTreeMap::new()).unwrap();
        let bad = server.create_run(&id, None, 0, &BTreeMap::new()).unwrap();
        server.inject_run_fault(bad.run_id());

        let dir = tempfile::tempdir().unwrap();
        let record = ExperimentExporter::new(server)
            .try_export_experiment("exp", dir.path())
            .unwrap();
        assert_eq!(record.payload.runs, vec![good.info.run_id]);
        assert_eq!(record.info.failed, 1);
        assert_eq!(record.info.failures[0].entity_id, bad.info.run_id);
    }

    #[test]
    fn test_unknown_experiment() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = ExperimentExporter::new(MemoryTrackingServer::new("s"));
        let (ok, name) = exporter.export_experiment("ghost", dir.path());
        assert!(!ok);
        assert_eq!(name, "ghost");
    }
}
