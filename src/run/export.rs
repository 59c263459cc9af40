//! Run exporter

use std::path::Path;
use std::sync::Arc;

use super::{ExportedRun, RunPayload, ARTIFACTS_DIR};
use crate::artifacts::{ArtifactTransfer, SkipArtifacts};
use crate::client::TrackingClient;
use crate::record::{self, ExportInfo, ExportRecord, RUN_FILE};
use crate::Result;

/// Exports single runs to portable records.
#[derive(Clone)]
pub struct RunExporter<C> {
    client: C,
    artifacts: Arc<dyn ArtifactTransfer>,
}

impl<C: TrackingClient> RunExporter<C> {
    /// Exporter that writes metadata only.
    #[must_use]
    pub fn new(client: C) -> Self {
        Self {
            client,
            artifacts: Arc::new(SkipArtifacts),
        }
    }

    /// Use `artifacts` to copy artifact files next to each record.
    #[must_use]
    pub fn with_artifacts(mut self, artifacts: Arc<dyn ArtifactTransfer>) -> Self {
        self.artifacts = artifacts;
        self
    }

    /// The client this exporter reads from.
    pub const fn client(&self) -> &C {
        &self.client
    }

    /// The artifact transfer in use.
    #[must_use]
    pub fn artifacts(&self) -> Arc<dyn ArtifactTransfer> {
        Arc::clone(&self.artifacts)
    }

    /// Export run `run_id` into `dir`.
    ///
    /// Missing optional data (experiment name, artifacts) never fails the
    /// export.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the run doesn't exist, and any error
    /// from the server, the artifact transfer or the record writer.
    pub fn export_run(
        &self,
        run_id: &str,
        dir: impl AsRef<Path>,
    ) -> Result<ExportRecord<RunPayload>> {
        let dir = record::local_path(dir);
        let run = self.client.get_run(run_id)?;

        let experiment_name = match self.client.get_experiment(run.experiment_id()) {
            Ok(experiment) => Some(experiment.name),
            Err(e) => {
                tracing::warn!(
                    run_id,
                    experiment_id = run.experiment_id(),
                    error = %e,
                    "cannot resolve experiment name for run"
                );
                None
            }
        };

        let artifacts = if run.info.artifact_uri.is_empty() {
            Vec::new()
        } else {
            self.artifacts
                .download(&run.info.artifact_uri, &dir.join(ARTIFACTS_DIR))?
        };

        let info = ExportInfo::new(self.client.server_id()).tally(1, Vec::new());
        let record = ExportRecord::new(
            info,
            RunPayload {
                run: ExportedRun {
                    run,
                    experiment_name,
                    artifacts,
                },
            },
        );
        record::write_record(&dir, RUN_FILE, &record)?;

        tracing::debug!(run_id, dir = %dir.display(), "exported run");
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::client::MemoryTrackingServer;
    use crate::entities::Metric;

    #[test]
    fn test_export_run_writes_record() {
        let server = MemoryTrackingServer::new("http://src:5000");
        let exp = server.create_experiment("exp", &BTreeMap::new()).unwrap();
        let run = server.create_run(&exp, Some("r"), 5, &BTreeMap::new()).unwrap();
        let mut params = BTreeMap::new();
        params.insert("alpha".to_string(), "0.5".to_string());
        server
            .log_batch(run.run_id(), &params, &[Metric::new("rmse", 0.7, 6, 0)], &BTreeMap::new())
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let exporter = RunExporter::new(server.clone());
        let record = exporter.export_run(run.run_id(), dir.path()).unwrap();

        assert_eq!(record.info.source_server, "http://src:5000");
        assert_eq!(record.payload.run.experiment_name.as_deref(), Some("exp"));
        assert!(dir.path().join(RUN_FILE).exists());

        let read: ExportRecord<RunPayload> = record::read_record(dir.path(), RUN_FILE).unwrap();
        assert_eq!(read.payload.run.run.data.params["alpha"], "0.5");
    }

    #[test]
    fn test_export_missing_run_propagates_not_found() {
        let server = MemoryTrackingServer::new("s");
        let dir = tempfile::tempdir().unwrap();
        let err = RunExporter::new(server)
            .export_run("nope", dir.path())
            .unwrap_err();
        assert!(err.is_run_not_found());
        assert!(!dir.path().join(RUN_FILE).exists());
    }
}
