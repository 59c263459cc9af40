//! Run importer

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use super::{RunPayload, ARTIFACTS_DIR};
use crate::artifacts::{ArtifactTransfer, SkipArtifacts};
use crate::client::TrackingClient;
use crate::record::{self, ExportRecord, RUN_FILE};
use crate::tags::{strip_provenance, Provenance};
use crate::Result;

/// Recreates exported runs on a destination server.
#[derive(Clone)]
pub struct RunImporter<C> {
    client: C,
    artifacts: Arc<dyn ArtifactTransfer>,
    import_source_tags: bool,
}

impl<C: TrackingClient> RunImporter<C> {
    /// Importer that replays metadata only and adds no provenance tags.
    #[must_use]
    pub fn new(client: C) -> Self {
        Self {
            client,
            artifacts: Arc::new(SkipArtifacts),
            import_source_tags: false,
        }
    }

    /// Use `artifacts` to upload exported artifact files.
    #[must_use]
    pub fn with_artifacts(mut self, artifacts: Arc<dyn ArtifactTransfer>) -> Self {
        self.artifacts = artifacts;
        self
    }

    /// Add provenance tags (original run id, source experiment, source
    /// server) to every imported run.
    #[must_use]
    pub const fn import_source_tags(mut self, enabled: bool) -> Self {
        self.import_source_tags = enabled;
        self
    }

    /// The client this importer writes to.
    pub const fn client(&self) -> &C {
        &self.client
    }

    /// Import the run exported in `dir` into experiment `experiment_id`.
    ///
    /// Returns the new, destination-assigned run id.
    ///
    /// # Errors
    ///
    /// Returns `Error::Record` if `dir` holds no readable run record, and
    /// any error from the destination server or artifact transfer.
    pub fn import_run(&self, dir: impl AsRef<Path>, experiment_id: &str) -> Result<String> {
        let dir = record::local_path(dir);
        let record: ExportRecord<RunPayload> = record::read_record(&dir, RUN_FILE)?;
        let exported = record.payload.run;
        let src = &exported.run;

        let mut tags = src.data.tags.clone();
        let stale = strip_provenance(&mut tags);
        if stale > 0 {
            tracing::debug!(run_id = src.run_id(), stale, "dropped stale provenance tags");
        }
        if self.import_source_tags {
            Provenance::for_run(
                record.info.source_server.clone(),
                src.run_id(),
                exported.experiment_name.clone(),
            )
            .apply(&mut tags);
        }

        let run = self.client.create_run(
            experiment_id,
            src.info.run_name.as_deref(),
            src.info.start_time,
            &BTreeMap::new(),
        )?;
        let new_run_id = run.info.run_id.clone();

        self.client
            .log_batch(&new_run_id, &src.data.params, &src.data.metrics, &tags)?;
        if src.info.status.is_terminal() {
            self.client
                .update_run(&new_run_id, src.info.status, src.info.end_time)?;
        }
        if !exported.artifacts.is_empty() {
            self.artifacts
                .upload(&dir.join(ARTIFACTS_DIR), &run.info.artifact_uri)?;
        }

        tracing::info!(
            src_run_id = src.run_id(),
            dst_run_id = %new_run_id,
            experiment_id,
            "imported run"
        );
        Ok(new_run_id)
    }
}
