//! Tracking-server client contract
//!
//! Every exporter and importer takes its client as an explicit
//! dependency; there is no process-wide client. Two implementations ship
//! with the crate:
//!
//! - [`MemoryTrackingServer`]: a thread-safe in-memory server, used for
//!   tests and dry runs.
//! - [`RestTrackingClient`] (feature `rest`): blocking client for the
//!   MLflow REST API 2.0.
//!
//! # Example
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use mlflow_migrate::client::{MemoryTrackingServer, TrackingClient};
//!
//! # fn example() -> mlflow_migrate::Result<()> {
//! let server = MemoryTrackingServer::new("http://src:5000");
//! let exp_id = server.create_experiment("churn", &BTreeMap::new())?;
//! let run = server.create_run(&exp_id, None, 0, &BTreeMap::new())?;
//! assert_eq!(server.get_run(run.run_id())?.experiment_id(), exp_id);
//! # Ok(())
//! # }
//! ```

mod memory;
#[cfg(feature = "rest")]
mod rest;

pub use memory::MemoryTrackingServer;
#[cfg(feature = "rest")]
pub use rest::RestTrackingClient;

use std::collections::BTreeMap;

use crate::entities::{Experiment, Metric, ModelVersion, RegisteredModel, Run, RunStatus, Stage};
use crate::Result;

/// CRUD surface of a tracking server.
///
/// Implementations must report a missing entity as
/// [`Error::NotFound`](crate::Error::NotFound); the exporters rely on it to
/// tell a tolerated missing run apart from other failures.
pub trait TrackingClient: Send + Sync {
    /// Identity of the server (its tracking URI), recorded in export
    /// headers and provenance tags.
    fn server_id(&self) -> String;

    /// Get an experiment by ID.
    fn get_experiment(&self, experiment_id: &str) -> Result<Experiment>;

    /// Get an experiment by name. Returns `None` if it doesn't exist.
    fn get_experiment_by_name(&self, name: &str) -> Result<Option<Experiment>>;

    /// Create an experiment, returning its new ID.
    fn create_experiment(&self, name: &str, tags: &BTreeMap<String, String>) -> Result<String>;

    /// All active runs of an experiment, oldest first.
    fn search_runs(&self, experiment_id: &str) -> Result<Vec<Run>>;

    /// Get a run by ID.
    fn get_run(&self, run_id: &str) -> Result<Run>;

    /// Create a run under an experiment.
    fn create_run(
        &self,
        experiment_id: &str,
        run_name: Option<&str>,
        start_time: i64,
        tags: &BTreeMap<String, String>,
    ) -> Result<Run>;

    /// Log parameters, metrics and tags to a run.
    fn log_batch(
        &self,
        run_id: &str,
        params: &BTreeMap<String, String>,
        metrics: &[Metric],
        tags: &BTreeMap<String, String>,
    ) -> Result<()>;

    /// Set a run's status and end time.
    fn update_run(&self, run_id: &str, status: RunStatus, end_time: Option<i64>) -> Result<()>;

    /// Get a registered model, including its server-computed latest versions.
    fn get_registered_model(&self, name: &str) -> Result<RegisteredModel>;

    /// Create a registered model.
    fn create_registered_model(
        &self,
        name: &str,
        description: Option<&str>,
        tags: &BTreeMap<String, String>,
    ) -> Result<RegisteredModel>;

    /// Delete a registered model and all of its versions.
    fn delete_registered_model(&self, name: &str) -> Result<()>;

    /// All versions of a registered model, in server order.
    fn list_model_versions(&self, name: &str) -> Result<Vec<ModelVersion>>;

    /// Create a model version backed by `run_id`.
    fn create_model_version(
        &self,
        name: &str,
        source: &str,
        run_id: &str,
        description: Option<&str>,
        tags: &BTreeMap<String, String>,
    ) -> Result<ModelVersion>;

    /// Move a model version to another stage.
    fn transition_model_version_stage(
        &self,
        name: &str,
        version: &str,
        stage: Stage,
    ) -> Result<ModelVersion>;

    /// Whether a registered model exists.
    fn registered_model_exists(&self, name: &str) -> Result<bool> {
        match self.get_registered_model(name) {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// ID of the experiment called `name`, creating it with `tags` if it
    /// doesn't exist.
    fn get_or_create_experiment(
        &self,
        name: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<String> {
        match self.get_experiment_by_name(name)? {
            Some(experiment) => Ok(experiment.experiment_id),
            None => self.create_experiment(name, tags),
        }
    }
}
