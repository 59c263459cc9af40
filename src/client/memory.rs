//! In-memory tracking server using `DashMap`.
//!
//! Data is lost when the last handle is dropped. Cloning a
//! `MemoryTrackingServer` yields another handle onto the same server, so
//! bulk tasks can each own a handle while sharing state.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};

use super::TrackingClient;
use crate::entities::{
    Experiment, LifecycleStage, Metric, ModelVersion, RegisteredModel, Run, RunStatus, Stage,
};
use crate::error::EntityKind;
use crate::selector::latest_per_stage;
use crate::{Error, Result};

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn already_exists(what: &str, name: &str) -> Error {
    Error::Server {
        status: 400,
        code: "RESOURCE_ALREADY_EXISTS".to_string(),
        message: format!("{what} '{name}' already exists"),
    }
}

#[derive(Debug)]
struct Inner {
    server_id: String,
    artifact_root: String,
    next_experiment_id: AtomicU64,
    experiment_names: DashMap<String, String>,
    experiments: DashMap<String, Experiment>,
    runs: DashMap<String, Run>,
    models: DashMap<String, RegisteredModel>,
    versions: DashMap<String, Vec<ModelVersion>>,
    faulty_runs: DashSet<String>,
}

/// In-memory tracking server.
///
/// Thread-safe; mirrors the semantics the exporters rely on from a real
/// server: unique experiment and model names, server-assigned run ids and
/// version numbers, not-found errors for missing entities, and
/// `latest_versions` recomputed on every model fetch.
///
/// # Example
///
/// ```rust
/// use std::collections::BTreeMap;
/// use mlflow_migrate::client::{MemoryTrackingServer, TrackingClient};
///
/// # fn example() -> mlflow_migrate::Result<()> {
/// let server = MemoryTrackingServer::new("http://dst:5000");
/// server.create_registered_model("churn", Some("v2 pipeline"), &BTreeMap::new())?;
/// assert!(server.registered_model_exists("churn")?);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MemoryTrackingServer {
    inner: Arc<Inner>,
}

impl MemoryTrackingServer {
    /// Create an empty server identified by `server_id`.
    #[must_use]
    pub fn new(server_id: impl Into<String>) -> Self {
        let server_id = server_id.into();
        let slug: String = server_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        Self::with_artifact_root(server_id, format!("memory://{slug}/mlruns"))
    }

    /// Create an empty server whose experiments store artifacts under
    /// `artifact_root`.
    #[must_use]
    pub fn with_artifact_root(server_id: impl Into<String>, artifact_root: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                server_id: server_id.into(),
                artifact_root: artifact_root.into().trim_end_matches('/').to_string(),
                next_experiment_id: AtomicU64::new(1),
                experiment_names: DashMap::new(),
                experiments: DashMap::new(),
                runs: DashMap::new(),
                models: DashMap::new(),
                versions: DashMap::new(),
                faulty_runs: DashSet::new(),
            }),
        }
    }

    /// Number of experiments.
    #[must_use]
    pub fn experiment_count(&self) -> usize {
        self.inner.experiments.len()
    }

    /// Number of runs.
    #[must_use]
    pub fn run_count(&self) -> usize {
        self.inner.runs.len()
    }

    /// Number of registered models.
    #[must_use]
    pub fn model_count(&self) -> usize {
        self.inner.models.len()
    }

    /// Check if the server holds no experiments, runs or models.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.experiments.is_empty() && self.inner.runs.is_empty() && self.inner.models.is_empty()
    }

    /// Permanently remove a run, as garbage collection on a real server
    /// would. Model versions that reference it are left dangling.
    pub fn purge_run(&self, run_id: &str) {
        self.inner.runs.remove(run_id);
    }

    /// Make every future `get_run(run_id)` fail with a server error.
    pub fn inject_run_fault(&self, run_id: &str) {
        self.inner.faulty_runs.insert(run_id.to_string());
    }
}

impl TrackingClient for MemoryTrackingServer {
    fn server_id(&self) -> String {
        self.inner.server_id.clone()
    }

    fn get_experiment(&self, experiment_id: &str) -> Result<Experiment> {
        self.inner
            .experiments
            .get(experiment_id)
            .map(|e| e.value().clone())
            .ok_or_else(|| Error::not_found(EntityKind::Experiment, experiment_id))
    }

    fn get_experiment_by_name(&self, name: &str) -> Result<Option<Experiment>> {
        let Some(id) = self.inner.experiment_names.get(name).map(|id| id.value().clone()) else {
            return Ok(None);
        };
        self.get_experiment(&id).map(Some)
    }

    fn create_experiment(&self, name: &str, tags: &BTreeMap<String, String>) -> Result<String> {
        match self.inner.experiment_names.entry(name.to_string()) {
            Entry::Occupied(_) => Err(already_exists("Experiment", name)),
            Entry::Vacant(slot) => {
                let id = self
                    .inner
                    .next_experiment_id
                    .fetch_add(1, Ordering::SeqCst)
                    .to_string();
                let mut experiment = Experiment::builder(&id, name)
                    .artifact_location(format!("{}/{id}", self.inner.artifact_root))
                    .build();
                experiment.tags.clone_from(tags);
                self.inner.experiments.insert(id.clone(), experiment);
                slot.insert(id.clone());
                Ok(id)
            }
        }
    }

    fn search_runs(&self, experiment_id: &str) -> Result<Vec<Run>> {
        self.get_experiment(experiment_id)?;
        let mut runs: Vec<Run> = self
            .inner
            .runs
            .iter()
            .filter(|r| {
                r.info.experiment_id == experiment_id
                    && r.info.lifecycle_stage == LifecycleStage::Active
            })
            .map(|r| r.value().clone())
            .collect();
        runs.sort_by(|a, b| {
            a.info
                .start_time
                .cmp(&b.info.start_time)
                .then_with(|| a.info.run_id.cmp(&b.info.run_id))
        });
        Ok(runs)
    }

    fn get_run(&self, run_id: &str) -> Result<Run> {
        if self.inner.faulty_runs.contains(run_id) {
            return Err(Error::Server {
                status: 500,
                code: "INTERNAL_ERROR".to_string(),
                message: format!("injected fault reading run '{run_id}'"),
            });
        }
        self.inner
            .runs
            .get(run_id)
            .map(|r| r.value().clone())
            .ok_or_else(|| Error::not_found(EntityKind::Run, run_id))
    }

    fn create_run(
        &self,
        experiment_id: &str,
        run_name: Option<&str>,
        start_time: i64,
        tags: &BTreeMap<String, String>,
    ) -> Result<Run> {
        let experiment = self.get_experiment(experiment_id)?;
        let run_id = uuid::Uuid::new_v4().simple().to_string();

        let mut run = Run::builder(&run_id, experiment_id)
            .times(start_time, None)
            .artifact_uri(format!("{}/{run_id}/artifacts", experiment.artifact_location))
            .build();
        run.info.run_name = run_name.map(str::to_string);
        run.data.tags.clone_from(tags);

        self.inner.runs.insert(run_id, run.clone());
        Ok(run)
    }

    fn log_batch(
        &self,
        run_id: &str,
        params: &BTreeMap<String, String>,
        metrics: &[Metric],
        tags: &BTreeMap<String, String>,
    ) -> Result<()> {
        let mut entry = self
            .inner
            .runs
            .get_mut(run_id)
            .ok_or_else(|| Error::not_found(EntityKind::Run, run_id))?;
        let data = &mut entry.value_mut().data;

        for (key, value) in params {
            if let Some(existing) = data.params.get(key) {
                if existing != value {
                    return Err(Error::Server {
                        status: 400,
                        code: "INVALID_PARAMETER_VALUE".to_string(),
                        message: format!(
                            "param '{key}' already logged with value '{existing}', cannot change to '{value}'"
                        ),
                    });
                }
            }
            data.params.insert(key.clone(), value.clone());
        }
        data.metrics.extend_from_slice(metrics);
        data.tags
            .extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    fn update_run(&self, run_id: &str, status: RunStatus, end_time: Option<i64>) -> Result<()> {
        let mut run = self
            .inner
            .runs
            .get_mut(run_id)
            .ok_or_else(|| Error::not_found(EntityKind::Run, run_id))?;
        run.info.status = status;
        run.info.end_time = end_time;
        Ok(())
    }

    fn get_registered_model(&self, name: &str) -> Result<RegisteredModel> {
        let mut model = self
            .inner
            .models
            .get(name)
            .map(|m| m.value().clone())
            .ok_or_else(|| Error::not_found(EntityKind::RegisteredModel, name))?;
        let versions = self
            .inner
            .versions
            .get(name)
            .map(|v| v.value().clone())
            .unwrap_or_default();
        model.latest_versions = latest_per_stage(&versions);
        Ok(model)
    }

    fn create_registered_model(
        &self,
        name: &str,
        description: Option<&str>,
        tags: &BTreeMap<String, String>,
    ) -> Result<RegisteredModel> {
        match self.inner.models.entry(name.to_string()) {
            Entry::Occupied(_) => Err(already_exists("Registered model", name)),
            Entry::Vacant(slot) => {
                let now = now_millis();
                let mut model = RegisteredModel::new(name);
                model.description = description.map(str::to_string);
                model.tags.clone_from(tags);
                model.creation_timestamp = Some(now);
                model.last_updated_timestamp = Some(now);
                slot.insert(model.clone());
                Ok(model)
            }
        }
    }

    fn delete_registered_model(&self, name: &str) -> Result<()> {
        self.inner
            .models
            .remove(name)
            .ok_or_else(|| Error::not_found(EntityKind::RegisteredModel, name))?;
        self.inner.versions.remove(name);
        Ok(())
    }

    fn list_model_versions(&self, name: &str) -> Result<Vec<ModelVersion>> {
        if !self.inner.models.contains_key(name) {
            return Err(Error::not_found(EntityKind::RegisteredModel, name));
        }
        // Newest first, as registry search endpoints return them.
        let mut versions = self
            .inner
            .versions
            .get(name)
            .map(|v| v.value().clone())
            .unwrap_or_default();
        versions.reverse();
        Ok(versions)
    }

    fn create_model_version(
        &self,
        name: &str,
        source: &str,
        run_id: &str,
        description: Option<&str>,
        tags: &BTreeMap<String, String>,
    ) -> Result<ModelVersion> {
        if !self.inner.models.contains_key(name) {
            return Err(Error::not_found(EntityKind::RegisteredModel, name));
        }
        if !self.inner.runs.contains_key(run_id) {
            return Err(Error::not_found(EntityKind::Run, run_id));
        }

        let mut versions = self.inner.versions.entry(name.to_string()).or_default();
        let next = versions
            .iter()
            .filter_map(ModelVersion::version_number)
            .max()
            .unwrap_or(0)
            + 1;

        let mut version = ModelVersion::new(name, next.to_string(), run_id, source);
        version.description = description.map(str::to_string);
        version.tags.clone_from(tags);
        version.status = Some("READY".to_string());
        version.creation_timestamp = Some(now_millis());

        versions.push(version.clone());
        Ok(version)
    }

    fn transition_model_version_stage(
        &self,
        name: &str,
        version: &str,
        stage: Stage,
    ) -> Result<ModelVersion> {
        let missing = || Error::not_found(EntityKind::ModelVersion, format!("{name}/{version}"));
        let mut versions = self.inner.versions.get_mut(name).ok_or_else(missing)?;
        let target = versions
            .iter_mut()
            .find(|vr| vr.version == version)
            .ok_or_else(missing)?;
        target.current_stage = stage;
        Ok(target.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_tags() -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    #[test]
    fn test_server_default() {
        let server = MemoryTrackingServer::new("http://src:5000");
        assert!(server.is_empty());
        assert_eq!(server.server_id(), "http://src:5000");
    }

    #[test]
    fn test_experiment_names_are_unique() {
        let server = MemoryTrackingServer::new("s");
        server.create_experiment("exp", &no_tags()).unwrap();
        let err = server.create_experiment("exp", &no_tags()).unwrap_err();
        assert!(err.to_string().contains("RESOURCE_ALREADY_EXISTS"));
        assert_eq!(server.experiment_count(), 1);
    }

    #[test]
    fn test_artifact_locations_differ_between_servers() {
        let src = MemoryTrackingServer::new("http://src:5000");
        let dst = MemoryTrackingServer::new("http://dst:5000");
        let a = src.create_experiment("exp", &no_tags()).unwrap();
        let b = dst.create_experiment("exp", &no_tags()).unwrap();
        assert_ne!(
            src.get_experiment(&a).unwrap().artifact_location,
            dst.get_experiment(&b).unwrap().artifact_location
        );
    }

    #[test]
    fn test_run_lifecycle() {
        let server = MemoryTrackingServer::new("s");
        let exp = server.create_experiment("exp", &no_tags()).unwrap();
        let run = server.create_run(&exp, Some("first"), 10, &no_tags()).unwrap();
        assert_eq!(run.run_id().len(), 32);
        assert!(run.info.artifact_uri.ends_with(&format!("/{}/artifacts", run.run_id())));

        let mut params = BTreeMap::new();
        params.insert("lr".to_string(), "0.1".to_string());
        server
            .log_batch(run.run_id(), &params, &[Metric::new("loss", 0.5, 11, 0)], &no_tags())
            .unwrap();
        server
            .update_run(run.run_id(), RunStatus::Finished, Some(20))
            .unwrap();

        let fetched = server.get_run(run.run_id()).unwrap();
        assert_eq!(fetched.data.params["lr"], "0.1");
        assert_eq!(fetched.info.status, RunStatus::Finished);
        assert_eq!(server.search_runs(&exp).unwrap().len(), 1);
    }

    #[test]
    fn test_param_values_are_immutable() {
        let server = MemoryTrackingServer::new("s");
        let exp = server.create_experiment("exp", &no_tags()).unwrap();
        let run = server.create_run(&exp, None, 0, &no_tags()).unwrap();
        let mut params = BTreeMap::new();
        params.insert("lr".to_string(), "0.1".to_string());
        server.log_batch(run.run_id(), &params, &[], &no_tags()).unwrap();
        // Re-logging the same value is fine
        server.log_batch(run.run_id(), &params, &[], &no_tags()).unwrap();

        params.insert("lr".to_string(), "0.2".to_string());
        assert!(server.log_batch(run.run_id(), &params, &[], &no_tags()).is_err());
    }

    #[test]
    fn test_purged_run_is_not_found() {
        let server = MemoryTrackingServer::new("s");
        let exp = server.create_experiment("exp", &no_tags()).unwrap();
        let run = server.create_run(&exp, None, 0, &no_tags()).unwrap();
        server.purge_run(run.run_id());
        assert!(server.get_run(run.run_id()).unwrap_err().is_run_not_found());
    }

    #[test]
    fn test_injected_fault_is_a_server_error() {
        let server = MemoryTrackingServer::new("s");
        server.inject_run_fault("r1");
        let err = server.get_run("r1").unwrap_err();
        assert!(matches!(err, Error::Server { status: 500, .. }));
    }

    #[test]
    fn test_versions_and_latest_per_stage() {
        let server = MemoryTrackingServer::new("s");
        let exp = server.create_experiment("exp", &no_tags()).unwrap();
        let run = server.create_run(&exp, None, 0, &no_tags()).unwrap();
        server.create_registered_model("m", None, &no_tags()).unwrap();

        for _ in 0..3 {
            server
                .create_model_version("m", "src", run.run_id(), None, &no_tags())
                .unwrap();
        }
        server
            .transition_model_version_stage("m", "1", Stage::Production)
            .unwrap();

        let listed = server.list_model_versions("m").unwrap();
        let numbers: Vec<&str> = listed.iter().map(|v| v.version.as_str()).collect();
        assert_eq!(numbers, vec!["3", "2", "1"]);

        let model = server.get_registered_model("m").unwrap();
        assert_eq!(model.latest_versions.len(), 2);
        assert_eq!(
            model.latest_in_stage(Stage::None).map(|v| v.version.as_str()),
            Some("3")
        );
    }

    #[test]
    fn test_version_requires_existing_run() {
        let server = MemoryTrackingServer::new("s");
        server.create_registered_model("m", None, &no_tags()).unwrap();
        let err = server
            .create_model_version("m", "src", "ghost", None, &no_tags())
            .unwrap_err();
        assert!(err.is_run_not_found());
    }

    #[test]
    fn test_delete_model_removes_versions() {
        let server = MemoryTrackingServer::new("s");
        let exp = server.create_experiment("exp", &no_tags()).unwrap();
        let run = server.create_run(&exp, None, 0, &no_tags()).unwrap();
        server.create_registered_model("m", None, &no_tags()).unwrap();
        server
            .create_model_version("m", "src", run.run_id(), None, &no_tags())
            .unwrap();

        server.delete_registered_model("m").unwrap();
        assert!(!server.registered_model_exists("m").unwrap());

        server.create_registered_model("m", None, &no_tags()).unwrap();
        assert!(server.list_model_versions("m").unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_experiment_creation() {
        let server = MemoryTrackingServer::new("s");
        let handles: Vec<_> = (0..32)
            .map(|i| {
                let server = server.clone();
                std::thread::spawn(move || {
                    server
                        .get_or_create_experiment(&format!("exp{}", i % 4), &BTreeMap::new())
                        .ok()
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(server.experiment_count(), 4);
    }
}
