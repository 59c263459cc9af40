//! Blocking client for the MLflow REST API 2.0

use std::collections::BTreeMap;
use std::time::Duration;

use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};

use super::TrackingClient;
use crate::config::ServerConfig;
use crate::entities::{
    Experiment, LifecycleStage, Metric, ModelVersion, RegisteredModel, Run, RunData, RunInfo,
    RunStatus, Stage,
};
use crate::error::EntityKind;
use crate::{Error, Result};

/// Per-request limits of `runs/log-batch`.
const MAX_PARAMS_PER_BATCH: usize = 100;
const MAX_TAGS_PER_BATCH: usize = 100;
const MAX_METRICS_PER_BATCH: usize = 800;

const SEARCH_PAGE_SIZE: u32 = 1000;

// ============================================================================
// Wire types
// ============================================================================

/// int64 fields arrive as JSON numbers or strings depending on the server.
#[derive(Deserialize)]
#[serde(untagged)]
enum Int64 {
    Number(i64),
    Text(String),
}

impl Int64 {
    fn value<E: serde::de::Error>(self) -> std::result::Result<i64, E> {
        match self {
            Self::Number(n) => Ok(n),
            Self::Text(s) => s.trim().parse().map_err(E::custom),
        }
    }
}

fn de_i64<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<i64, D::Error> {
    Int64::deserialize(d)?.value()
}

fn de_opt_i64<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<i64>, D::Error> {
    Option::<Int64>::deserialize(d)?.map(Int64::value).transpose()
}

#[derive(Debug, Serialize, Deserialize)]
struct Tag {
    key: String,
    #[serde(default)]
    value: String,
}

fn to_wire(tags: &BTreeMap<String, String>) -> Vec<Tag> {
    tags.iter()
        .map(|(key, value)| Tag {
            key: key.clone(),
            value: value.clone(),
        })
        .collect()
}

fn from_wire(tags: Option<Vec<Tag>>) -> BTreeMap<String, String> {
    tags.unwrap_or_default()
        .into_iter()
        .map(|t| (t.key, t.value))
        .collect()
}

#[derive(Debug, Deserialize)]
struct WireExperiment {
    experiment_id: String,
    name: String,
    #[serde(default)]
    artifact_location: String,
    #[serde(default)]
    lifecycle_stage: LifecycleStage,
    tags: Option<Vec<Tag>>,
}

impl From<WireExperiment> for Experiment {
    fn from(w: WireExperiment) -> Self {
        Self {
            experiment_id: w.experiment_id,
            name: w.name,
            artifact_location: w.artifact_location,
            lifecycle_stage: w.lifecycle_stage,
            tags: from_wire(w.tags),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMetric {
    key: String,
    value: f64,
    #[serde(deserialize_with = "de_i64")]
    timestamp: i64,
    #[serde(default, deserialize_with = "de_i64")]
    step: i64,
}

#[derive(Debug, Deserialize)]
struct WireRunInfo {
    run_id: String,
    experiment_id: String,
    run_name: Option<String>,
    user_id: Option<String>,
    #[serde(default)]
    status: RunStatus,
    #[serde(default, deserialize_with = "de_i64")]
    start_time: i64,
    #[serde(default, deserialize_with = "de_opt_i64")]
    end_time: Option<i64>,
    #[serde(default)]
    artifact_uri: String,
    #[serde(default)]
    lifecycle_stage: LifecycleStage,
}

#[derive(Debug, Default, Deserialize)]
struct WireRunData {
    metrics: Option<Vec<WireMetric>>,
    params: Option<Vec<Tag>>,
    tags: Option<Vec<Tag>>,
}

#[derive(Debug, Deserialize)]
struct WireRun {
    info: WireRunInfo,
    #[serde(default)]
    data: WireRunData,
}

impl From<WireRun> for Run {
    fn from(w: WireRun) -> Self {
        let info = RunInfo {
            run_id: w.info.run_id,
            experiment_id: w.info.experiment_id,
            run_name: w.info.run_name,
            user_id: w.info.user_id,
            status: w.info.status,
            start_time: w.info.start_time,
            end_time: w.info.end_time,
            artifact_uri: w.info.artifact_uri,
            lifecycle_stage: w.info.lifecycle_stage,
        };
        let data = RunData {
            params: from_wire(w.data.params),
            metrics: w
                .data
                .metrics
                .unwrap_or_default()
                .into_iter()
                .map(|m| Metric::new(m.key, m.value, m.timestamp, m.step))
                .collect(),
            tags: from_wire(w.data.tags),
        };
        Self { info, data }
    }
}

#[derive(Debug, Deserialize)]
struct WireModelVersion {
    name: String,
    version: String,
    current_stage: Option<String>,
    description: Option<String>,
    tags: Option<Vec<Tag>>,
    #[serde(default)]
    run_id: String,
    #[serde(default)]
    source: String,
    status: Option<String>,
    #[serde(default, deserialize_with = "de_opt_i64")]
    creation_timestamp: Option<i64>,
}

impl TryFrom<WireModelVersion> for ModelVersion {
    type Error = Error;

    fn try_from(w: WireModelVersion) -> Result<Self> {
        let stage = match w.current_stage.as_deref() {
            None | Some("") => Stage::None,
            Some(name) => name.parse()?,
        };
        let mut version = Self::new(w.name, w.version, w.run_id, w.source).with_stage(stage);
        version.description = w.description.filter(|d| !d.is_empty());
        version.tags = from_wire(w.tags);
        version.status = w.status;
        version.creation_timestamp = w.creation_timestamp;
        Ok(version)
    }
}

#[derive(Debug, Deserialize)]
struct WireRegisteredModel {
    name: String,
    description: Option<String>,
    tags: Option<Vec<Tag>>,
    #[serde(default, deserialize_with = "de_opt_i64")]
    creation_timestamp: Option<i64>,
    #[serde(default, deserialize_with = "de_opt_i64")]
    last_updated_timestamp: Option<i64>,
    latest_versions: Option<Vec<WireModelVersion>>,
}

impl TryFrom<WireRegisteredModel> for RegisteredModel {
    type Error = Error;

    fn try_from(w: WireRegisteredModel) -> Result<Self> {
        let mut model = Self::new(w.name);
        model.description = w.description.filter(|d| !d.is_empty());
        model.tags = from_wire(w.tags);
        model.creation_timestamp = w.creation_timestamp;
        model.last_updated_timestamp = w.last_updated_timestamp;
        model.latest_versions = w
            .latest_versions
            .unwrap_or_default()
            .into_iter()
            .map(ModelVersion::try_from)
            .collect::<Result<_>>()?;
        Ok(model)
    }
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    error_code: String,
    #[serde(default)]
    message: String,
}

// Response envelopes

#[derive(Deserialize)]
struct ExperimentResponse {
    experiment: WireExperiment,
}

#[derive(Deserialize)]
struct CreateExperimentResponse {
    experiment_id: String,
}

#[derive(Deserialize)]
struct RunResponse {
    run: WireRun,
}

#[derive(Deserialize)]
struct SearchRunsResponse {
    #[serde(default)]
    runs: Vec<WireRun>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct RegisteredModelResponse {
    registered_model: WireRegisteredModel,
}

#[derive(Deserialize)]
struct ModelVersionResponse {
    model_version: WireModelVersion,
}

#[derive(Deserialize)]
struct SearchModelVersionsResponse {
    #[serde(default)]
    model_versions: Vec<WireModelVersion>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct Empty {}

// ============================================================================
// Client
// ============================================================================

/// Tracking client speaking the MLflow REST API 2.0.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct RestTrackingClient {
    http: reqwest::blocking::Client,
    base_url: String,
    token: Option<String>,
    batch_size: usize,
}

impl RestTrackingClient {
    /// Client for `tracking_uri` with default settings.
    ///
    /// # Errors
    ///
    /// Returns `Error::Http` if the HTTP client can't be built.
    pub fn new(tracking_uri: &str) -> Result<Self> {
        Self::from_config(&ServerConfig {
            tracking_uri: tracking_uri.to_string(),
            ..ServerConfig::default()
        })
    }

    /// Client built from a `[source]` or `[destination]` config section.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` for an empty tracking URI and
    /// `Error::Http` if the HTTP client can't be built.
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        let base_url = config.tracking_uri.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(Error::Configuration("tracking_uri must not be empty".to_string()));
        }
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url,
            token: config.token.clone(),
            batch_size: config.batch_size.clamp(1, MAX_METRICS_PER_BATCH),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/api/2.0/mlflow/{endpoint}", self.base_url)
    }

    fn authorized(
        &self,
        request: reqwest::blocking::RequestBuilder,
    ) -> reqwest::blocking::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
        subject: Option<(EntityKind, &str)>,
    ) -> Result<T> {
        tracing::trace!(endpoint, ?query, "GET");
        let request = self.authorized(self.http.get(self.url(endpoint)).query(query));
        Self::handle(request.send()?, subject)
    }

    fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
        subject: Option<(EntityKind, &str)>,
    ) -> Result<T> {
        tracing::trace!(endpoint, "POST");
        let request = self.authorized(self.http.post(self.url(endpoint)).json(body));
        Self::handle(request.send()?, subject)
    }

    /// Decode a response. `RESOURCE_DOES_NOT_EXIST` becomes
    /// `Error::NotFound` for `subject` when one is given.
    fn handle<T: DeserializeOwned>(
        response: reqwest::blocking::Response,
        subject: Option<(EntityKind, &str)>,
    ) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json()?);
        }
        let text = response.text().unwrap_or_default();
        let api: ApiError = serde_json::from_str(&text).unwrap_or(ApiError {
            error_code: String::new(),
            message: text,
        });
        match subject {
            Some((kind, id)) if api.error_code == "RESOURCE_DOES_NOT_EXIST" => {
                Err(Error::not_found(kind, id))
            }
            _ => Err(Error::Server {
                status: status.as_u16(),
                code: api.error_code,
                message: api.message,
            }),
        }
    }
}

/// Split a log-batch into request-sized pieces.
fn batches<'a>(
    params: &'a [Tag],
    metrics: &'a [WireMetric],
    tags: &'a [Tag],
    metrics_per_batch: usize,
) -> Vec<(&'a [Tag], &'a [WireMetric], &'a [Tag])> {
    let params: Vec<&[Tag]> = params.chunks(MAX_PARAMS_PER_BATCH).collect();
    let metrics: Vec<&[WireMetric]> = metrics.chunks(metrics_per_batch.max(1)).collect();
    let tags: Vec<&[Tag]> = tags.chunks(MAX_TAGS_PER_BATCH).collect();
    let n = params.len().max(metrics.len()).max(tags.len());
    (0..n)
        .map(|i| {
            (
                params.get(i).copied().unwrap_or_default(),
                metrics.get(i).copied().unwrap_or_default(),
                tags.get(i).copied().unwrap_or_default(),
            )
        })
        .collect()
}

impl TrackingClient for RestTrackingClient {
    fn server_id(&self) -> String {
        self.base_url.clone()
    }

    fn get_experiment(&self, experiment_id: &str) -> Result<Experiment> {
        let resp: ExperimentResponse = self.get(
            "experiments/get",
            &[("experiment_id", experiment_id)],
            Some((EntityKind::Experiment, experiment_id)),
        )?;
        Ok(resp.experiment.into())
    }

    fn get_experiment_by_name(&self, name: &str) -> Result<Option<Experiment>> {
        match self.get::<ExperimentResponse>(
            "experiments/get-by-name",
            &[("experiment_name", name)],
            Some((EntityKind::Experiment, name)),
        ) {
            Ok(resp) => Ok(Some(resp.experiment.into())),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn create_experiment(&self, name: &str, tags: &BTreeMap<String, String>) -> Result<String> {
        #[derive(Serialize)]
        struct Body<'a> {
            name: &'a str,
            tags: Vec<Tag>,
        }
        let resp: CreateExperimentResponse = self.post(
            "experiments/create",
            &Body {
                name,
                tags: to_wire(tags),
            },
            None,
        )?;
        Ok(resp.experiment_id)
    }

    fn search_runs(&self, experiment_id: &str) -> Result<Vec<Run>> {
        #[derive(Serialize)]
        struct Body<'a> {
            experiment_ids: [&'a str; 1],
            max_results: u32,
            #[serde(skip_serializing_if = "Option::is_none")]
            page_token: Option<String>,
        }
        let mut runs = Vec::new();
        let mut page_token = None;
        loop {
            let resp: SearchRunsResponse = self.post(
                "runs/search",
                &Body {
                    experiment_ids: [experiment_id],
                    max_results: SEARCH_PAGE_SIZE,
                    page_token: page_token.take(),
                },
                Some((EntityKind::Experiment, experiment_id)),
            )?;
            runs.extend(resp.runs.into_iter().map(Run::from));
            match resp.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        Ok(runs)
    }

    fn get_run(&self, run_id: &str) -> Result<Run> {
        let resp: RunResponse =
            self.get("runs/get", &[("run_id", run_id)], Some((EntityKind::Run, run_id)))?;
        Ok(resp.run.into())
    }

    fn create_run(
        &self,
        experiment_id: &str,
        run_name: Option<&str>,
        start_time: i64,
        tags: &BTreeMap<String, String>,
    ) -> Result<Run> {
        #[derive(Serialize)]
        struct Body<'a> {
            experiment_id: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            run_name: Option<&'a str>,
            start_time: i64,
            tags: Vec<Tag>,
        }
        let resp: RunResponse = self.post(
            "runs/create",
            &Body {
                experiment_id,
                run_name,
                start_time,
                tags: to_wire(tags),
            },
            Some((EntityKind::Experiment, experiment_id)),
        )?;
        Ok(resp.run.into())
    }

    fn log_batch(
        &self,
        run_id: &str,
        params: &BTreeMap<String, String>,
        metrics: &[Metric],
        tags: &BTreeMap<String, String>,
    ) -> Result<()> {
        #[derive(Serialize)]
        struct Body<'a> {
            run_id: &'a str,
            params: &'a [Tag],
            metrics: &'a [WireMetric],
            tags: &'a [Tag],
        }
        let params = to_wire(params);
        let tags = to_wire(tags);
        let metrics: Vec<WireMetric> = metrics
            .iter()
            .map(|m| WireMetric {
                key: m.key.clone(),
                value: m.value,
                timestamp: m.timestamp,
                step: m.step,
            })
            .collect();

        for (params, metrics, tags) in batches(&params, &metrics, &tags, self.batch_size) {
            let _: Empty = self.post(
                "runs/log-batch",
                &Body {
                    run_id,
                    params,
                    metrics,
                    tags,
                },
                Some((EntityKind::Run, run_id)),
            )?;
        }
        Ok(())
    }

    fn update_run(&self, run_id: &str, status: RunStatus, end_time: Option<i64>) -> Result<()> {
        #[derive(Serialize)]
        struct Body<'a> {
            run_id: &'a str,
            status: RunStatus,
            #[serde(skip_serializing_if = "Option::is_none")]
            end_time: Option<i64>,
        }
        let _: serde_json::Value = self.post(
            "runs/update",
            &Body {
                run_id,
                status,
                end_time,
            },
            Some((EntityKind::Run, run_id)),
        )?;
        Ok(())
    }

    fn get_registered_model(&self, name: &str) -> Result<RegisteredModel> {
        let resp: RegisteredModelResponse = self.get(
            "registered-models/get",
            &[("name", name)],
            Some((EntityKind::RegisteredModel, name)),
        )?;
        resp.registered_model.try_into()
    }

    fn create_registered_model(
        &self,
        name: &str,
        description: Option<&str>,
        tags: &BTreeMap<String, String>,
    ) -> Result<RegisteredModel> {
        #[derive(Serialize)]
        struct Body<'a> {
            name: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            description: Option<&'a str>,
            tags: Vec<Tag>,
        }
        let resp: RegisteredModelResponse = self.post(
            "registered-models/create",
            &Body {
                name,
                description,
                tags: to_wire(tags),
            },
            None,
        )?;
        resp.registered_model.try_into()
    }

    fn delete_registered_model(&self, name: &str) -> Result<()> {
        #[derive(Serialize)]
        struct Body<'a> {
            name: &'a str,
        }
        let request = self.authorized(
            self.http
                .delete(self.url("registered-models/delete"))
                .json(&Body { name }),
        );
        let _: Empty = Self::handle(
            request.send()?,
            Some((EntityKind::RegisteredModel, name)),
        )?;
        Ok(())
    }

    fn list_model_versions(&self, name: &str) -> Result<Vec<ModelVersion>> {
        let filter = format!("name='{}'", name.replace('\'', "\\'"));
        let page_size = SEARCH_PAGE_SIZE.to_string();
        let mut versions = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut query = vec![("filter", filter.as_str()), ("max_results", page_size.as_str())];
            if let Some(token) = page_token.as_deref() {
                query.push(("page_token", token));
            }
            let resp: SearchModelVersionsResponse =
                self.get("model-versions/search", &query, None)?;
            for version in resp.model_versions {
                versions.push(ModelVersion::try_from(version)?);
            }
            match resp.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        // Search returns an empty page for an unknown model.
        if versions.is_empty() {
            self.get_registered_model(name)?;
        }
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
        #[derive(Serialize)]
        struct Body<'a> {
            name: &'a str,
            source: &'a str,
            run_id: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            description: Option<&'a str>,
            tags: Vec<Tag>,
        }
        let resp: ModelVersionResponse = self.post(
            "model-versions/create",
            &Body {
                name,
                source,
                run_id,
                description,
                tags: to_wire(tags),
            },
            None,
        )?;
        resp.model_version.try_into()
    }

    fn transition_model_version_stage(
        &self,
        name: &str,
        version: &str,
        stage: Stage,
    ) -> Result<ModelVersion> {
        #[derive(Serialize)]
        struct Body<'a> {
            name: &'a str,
            version: &'a str,
            stage: &'a str,
            archive_existing_versions: bool,
        }
        let id = format!("{name}/{version}");
        let resp: ModelVersionResponse = self.post(
            "model-versions/transition-stage",
            &Body {
                name,
                version,
                stage: stage.as_str(),
                archive_existing_versions: false,
            },
            Some((EntityKind::ModelVersion, &id)),
        )?;
        resp.model_version.try_into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_accepts_string_and_number_int64() {
        let json = r#"{
            "run": {
                "info": {
                    "run_id": "abc",
                    "experiment_id": "3",
                    "status": "FINISHED",
                    "start_time": "1700000000000",
                    "end_time": 1700000005000,
                    "artifact_uri": "dbfs:/databricks/mlflow-tracking/3/abc/artifacts",
                    "lifecycle_stage": "active"
                },
                "data": {
                    "metrics": [{"key": "auc", "value": 0.9, "timestamp": "1700000001000", "step": "4"}],
                    "params": [{"key": "depth", "value": "6"}],
                    "tags": [{"key": "team", "value": "growth"}]
                }
            }
        }"#;
        let resp: RunResponse = serde_json::from_str(json).unwrap();
        let run = Run::from(resp.run);
        assert_eq!(run.info.start_time, 1_700_000_000_000);
        assert_eq!(run.info.end_time, Some(1_700_000_005_000));
        assert_eq!(run.info.status, RunStatus::Finished);
        assert_eq!(run.data.metrics[0].step, 4);
        assert_eq!(run.data.params["depth"], "6");
        assert_eq!(run.data.tags["team"], "growth");
    }

    #[test]
    fn test_run_without_data() {
        let json = r#"{"run": {"info": {"run_id": "r", "experiment_id": "0"}}}"#;
        let resp: RunResponse = serde_json::from_str(json).unwrap();
        let run = Run::from(resp.run);
        assert_eq!(run.info.status, RunStatus::Running);
        assert!(run.data.params.is_empty());
        assert_eq!(run.info.end_time, None);
    }

    #[test]
    fn test_model_version_stage_parsing() {
        let json = r#"{"model_version": {
            "name": "m", "version": "7", "current_stage": "Production",
            "run_id": "r", "source": "s", "creation_timestamp": "12"
        }}"#;
        let resp: ModelVersionResponse = serde_json::from_str(json).unwrap();
        let version = ModelVersion::try_from(resp.model_version).unwrap();
        assert_eq!(version.current_stage, Stage::Production);
        assert_eq!(version.creation_timestamp, Some(12));
        assert!(version.tags.is_empty());
    }

    #[test]
    fn test_registered_model_with_latest_versions() {
        let json = r#"{"registered_model": {
            "name": "m",
            "tags": [{"key": "k", "value": "v"}],
            "latest_versions": [
                {"name": "m", "version": "1", "current_stage": "None"},
                {"name": "m", "version": "2", "current_stage": "Staging"}
            ]
        }}"#;
        let resp: RegisteredModelResponse = serde_json::from_str(json).unwrap();
        let model = RegisteredModel::try_from(resp.registered_model).unwrap();
        assert_eq!(model.tags["k"], "v");
        assert_eq!(model.latest_versions.len(), 2);
        assert!(model.latest_in_stage(Stage::Staging).is_some());
    }

    #[test]
    fn test_batches_respect_limits() {
        let params: Vec<Tag> = (0..250)
            .map(|i| Tag {
                key: format!("p{i}"),
                value: String::new(),
            })
            .collect();
        let metrics: Vec<WireMetric> = (0..1700)
            .map(|i| WireMetric {
                key: "m".to_string(),
                value: 0.0,
                timestamp: 0,
                step: i,
            })
            .collect();
        let chunks = batches(&params, &metrics, &[], MAX_METRICS_PER_BATCH);
        assert_eq!(chunks.len(), 3);
        assert!(chunks
            .iter()
            .all(|(p, m, t)| p.len() <= 100 && m.len() <= 800 && t.is_empty()));
        assert_eq!(chunks.iter().map(|(p, _, _)| p.len()).sum::<usize>(), 250);
        assert_eq!(chunks.iter().map(|(_, m, _)| m.len()).sum::<usize>(), 1700);
    }

    #[test]
    fn test_empty_batch_sends_nothing() {
        assert!(batches(&[], &[], &[], 10).is_empty());
    }

    #[test]
    fn test_empty_tracking_uri_rejected() {
        let err = RestTrackingClient::new("  ").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
