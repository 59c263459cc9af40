//! Run - execution instance of an experiment

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::LifecycleStage;

/// Status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    /// Run is currently executing.
    #[default]
    Running,
    /// Run is queued but not yet started.
    Scheduled,
    /// Run completed successfully.
    Finished,
    /// Run failed with an error.
    Failed,
    /// Run was killed by user or system.
    Killed,
}

impl RunStatus {
    /// Whether the run has reached a final state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Failed | Self::Killed)
    }
}

/// A single metric data point.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Metric {
    /// Metric name (e.g. "loss")
    pub key: String,
    /// Metric value
    pub value: f64,
    /// Wall-clock time in milliseconds since epoch
    pub timestamp: i64,
    /// Training step
    #[serde(default)]
    pub step: i64,
}

impl Metric {
    /// Create a metric data point.
    #[must_use]
    pub fn new(key: impl Into<String>, value: f64, timestamp: i64, step: i64) -> Self {
        Self {
            key: key.into(),
            value,
            timestamp,
            step,
        }
    }
}

/// Server-assigned run metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunInfo {
    /// Server-assigned identifier; not portable.
    pub run_id: String,
    /// Parent experiment.
    pub experiment_id: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_name: Option<String>,
    /// Owning user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Execution status.
    #[serde(default)]
    pub status: RunStatus,
    /// Start time in milliseconds since epoch.
    #[serde(default)]
    pub start_time: i64,
    /// End time in milliseconds since epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
    /// Root URI of the run's artifacts.
    #[serde(default)]
    pub artifact_uri: String,
    /// Lifecycle stage.
    #[serde(default)]
    pub lifecycle_stage: LifecycleStage,
}

/// Parameters, metrics and tags logged to a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RunData {
    /// Parameters (immutable once logged).
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    /// Latest value of each metric.
    #[serde(default)]
    pub metrics: Vec<Metric>,
    /// Run tags.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// Run represents a single recorded execution under an experiment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Run {
    /// Server-assigned metadata
    pub info: RunInfo,
    /// Logged data
    #[serde(default)]
    pub data: RunData,
}

impl Run {
    /// Create a running run with no data.
    ///
    /// # Arguments
    ///
    /// * `run_id` - Server-assigned identifier
    /// * `experiment_id` - ID of the parent experiment
    #[must_use]
    pub fn new(run_id: impl Into<String>, experiment_id: impl Into<String>) -> Self {
        Self {
            info: RunInfo {
                run_id: run_id.into(),
                experiment_id: experiment_id.into(),
                run_name: None,
                user_id: None,
                status: RunStatus::Running,
                start_time: 0,
                end_time: None,
                artifact_uri: String::new(),
                lifecycle_stage: LifecycleStage::Active,
            },
            data: RunData::default(),
        }
    }

    /// Create a builder for constructing a run with optional fields.
    #[must_use]
    pub fn builder(run_id: impl Into<String>, experiment_id: impl Into<String>) -> RunBuilder {
        RunBuilder::new(run_id, experiment_id)
    }

    /// Get the run ID.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.info.run_id
    }

    /// Get the parent experiment ID.
    #[must_use]
    pub fn experiment_id(&self) -> &str {
        &self.info.experiment_id
    }
}

/// Builder for `Run`.
#[derive(Debug)]
pub struct RunBuilder {
    inner: Run,
}

impl RunBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(run_id: impl Into<String>, experiment_id: impl Into<String>) -> Self {
        Self {
            inner: Run::new(run_id, experiment_id),
        }
    }

    /// Set the run name.
    #[must_use]
    pub fn run_name(mut self, name: impl Into<String>) -> Self {
        self.inner.info.run_name = Some(name.into());
        self
    }

    /// Set the status.
    #[must_use]
    pub const fn status(mut self, status: RunStatus) -> Self {
        self.inner.info.status = status;
        self
    }

    /// Set start and end times (milliseconds since epoch).
    #[must_use]
    pub const fn times(mut self, start_time: i64, end_time: Option<i64>) -> Self {
        self.inner.info.start_time = start_time;
        self.inner.info.end_time = end_time;
        self
    }

    /// Set the artifact URI.
    #[must_use]
    pub fn artifact_uri(mut self, uri: impl Into<String>) -> Self {
        self.inner.info.artifact_uri = uri.into();
        self
    }

    /// Log a parameter.
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.inner.data.params.insert(key.into(), value.into());
        self
    }

    /// Log a metric.
    #[must_use]
    pub fn metric(mut self, metric: Metric) -> Self {
        self.inner.data.metrics.push(metric);
        self
    }

    /// Set a tag.
    #[must_use]
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.inner.data.tags.insert(key.into(), value.into());
        self
    }

    /// Build the `Run`.
    #[must_use]
    pub fn build(self) -> Run {
        self.inner
    }
}
