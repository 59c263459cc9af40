//! Experiment - root entity of the tracking schema

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Lifecycle stage of an experiment or run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleStage {
    /// Visible and writable.
    #[default]
    Active,
    /// Soft-deleted; restorable on the server.
    Deleted,
}

/// Experiment represents a tracked experiment.
///
/// The name is the only portable key: `experiment_id` and
/// `artifact_location` are assigned by each server and are never carried
/// across a migration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Experiment {
    /// Server-assigned identifier.
    pub experiment_id: String,
    /// Unique name on the server.
    pub name: String,
    /// Root URI for run artifacts, controlled by the server.
    #[serde(default)]
    pub artifact_location: String,
    /// Lifecycle stage.
    #[serde(default)]
    pub lifecycle_stage: LifecycleStage,
    /// Experiment tags.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl Experiment {
    /// Create an active experiment with no tags.
    ///
    /// # Arguments
    ///
    /// * `experiment_id` - Server-assigned identifier
    /// * `name` - Unique experiment name
    #[must_use]
    pub fn new(experiment_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            name: name.into(),
            artifact_location: String::new(),
            lifecycle_stage: LifecycleStage::Active,
            tags: BTreeMap::new(),
        }
    }

    /// Create a builder for constructing an experiment with optional fields.
    #[must_use]
    pub fn builder(
        experiment_id: impl Into<String>,
        name: impl Into<String>,
    ) -> ExperimentBuilder {
        ExperimentBuilder::new(experiment_id, name)
    }
}

/// Builder for `Experiment`.
#[derive(Debug)]
pub struct ExperimentBuilder {
    inner: Experiment,
}

impl ExperimentBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(experiment_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            inner: Experiment::new(experiment_id, name),
        }
    }

    /// Set the artifact location.
    #[must_use]
    pub fn artifact_location(mut self, location: impl Into<String>) -> Self {
        self.inner.artifact_location = location.into();
        self
    }

    /// Set the lifecycle stage.
    #[must_use]
    pub const fn lifecycle_stage(mut self, stage: LifecycleStage) -> Self {
        self.inner.lifecycle_stage = stage;
        self
    }

    /// Add a tag.
    #[must_use]
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.inner.tags.insert(key.into(), value.into());
        self
    }

    /// Build the `Experiment`.
    #[must_use]
    pub fn build(self) -> Experiment {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_experiment_new() {
        let exp = Experiment::new("1", "fraud-detection");
        assert_eq!(exp.experiment_id, "1");
        assert_eq!(exp.name, "fraud-detection");
        assert_eq!(exp.lifecycle_stage, LifecycleStage::Active);
        assert!(exp.tags.is_empty());
    }

    #[test]
    fn test_experiment_builder() {
        let exp = Experiment::builder("7", "churn")
            .artifact_location("/mlruns/7")
            .tag("team", "growth")
            .build();

        assert_eq!(exp.artifact_location, "/mlruns/7");
        assert_eq!(exp.tags.get("team").map(String::as_str), Some("growth"));
    }

    #[test]
    fn test_lifecycle_stage_wire_format() {
        let json = serde_json::to_string(&LifecycleStage::Deleted).unwrap();
        assert_eq!(json, "\"deleted\"");
    }
}
