//! Registered models and model versions

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::Stage;

/// A version of a registered model.
///
/// The version number is assigned by the registry and increases
/// monotonically per model; it is not portable across servers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelVersion {
    /// Owning registered model.
    pub name: String,
    /// Version number as the registry reports it (a decimal string).
    pub version: String,
    /// Current lifecycle stage.
    #[serde(default)]
    pub current_stage: Stage,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Version tags.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// Run that produced the model.
    #[serde(default)]
    pub run_id: String,
    /// Artifact URI the version was registered from.
    #[serde(default)]
    pub source: String,
    /// Registry status (e.g. `READY`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Creation time in milliseconds since epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<i64>,
}

impl ModelVersion {
    /// Create a version in stage `None`.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        run_id: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            current_stage: Stage::None,
            description: None,
            tags: BTreeMap::new(),
            run_id: run_id.into(),
            source: source.into(),
            status: None,
            creation_timestamp: None,
        }
    }

    /// Set the stage.
    #[must_use]
    pub const fn with_stage(mut self, stage: Stage) -> Self {
        self.current_stage = stage;
        self
    }

    /// Numeric version, if the registry reported a decimal number.
    #[must_use]
    pub fn version_number(&self) -> Option<u64> {
        self.version.trim().parse().ok()
    }

    /// Order by numeric version, falling back to string order for
    /// non-numeric versions (which sort last).
    #[must_use]
    pub fn cmp_version(&self, other: &Self) -> Ordering {
        match (self.version_number(), other.version_number()) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.version.cmp(&other.version),
        }
    }
}

/// A named model in the registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegisteredModel {
    /// Unique name on the server.
    pub name: String,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Model tags.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// Creation time in milliseconds since epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<i64>,
    /// Last update time in milliseconds since epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated_timestamp: Option<i64>,
    /// Latest version per stage, as computed by the server.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub latest_versions: Vec<ModelVersion>,
}

impl RegisteredModel {
    /// Create a model with no description or tags.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            tags: BTreeMap::new(),
            creation_timestamp: None,
            last_updated_timestamp: None,
            latest_versions: Vec::new(),
        }
    }

    /// Latest version in the given stage, if any.
    #[must_use]
    pub fn latest_in_stage(&self, stage: Stage) -> Option<&ModelVersion> {
        self.latest_versions
            .iter()
            .find(|vr| vr.current_stage == stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_ordering_is_numeric() {
        let v2 = ModelVersion::new("m", "2", "r", "s");
        let v10 = ModelVersion::new("m", "10", "r", "s");
        assert_eq!(v2.cmp_version(&v10), Ordering::Less);
        assert_eq!(v10.version_number(), Some(10));
    }

    #[test]
    fn test_non_numeric_versions_sort_last() {
        let v1 = ModelVersion::new("m", "1", "r", "s");
        let odd = ModelVersion::new("m", "draft", "r", "s");
        assert_eq!(v1.cmp_version(&odd), Ordering::Less);
        assert_eq!(odd.cmp_version(&v1), Ordering::Greater);
    }

    #[test]
    fn test_latest_versions_omitted_when_empty() {
        let model = RegisteredModel::new("m");
        let json = serde_json::to_value(&model).unwrap();
        assert!(json.get("latest_versions").is_none());
    }

    #[test]
    fn test_latest_in_stage() {
        let mut model = RegisteredModel::new("m");
        model
            .latest_versions
            .push(ModelVersion::new("m", "3", "r", "s").with_stage(Stage::Production));
        assert_eq!(
            model.latest_in_stage(Stage::Production).map(|v| v.version.as_str()),
            Some("3")
        );
        assert!(model.latest_in_stage(Stage::Staging).is_none());
    }
}
