//! Provenance tag codec
//!
//! Migrated entities carry their origin as ordinary key/value tags so that
//! destination-side consumers can recover source identity without a
//! central mapping table. The tags are a typed, versioned record:
//!
//! | Key | Value |
//! |---|---|
//! | `mlflow_export_import.schema_version` | codec version (`1`) |
//! | `mlflow_export_import.source.server` | source tracking URI |
//! | `mlflow_export_import.source.run_id` | original run id |
//! | `mlflow_export_import.source.experiment_name` | original experiment name |
//! | `mlflow_export_import.source.model_name` | original registered model |
//! | `mlflow_export_import.source.version` | original version number |
//! | `mlflow_export_import.source.stage` | original stage (canonical name) |
//!
//! Absent fields are simply not written. The schema key is always written,
//! so its presence is what marks an entity as migrated.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::entities::{ModelVersion, Stage};
use crate::{Error, Result};

/// Prefix shared by every provenance tag key.
pub const TAG_PREFIX: &str = "mlflow_export_import.";

/// Current codec version.
pub const CODEC_VERSION: u32 = 1;

/// Fixed vocabulary of provenance tag keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProvenanceKey {
    /// Codec version
    SchemaVersion,
    /// Source server identity
    SourceServer,
    /// Original run id
    RunId,
    /// Original experiment name
    ExperimentName,
    /// Original registered model name
    ModelName,
    /// Original version number
    Version,
    /// Original stage
    Stage,
}

impl ProvenanceKey {
    /// Every key, in encoding order.
    pub const ALL: [Self; 7] = [
        Self::SchemaVersion,
        Self::SourceServer,
        Self::RunId,
        Self::ExperimentName,
        Self::ModelName,
        Self::Version,
        Self::Stage,
    ];

    /// Full tag key.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SchemaVersion => "mlflow_export_import.schema_version",
            Self::SourceServer => "mlflow_export_import.source.server",
            Self::RunId => "mlflow_export_import.source.run_id",
            Self::ExperimentName => "mlflow_export_import.source.experiment_name",
            Self::ModelName => "mlflow_export_import.source.model_name",
            Self::Version => "mlflow_export_import.source.version",
            Self::Stage => "mlflow_export_import.source.stage",
        }
    }
}

/// Whether a tag key belongs to the provenance namespace.
#[must_use]
pub fn is_provenance_key(key: &str) -> bool {
    key.starts_with(TAG_PREFIX)
}

/// Remove every provenance tag, returning how many were dropped.
///
/// Used when re-importing an entity that was itself migrated: stale
/// provenance is replaced, never layered.
pub fn strip_provenance(tags: &mut BTreeMap<String, String>) -> usize {
    let before = tags.len();
    tags.retain(|key, _| !is_provenance_key(key));
    before - tags.len()
}

/// Origin of a migrated entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    /// Source server identity (tracking URI)
    pub source_server: String,
    /// Original run id
    pub run_id: Option<String>,
    /// Original experiment name
    pub experiment_name: Option<String>,
    /// Original registered model name
    pub model_name: Option<String>,
    /// Original version number
    pub version: Option<String>,
    /// Original stage
    pub stage: Option<Stage>,
}

impl Provenance {
    /// Provenance of a run.
    #[must_use]
    pub fn for_run(
        source_server: impl Into<String>,
        run_id: impl Into<String>,
        experiment_name: Option<String>,
    ) -> Self {
        Self {
            source_server: source_server.into(),
            run_id: Some(run_id.into()),
            experiment_name,
            ..Self::default()
        }
    }

    /// Provenance of a model version.
    #[must_use]
    pub fn for_version(source_server: impl Into<String>, version: &ModelVersion) -> Self {
        Self {
            source_server: source_server.into(),
            run_id: Some(version.run_id.clone()),
            model_name: Some(version.name.clone()),
            version: Some(version.version.clone()),
            stage: Some(version.current_stage),
            ..Self::default()
        }
    }

    /// Encode as tags.
    #[must_use]
    pub fn encode(&self) -> BTreeMap<String, String> {
        let mut tags = BTreeMap::new();
        for key in ProvenanceKey::ALL {
            let value = match key {
                ProvenanceKey::SchemaVersion => Some(CODEC_VERSION.to_string()),
                ProvenanceKey::SourceServer => Some(self.source_server.clone()),
                ProvenanceKey::RunId => self.run_id.clone(),
                ProvenanceKey::ExperimentName => self.experiment_name.clone(),
                ProvenanceKey::ModelName => self.model_name.clone(),
                ProvenanceKey::Version => self.version.clone(),
                ProvenanceKey::Stage => self.stage.map(String::from),
            };
            if let Some(value) = value {
                tags.insert(key.as_str().to_string(), value);
            }
        }
        tags
    }

    /// Replace any existing provenance in `tags` with this record.
    pub fn apply(&self, tags: &mut BTreeMap<String, String>) {
        strip_provenance(tags);
        tags.extend(self.encode());
    }

    /// Decode provenance from tags.
    ///
    /// Returns `Ok(None)` when the entity carries no provenance.
    ///
    /// # Errors
    ///
    /// Returns `Error::Record` if the codec version is unknown or the
    /// source server is missing, and `Error::InvalidStage` if the stage
    /// tag is not a registry stage.
    pub fn decode(tags: &BTreeMap<String, String>) -> Result<Option<Self>> {
        let get = |key: ProvenanceKey| tags.get(key.as_str()).cloned();

        let Some(schema) = get(ProvenanceKey::SchemaVersion) else {
            return Ok(None);
        };
        if schema.trim().parse::<u32>().ok() != Some(CODEC_VERSION) {
            return Err(Error::Record(format!(
                "unsupported provenance schema version '{schema}'"
            )));
        }
        let source_server = get(ProvenanceKey::SourceServer).ok_or_else(|| {
            Error::Record(format!(
                "provenance tags missing '{}'",
                ProvenanceKey::SourceServer.as_str()
            ))
        })?;
        let stage = get(ProvenanceKey::Stage)
            .map(|s| s.parse::<Stage>())
            .transpose()?;

        Ok(Some(Self {
            source_server,
            run_id: get(ProvenanceKey::RunId),
            experiment_name: get(ProvenanceKey::ExperimentName),
            model_name: get(ProvenanceKey::ModelName),
            version: get(ProvenanceKey::Version),
            stage,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::{Arbitrary, Gen, QuickCheck};

    impl Arbitrary for Provenance {
        fn arbitrary(g: &mut Gen) -> Self {
            let stages = Stage::ALL;
            Self {
                source_server: String::arbitrary(g),
                run_id: Option::<String>::arbitrary(g),
                experiment_name: Option::<String>::arbitrary(g),
                model_name: Option::<String>::arbitrary(g),
                version: Option::<u32>::arbitrary(g).map(|v| v.to_string()),
                stage: Option::<usize>::arbitrary(g).map(|i| stages[i % stages.len()]),
            }
        }
    }

    #[test]
    fn test_encode_uses_fixed_vocabulary() {
        let vr = ModelVersion::new("churn", "3", "run-9", "s").with_stage(Stage::Staging);
        let tags = Provenance::for_version("http://src:5000", &vr).encode();

        assert_eq!(tags["mlflow_export_import.schema_version"], "1");
        assert_eq!(tags["mlflow_export_import.source.server"], "http://src:5000");
        assert_eq!(tags["mlflow_export_import.source.version"], "3");
        assert_eq!(tags["mlflow_export_import.source.stage"], "Staging");
        assert_eq!(tags["mlflow_export_import.source.run_id"], "run-9");
        assert!(!tags.contains_key(ProvenanceKey::ExperimentName.as_str()));
        assert!(tags.keys().all(|k| is_provenance_key(k)));
    }

    #[test]
    fn test_decode_absent_provenance() {
        let mut tags = BTreeMap::new();
        tags.insert("team".to_string(), "growth".to_string());
        assert_eq!(Provenance::decode(&tags).unwrap(), None);
    }

    #[test]
    fn test_decode_rejects_unknown_schema() {
        let mut tags = Provenance::for_run("src", "r", None).encode();
        tags.insert(
            ProvenanceKey::SchemaVersion.as_str().to_string(),
            "99".to_string(),
        );
        assert!(matches!(Provenance::decode(&tags), Err(Error::Record(_))));
    }

    #[test]
    fn test_decode_rejects_bad_stage() {
        let mut tags = Provenance::for_run("src", "r", None).encode();
        tags.insert(ProvenanceKey::Stage.as_str().to_string(), "Canary".to_string());
        assert!(matches!(
            Provenance::decode(&tags),
            Err(Error::InvalidStage(_))
        ));
    }

    #[test]
    fn test_apply_replaces_stale_provenance() {
        let mut tags = Provenance::for_run("old-server", "old-run", Some("exp".into())).encode();
        tags.insert("team".to_string(), "growth".to_string());

        Provenance::for_run("new-server", "new-run", None).apply(&mut tags);

        let decoded = Provenance::decode(&tags).unwrap().unwrap();
        assert_eq!(decoded.source_server, "new-server");
        assert_eq!(decoded.run_id.as_deref(), Some("new-run"));
        assert_eq!(decoded.experiment_name, None);
        assert_eq!(tags["team"], "growth");
    }

    #[test]
    fn test_strip_provenance_counts() {
        let mut tags = Provenance::for_run("s", "r", Some("e".into())).encode();
        tags.insert("keep".to_string(), "me".to_string());
        assert_eq!(strip_provenance(&mut tags), 4);
        assert_eq!(tags.len(), 1);
    }

    #[test]
    fn prop_decode_inverts_encode() {
        fn prop(p: Provenance) -> bool {
            Provenance::decode(&p.encode()).ok().flatten() == Some(p)
        }
        QuickCheck::new()
            .tests(200)
            .quickcheck(prop as fn(Provenance) -> bool);
    }
}
