//! Model version selection
//!
//! A [`VersionFilter`] is one of: a set of stages, a set of explicit
//! version numbers, or nothing (all versions), optionally narrowed to the
//! latest version per stage. Stage and version sets are mutually
//! exclusive; asking for both is a configuration error raised when the
//! filter is built, before any server is contacted.
//!
//! # Example
//!
//! ```rust
//! use mlflow_migrate::entities::{ModelVersion, Stage};
//! use mlflow_migrate::selector::{select, StagePolicy, VersionFilter};
//!
//! # fn example() -> mlflow_migrate::Result<()> {
//! let versions = vec![
//!     ModelVersion::new("m", "2", "r2", "s").with_stage(Stage::Staging),
//!     ModelVersion::new("m", "1", "r1", "s").with_stage(Stage::Production),
//!     ModelVersion::new("m", "3", "r3", "s"),
//! ];
//! let filter = VersionFilter::new(&["production", "Staging"], &[] as &[&str], false, StagePolicy::Strict)?;
//! let selected = select(&versions, &filter);
//! assert_eq!(selected.iter().map(|v| v.version.as_str()).collect::<Vec<_>>(), ["1", "2"]);
//! # Ok(())
//! # }
//! ```

use rustc_hash::{FxHashMap, FxHashSet};

use crate::entities::{ModelVersion, Stage};
use crate::{Error, Result};

/// How unrecognised stage names are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StagePolicy {
    /// Log a warning and ignore the name.
    #[default]
    Lenient,
    /// Reject with `Error::InvalidStage`.
    Strict,
}

fn normalize_version(version: &str) -> String {
    let trimmed = version.trim();
    trimmed
        .parse::<u64>()
        .map_or_else(|_| trimmed.to_string(), |n| n.to_string())
}

/// Which versions of a model to migrate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionFilter {
    stages: FxHashSet<Stage>,
    versions: FxHashSet<String>,
    requested_stages: usize,
    latest_only: bool,
}

impl VersionFilter {
    /// Filter that selects every version.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Build a filter.
    ///
    /// # Arguments
    ///
    /// * `stages` - Stage names, case-insensitive; empty for no stage filter
    /// * `versions` - Version numbers; empty for no version filter
    /// * `latest_only` - Restrict the pool to the latest version per stage
    /// * `policy` - Treatment of unrecognised stage names
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if both `stages` and `versions` are
    /// non-empty, and `Error::InvalidStage` for an unknown stage name under
    /// `StagePolicy::Strict`.
    pub fn new<S: AsRef<str>, V: AsRef<str>>(
        stages: &[S],
        versions: &[V],
        latest_only: bool,
        policy: StagePolicy,
    ) -> Result<Self> {
        let stage_names: Vec<&str> = stages
            .iter()
            .map(|s| s.as_ref().trim())
            .filter(|s| !s.is_empty())
            .collect();
        let version_names: FxHashSet<String> = versions
            .iter()
            .map(|v| v.as_ref().trim())
            .filter(|v| !v.is_empty())
            .map(normalize_version)
            .collect();

        if !stage_names.is_empty() && !version_names.is_empty() {
            return Err(Error::Configuration(format!(
                "Both stages {stage_names:?} and versions {:?} cannot be set",
                sorted(&version_names)
            )));
        }

        let mut parsed = FxHashSet::default();
        for name in &stage_names {
            match name.parse::<Stage>() {
                Ok(stage) => {
                    parsed.insert(stage);
                }
                Err(e) if policy == StagePolicy::Strict => return Err(e),
                Err(_) => tracing::warn!(
                    stage = %name,
                    "stage must be one of Production, Staging, Archived, None; ignoring"
                ),
            }
        }

        Ok(Self {
            stages: parsed,
            versions: version_names,
            requested_stages: stage_names.len(),
            latest_only,
        })
    }

    /// Recognised stages in the filter.
    #[must_use]
    pub fn stages(&self) -> Vec<Stage> {
        let mut stages: Vec<Stage> = self.stages.iter().copied().collect();
        stages.sort();
        stages
    }

    /// Explicit versions in the filter, ascending.
    #[must_use]
    pub fn versions(&self) -> Vec<String> {
        sorted(&self.versions)
    }

    /// Number of stage names the caller asked for, recognised or not.
    #[must_use]
    pub const fn num_target_stages(&self) -> usize {
        self.requested_stages
    }

    /// Number of explicit versions the caller asked for.
    #[must_use]
    pub fn num_target_versions(&self) -> usize {
        self.versions.len()
    }

    /// Whether the candidate pool is the latest version per stage.
    #[must_use]
    pub const fn latest_only(&self) -> bool {
        self.latest_only
    }

    /// Whether a single version passes the stage/version predicate.
    ///
    /// Does not account for `latest_only`, which depends on the whole list.
    #[must_use]
    pub fn matches(&self, version: &ModelVersion) -> bool {
        if self.requested_stages > 0 {
            return self.stages.contains(&version.current_stage);
        }
        if !self.versions.is_empty() {
            return self.versions.contains(&normalize_version(&version.version));
        }
        true
    }
}

fn sorted(set: &FxHashSet<String>) -> Vec<String> {
    let mut items: Vec<String> = set.iter().cloned().collect();
    items.sort_by(|a, b| match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    });
    items
}

/// Latest (highest-numbered) version in each stage, ascending by version.
#[must_use]
pub fn latest_per_stage(versions: &[ModelVersion]) -> Vec<ModelVersion> {
    let mut latest: FxHashMap<Stage, &ModelVersion> = FxHashMap::default();
    for version in versions {
        latest
            .entry(version.current_stage)
            .and_modify(|best| {
                if version.cmp_version(*best).is_gt() {
                    *best = version;
                }
            })
            .or_insert(version);
    }
    let mut out: Vec<ModelVersion> = latest.into_values().cloned().collect();
    out.sort_by(ModelVersion::cmp_version);
    out
}

/// Select the versions to migrate, ascending by version number.
///
/// The output is always a subset of `versions`.
#[must_use]
pub fn select(versions: &[ModelVersion], filter: &VersionFilter) -> Vec<ModelVersion> {
    let pool = if filter.latest_only {
        latest_per_stage(versions)
    } else {
        versions.to_vec()
    };
    let mut selected: Vec<ModelVersion> = pool.into_iter().filter(|v| filter.matches(v)).collect();
    selected.sort_by(ModelVersion::cmp_version);
    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    const NONE: &[&str] = &[];

    fn four_versions() -> Vec<ModelVersion> {
        // Server order, newest first
        vec![
            ModelVersion::new("m", "4", "r4", "s").with_stage(Stage::None),
            ModelVersion::new("m", "3", "r3", "s").with_stage(Stage::Archived),
            ModelVersion::new("m", "2", "r2", "s").with_stage(Stage::Staging),
            ModelVersion::new("m", "1", "r1", "s").with_stage(Stage::Production),
        ]
    }

    fn numbers(versions: &[ModelVersion]) -> Vec<&str> {
        versions.iter().map(|v| v.version.as_str()).collect()
    }

    #[test]
    fn test_no_filter_selects_all_ascending() {
        let selected = select(&four_versions(), &VersionFilter::all());
        assert_eq!(numbers(&selected), ["1", "2", "3", "4"]);
    }

    #[test]
    fn test_two_stages() {
        let filter =
            VersionFilter::new(&["Production", "Staging"], NONE, false, StagePolicy::Lenient)
                .unwrap();
        let selected = select(&four_versions(), &filter);
        assert_eq!(numbers(&selected), ["1", "2"]);
        assert_eq!(filter.num_target_stages(), 2);
    }

    #[test]
    fn test_stage_match_is_case_insensitive() {
        let filter = VersionFilter::new(&["aRcHiVeD"], NONE, false, StagePolicy::Strict).unwrap();
        assert_eq!(numbers(&select(&four_versions(), &filter)), ["3"]);
    }

    #[test]
    fn test_explicit_versions_follow_input_not_filter_order() {
        let filter = VersionFilter::new(NONE, &["4", "2", "3"], false, StagePolicy::Lenient).unwrap();
        assert_eq!(numbers(&select(&four_versions(), &filter)), ["2", "3", "4"]);
        assert_eq!(filter.versions(), ["2", "3", "4"]);
    }

    #[test]
    fn test_explicit_versions_normalize_leading_zeros() {
        let filter = VersionFilter::new(NONE, &["02"], false, StagePolicy::Lenient).unwrap();
        assert_eq!(numbers(&select(&four_versions(), &filter)), ["2"]);
    }

    #[test]
    fn test_stages_and_versions_are_exclusive() {
        let err = VersionFilter::new(&["Production"], &["1"], false, StagePolicy::Lenient)
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("cannot be set"));
    }

    #[test]
    fn test_unknown_stage_lenient_matches_nothing() {
        let filter = VersionFilter::new(&["Canary"], NONE, false, StagePolicy::Lenient).unwrap();
        assert!(select(&four_versions(), &filter).is_empty());
        assert_eq!(filter.num_target_stages(), 1);
        assert!(filter.stages().is_empty());
    }

    #[test]
    fn test_unknown_stage_strict_is_rejected() {
        let err = VersionFilter::new(&["Production", "Canary"], NONE, false, StagePolicy::Strict)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidStage(_)));
    }

    #[test]
    fn test_blank_entries_are_ignored() {
        let filter = VersionFilter::new(&["", " "], &[""], false, StagePolicy::Strict).unwrap();
        assert_eq!(filter, VersionFilter::all());
    }

    #[test]
    fn test_latest_only_takes_newest_per_stage() {
        let mut versions = four_versions();
        versions.push(ModelVersion::new("m", "5", "r5", "s").with_stage(Stage::Production));
        versions.push(ModelVersion::new("m", "6", "r6", "s").with_stage(Stage::None));

        let filter = VersionFilter::new(NONE, NONE, true, StagePolicy::Lenient).unwrap();
        assert_eq!(numbers(&select(&versions, &filter)), ["2", "3", "5", "6"]);

        let filter =
            VersionFilter::new(&["Production"], NONE, true, StagePolicy::Lenient).unwrap();
        assert_eq!(numbers(&select(&versions, &filter)), ["5"]);
    }

    #[test]
    fn test_numeric_not_lexicographic_order() {
        let versions = vec![
            ModelVersion::new("m", "10", "r", "s"),
            ModelVersion::new("m", "9", "r", "s"),
        ];
        assert_eq!(numbers(&select(&versions, &VersionFilter::all())), ["9", "10"]);
    }
}
