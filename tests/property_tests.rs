//! Property-based tests for version selection and provenance tags
//!
//! - Test selection invariants over arbitrary registries
//! - Run with ProptestConfig::with_cases(100)

use std::collections::BTreeMap;

use mlflow_migrate::entities::{ModelVersion, Stage};
use mlflow_migrate::selector::{latest_per_stage, select, StagePolicy, VersionFilter};
use mlflow_migrate::tags::{strip_provenance, Provenance};
use proptest::prelude::*;

// ============================================================================
// Property Test Generators (Strategies)
// ============================================================================

fn arb_stage() -> impl Strategy<Value = Stage> {
    prop_oneof![
        Just(Stage::None),
        Just(Stage::Staging),
        Just(Stage::Production),
        Just(Stage::Archived),
    ]
}

/// Registry with versions 1..=n in arbitrary stages, listed in shuffled
/// order as a server might return them
fn arb_versions(max: usize) -> impl Strategy<Value = Vec<ModelVersion>> {
    proptest::collection::vec(arb_stage(), 0..max)
        .prop_map(|stages| {
            stages
                .into_iter()
                .enumerate()
                .map(|(i, stage)| {
                    ModelVersion::new("m", (i + 1).to_string(), format!("run{i}"), "s")
                        .with_stage(stage)
                })
                .collect::<Vec<_>>()
        })
        .prop_shuffle()
}

fn arb_stage_names() -> impl Strategy<Value = Vec<String>> {
    proptest::collection::vec(
        prop_oneof![
            Just("Production".to_string()),
            Just("staging".to_string()),
            Just("ARCHIVED".to_string()),
            Just("None".to_string()),
            Just("Prod".to_string()),
        ],
        0..4,
    )
}

fn numbers(versions: &[ModelVersion]) -> Vec<u64> {
    versions.iter().filter_map(ModelVersion::version_number).collect()
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: selection is a subset of the input
    #[test]
    fn prop_selection_is_subset(
        versions in arb_versions(30),
        stages in arb_stage_names(),
        latest_only in any::<bool>(),
    ) {
        let filter = VersionFilter::new(&stages, &[] as &[&str], latest_only, StagePolicy::Lenient).unwrap();
        let selected = select(&versions, &filter);
        prop_assert!(selected.len() <= versions.len());
        for v in &selected {
            prop_assert!(versions.contains(v));
        }
    }

    /// Property: selection is strictly ascending by version number
    #[test]
    fn prop_selection_is_ascending(
        versions in arb_versions(30),
        stages in arb_stage_names(),
    ) {
        let filter = VersionFilter::new(&stages, &[] as &[&str], false, StagePolicy::Lenient).unwrap();
        let selected = numbers(&select(&versions, &filter));
        prop_assert!(selected.windows(2).all(|w| w[0] < w[1]));
    }

    /// Property: stage filter keeps exactly the versions in matching stages
    #[test]
    fn prop_stage_filter_is_exact(
        versions in arb_versions(30),
        stages in arb_stage_names(),
    ) {
        let filter = VersionFilter::new(&stages, &[] as &[&str], false, StagePolicy::Lenient).unwrap();
        let wanted: Vec<Stage> = stages.iter().filter_map(|s| s.parse().ok()).collect();
        let selected = select(&versions, &filter);
        if stages.is_empty() {
            prop_assert_eq!(selected.len(), versions.len());
        } else {
            let expected = versions.iter().filter(|v| wanted.contains(&v.current_stage)).count();
            prop_assert_eq!(selected.len(), expected);
            prop_assert!(selected.iter().all(|v| wanted.contains(&v.current_stage)));
        }
    }

    /// Property: explicit versions select exactly the requested ones present
    #[test]
    fn prop_explicit_versions(
        versions in arb_versions(20),
        requested in proptest::collection::btree_set(1u64..25, 0..6),
    ) {
        let requested_str: Vec<String> = requested.iter().map(ToString::to_string).collect();
        let filter = VersionFilter::new(&[] as &[&str], &requested_str, false, StagePolicy::Lenient).unwrap();
        let selected = numbers(&select(&versions, &filter));
        if requested.is_empty() {
            prop_assert_eq!(selected.len(), versions.len());
        } else {
            let expected: Vec<u64> = requested.iter().copied().filter(|n| *n as usize <= versions.len()).collect();
            prop_assert_eq!(selected, expected);
        }
    }

    /// Property: latest_per_stage yields one version per occupied stage, the newest
    #[test]
    fn prop_latest_per_stage(versions in arb_versions(30)) {
        let latest = latest_per_stage(&versions);
        let mut occupied: Vec<Stage> = versions.iter().map(|v| v.current_stage).collect();
        occupied.sort();
        occupied.dedup();
        prop_assert_eq!(latest.len(), occupied.len());
        for v in &latest {
            let newest = versions
                .iter()
                .filter(|o| o.current_stage == v.current_stage)
                .filter_map(ModelVersion::version_number)
                .max();
            prop_assert_eq!(v.version_number(), newest);
        }
    }

    /// Property: stages and versions together are always rejected
    #[test]
    fn prop_stages_and_versions_exclusive(
        stage in arb_stage(),
        version in 1u64..100,
    ) {
        let result = VersionFilter::new(&[stage.as_str()], &[version.to_string()], false, StagePolicy::Lenient);
        prop_assert!(result.is_err());
    }

    /// Property: applying provenance never disturbs user tags
    #[test]
    fn prop_provenance_preserves_user_tags(
        user in proptest::collection::btree_map("[a-z]{1,8}", "[a-z0-9]{0,8}", 0..8),
        server in "[a-z]{1,10}",
        version in 1u64..50,
        stage in arb_stage(),
    ) {
        let mv = ModelVersion::new("m", version.to_string(), "r", "s").with_stage(stage);
        let mut tags: BTreeMap<String, String> = user.clone();
        Provenance::for_version(server.clone(), &mv).apply(&mut tags);
        let decoded = Provenance::decode(&tags).unwrap().unwrap();
        prop_assert_eq!(decoded.source_server, server);
        prop_assert_eq!(decoded.version, Some(version.to_string()));
        strip_provenance(&mut tags);
        prop_assert_eq!(tags, user);
    }
}
