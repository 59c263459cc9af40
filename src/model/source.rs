//! Model version source rewriting
//!
//! A version's `source` points into its run's artifact tree, and that
//! tree's location embeds the run id:
//!
//! ```text
//! dbfs:/databricks/mlflow-tracking/<exp_id>/<run_id>/artifacts/<path>
//! /opt/mlflow/mlruns/<exp_id>/<run_id>/artifacts/<path>
//! runs:/<run_id>/<path>
//! ```
//!
//! The segment after the run id (minus the leading `artifacts/`) is the
//! only portable part; it is re-rooted under the imported run's artifact
//! URI.

use crate::{Error, Result};

/// Path of the model inside its run's artifact tree.
///
/// # Errors
///
/// Returns `Error::InvalidSource` if `run_id` doesn't occur in `source`.
pub fn extract_model_path(source: &str, run_id: &str) -> Result<String> {
    let invalid = || Error::InvalidSource {
        source_uri: source.to_string(),
        run_id: run_id.to_string(),
    };
    if run_id.is_empty() {
        return Err(invalid());
    }
    let idx = source.find(run_id).ok_or_else(invalid)?;
    let rest = source[idx + run_id.len()..].trim_start_matches('/');

    let path = match rest.strip_prefix("artifacts") {
        Some("") => "",
        Some(after) if after.starts_with('/') => &after[1..],
        _ => rest,
    };
    Ok(path.to_string())
}

/// Source URI for a version of the imported run.
///
/// # Errors
///
/// Returns `Error::InvalidSource` if the model path can't be extracted.
pub fn rewrite_source(source: &str, old_run_id: &str, new_artifact_uri: &str) -> Result<String> {
    let model_path = extract_model_path(source, old_run_id)?;
    let root = new_artifact_uri.trim_end_matches('/');
    if model_path.is_empty() {
        Ok(root.to_string())
    } else {
        Ok(format!("{root}/{model_path}"))
    }
}
