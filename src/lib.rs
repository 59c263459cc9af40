//! # mlflow-migrate: Export/Import for MLflow Tracking Servers
//!
//! Copies experiments, runs and registered models from one tracking
//! server to another through portable on-disk export records.
//!
//! ## Design Principles
//!
//! - **Records are the contract**: exporter and importer may run at
//!   different times against different servers; everything the importer
//!   needs lives in the record.
//! - **Nothing server-assigned is portable**: run ids, version numbers and
//!   artifact locations are re-derived on import; provenance tags keep the
//!   lineage.
//! - **Forward progress**: a failing version or run is recorded and
//!   skipped; only a failing root entity (model, experiment) fails the task.
//!
//! ## Example
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use mlflow_migrate::client::{MemoryTrackingServer, TrackingClient};
//! use mlflow_migrate::entities::Stage;
//! use mlflow_migrate::model::{ExportOptions, ImportOptions, ModelExporter, ModelImporter};
//!
//! # fn main() -> mlflow_migrate::Result<()> {
//! let src = MemoryTrackingServer::new("http://old-mlflow:5000");
//! let exp = src.create_experiment("churn", &BTreeMap::new())?;
//! let run = src.create_run(&exp, Some("train"), 0, &BTreeMap::new())?;
//! src.create_registered_model("churn-model", None, &BTreeMap::new())?;
//! let source = format!("{}/model", run.info.artifact_uri);
//! let v1 = src.create_model_version("churn-model", &source, run.run_id(), None, &BTreeMap::new())?;
//! src.transition_model_version_stage("churn-model", &v1.version, Stage::Production)?;
//!
//! let dir = tempfile::tempdir()?;
//! let exporter = ModelExporter::new(src, &ExportOptions::default())?;
//! exporter.try_export_model("churn-model", dir.path())?;
//!
//! let dst = MemoryTrackingServer::new("http://new-mlflow:5000");
//! let imported = ModelImporter::new(dst, ImportOptions::default())
//!     .import_model("churn-model", dir.path(), "churn", false)?;
//! assert_eq!(imported.succeeded[0].current_stage, Stage::Production);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod artifacts;
pub mod bulk;
pub mod client;
pub mod config;
pub mod entities;
pub mod error;
pub mod experiment;
pub mod logging;
pub mod model;
pub mod record;
pub mod run;
pub mod selector;
pub mod tags;

pub use error::{Error, Result};
